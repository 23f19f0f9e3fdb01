// SPDX-License-Identifier: Apache-2.0
//! Same-tick dispatch cascades, cycle deferral, and the recursive-publish
//! guard, driven through whole engine ticks.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use serde_json::json;

use ember_core::engine::{Engine, EngineError, EngineOptions};
use ember_core::event::EventDraft;
use ember_core::layer::LayerRegistry;
use ember_fixtures::{CallLog, RecordingLayer, call_log};

/// One cascade layer whose first update requests its own reset.
fn cascade_definition() -> serde_json::Value {
    json!({
        "meta": { "schemaVersion": "1.0.0", "gameId": "cascade" },
        "state": { "resources": { "xp": 0.0 } },
        "layers": [{ "id": "idle", "type": "cascadeLayer", "sublayers": [] }]
    })
}

fn cascade_registry(log: &CallLog) -> LayerRegistry {
    let mut registry = LayerRegistry::new();
    let log = std::rc::Rc::clone(log);
    registry
        .register(
            "cascadeLayer",
            Box::new(move |def: &ember_defs::LayerDef| {
                Ok(Box::new(
                    RecordingLayer::new(&def.id, "cascadeLayer", log.clone())
                        .publish_once_on_update(
                            "LAYER_RESET_REQUESTED",
                            json!({ "layerId": "idle", "reason": "cascade" }),
                        ),
                ) as Box<dyn ember_core::layer::Layer>)
            }),
        )
        .unwrap();
    registry
}

#[test]
fn reset_request_and_execution_complete_in_one_tick_across_two_cycles() {
    let log = call_log();
    let mut engine = Engine::initialize(
        &cascade_definition(),
        &cascade_registry(&log),
        EngineOptions::default(),
    )
    .unwrap();

    let summary = engine.tick().unwrap();
    assert_eq!(summary.dispatch.cycles_processed, 2);
    assert_eq!(summary.dispatch.deferred_events, 0);
    assert!(!summary.dispatch.deferred_due_to_cycle_limit);
    // Cycle 1 delivered the request to the reset service; the executed
    // event it published was processed in cycle 2.
    assert!(summary.dispatched_handlers >= 1);
}

#[test]
fn cycle_budget_of_one_defers_the_cascade_to_the_next_tick() {
    let log = call_log();
    let mut engine = Engine::initialize(
        &cascade_definition(),
        &cascade_registry(&log),
        EngineOptions::default().with_max_dispatch_cycles_per_tick(1),
    )
    .unwrap();

    let summary = engine.tick().unwrap();
    assert_eq!(summary.dispatch.cycles_processed, 1);
    assert!(summary.dispatch.deferred_due_to_cycle_limit);
    assert!(summary.dispatch.deferred_events >= 1);

    // The deferred executed-event is the next tick's initial queue.
    let summary = engine.tick().unwrap();
    assert_eq!(summary.dispatch.deferred_events, 0);
    assert!(!summary.dispatch.deferred_due_to_cycle_limit);
}

#[test]
fn recursive_publish_is_fatal_and_names_the_budget() {
    let mut engine = Engine::initialize(
        &cascade_definition(),
        &cascade_registry(&call_log()),
        EngineOptions::default()
            .lenient_events()
            .with_max_events_per_tick(3)
            .with_max_dispatch_cycles_per_tick(64),
    )
    .unwrap();

    let publisher = engine.event_publisher();
    let republisher = engine.event_publisher();
    publisher.subscribe(
        "STORM",
        Box::new(move |_event| {
            republisher.publish(EventDraft::new("STORM")).unwrap();
        }),
    );
    publisher.publish(EventDraft::new("STORM")).unwrap();

    let error = engine.tick().unwrap_err();
    assert!(matches!(error, EngineError::Bus(_)));
    assert!(error.to_string().contains("maxEventsPerTick"));
}
