// SPDX-License-Identifier: Apache-2.0
//! Intent routing through the engine: lock-aware rejection and the full
//! disposition vocabulary.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use serde_json::json;

use ember_core::demo::progress;
use ember_core::engine::{Engine, EngineOptions, TickSummary};
use ember_core::event::Intent;
use ember_core::layer::LayerRegistry;

const JOBS_REF: &str = "layer:idle/sublayer:main/section:jobs";

/// Sample pack variant whose jobs section is xp-gated.
fn gated_section_definition() -> serde_json::Value {
    json!({
        "meta": { "schemaVersion": "1.0.0", "gameId": "gated" },
        "state": {
            "resources": { "xp": 0.0 },
            "layers": { "idle": { "xp": 0.0, "jobs": {} } }
        },
        "layers": [{
            "id": "idle",
            "type": "progressLayer",
            "sublayers": [{
                "id": "main",
                "type": "panel",
                "sections": [{
                    "id": "jobs",
                    "unlock": { "resourceGte": { "path": "resources.xp", "amount": 1 } },
                    "elements": [{ "id": "mine", "type": "job" }]
                }]
            }]
        }]
    })
}

fn registry() -> LayerRegistry {
    let mut registry = LayerRegistry::new();
    registry
        .register(progress::PROGRESS_LAYER_KIND, progress::factory())
        .unwrap();
    registry
}

fn start_job_intent() -> Intent {
    Intent::new("START_JOB").with_payload(json!({ "targetRef": JOBS_REF, "jobId": "mine" }))
}

fn only_disposition(summary: &TickSummary) -> &ember_core::intent::RouteDisposition {
    assert_eq!(summary.intents_routed.len(), 1);
    &summary.intents_routed[0].disposition
}

#[test]
fn locked_target_rejects_then_routes_after_unlock() {
    let mut engine =
        Engine::initialize(&gated_section_definition(), &registry(), EngineOptions::default())
            .unwrap();

    // Tick 1 produces an unlock summary with the section still locked.
    engine.tick().unwrap();

    engine.enqueue_intent(start_job_intent()).unwrap();
    let summary = engine.tick().unwrap();
    assert_eq!(only_disposition(&summary).code(), "INTENT_TARGET_LOCKED");

    // Unlock the section, register the gameplay handler, and retry.
    engine.write_state("resources.xp", json!(1.0)).unwrap();
    engine.tick().unwrap();
    engine
        .register_intent_handler(
            "START_JOB",
            progress::start_job_handler(engine.state_handle(), "idle"),
        )
        .unwrap();

    engine.enqueue_intent(start_job_intent()).unwrap();
    let summary = engine.tick().unwrap();
    match only_disposition(&summary) {
        ember_core::intent::RouteDisposition::Routed { routing_target, result } => {
            assert_eq!(routing_target, "progressLayer");
            assert_eq!(result["jobId"], json!("mine"));
        }
        other => unreachable!("expected routed, got {other:?}"),
    }
    assert_eq!(
        engine.snapshot().canonical["layers"]["idle"]["jobs"]["mine"]["active"],
        json!(true)
    );
}

#[test]
fn before_any_evaluation_nothing_counts_as_locked() {
    let mut engine =
        Engine::initialize(&gated_section_definition(), &registry(), EngineOptions::default())
            .unwrap();

    // No summary exists yet, so the lock policy passes through and the
    // missing handler is the observed outcome.
    engine.enqueue_intent(start_job_intent()).unwrap();
    let summary = engine.tick().unwrap();
    assert_eq!(only_disposition(&summary).code(), "INTENT_HANDLER_MISSING");
}

#[test]
fn the_recoverable_disposition_vocabulary_is_complete() {
    let mut engine =
        Engine::initialize(&gated_section_definition(), &registry(), EngineOptions::default())
            .unwrap();

    engine.enqueue_intent(Intent::new("NOT_IN_CATALOG")).unwrap();
    engine.enqueue_intent(Intent::new("START_JOB")).unwrap();
    engine
        .enqueue_intent(Intent::new("PULL_GACHA").with_payload(json!({ "targetRef": JOBS_REF })))
        .unwrap();
    let summary = engine.tick().unwrap();

    let codes: Vec<&str> = summary
        .intents_routed
        .iter()
        .map(|routed| routed.disposition.code())
        .collect();
    assert_eq!(
        codes,
        vec![
            "INTENT_CATALOG_MISSING",
            "INTENT_PAYLOAD_INVALID",
            "INTENT_HANDLER_MISSING",
        ]
    );
    // Rejections never halt the tick.
    assert_eq!(summary.updated_layers, vec!["idle"]);
}

#[test]
fn intents_route_in_enqueue_order() {
    let mut engine =
        Engine::initialize(&gated_section_definition(), &registry(), EngineOptions::default())
            .unwrap();
    for job in ["a", "b", "c"] {
        engine
            .enqueue_intent(
                Intent::new("START_JOB")
                    .with_payload(json!({ "targetRef": JOBS_REF, "jobId": job })),
            )
            .unwrap();
    }
    let summary = engine.tick().unwrap();
    let types: Vec<&str> = summary
        .intents_routed
        .iter()
        .map(|routed| routed.ty.as_str())
        .collect();
    assert_eq!(types, vec!["START_JOB", "START_JOB", "START_JOB"]);
}
