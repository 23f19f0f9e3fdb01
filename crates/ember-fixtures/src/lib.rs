// SPDX-License-Identifier: Apache-2.0
//! Shared test fixtures for the Ember runtime.
//!
//! Sample content packs, a call-recording layer double, and a collecting
//! telemetry sink. Everything here is deterministic and I/O-free; the
//! fixtures exist so unit and integration suites across the workspace
//! exercise identical content.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Value, json};

use ember_core::bus::DispatchReport;
use ember_core::event::Event;
use ember_core::layer::{Layer, LayerContext, LayerError, LayerFactoryFn};
use ember_core::phase::Phase;
use ember_core::telemetry::TelemetrySink;
use ember_defs::LayerDef;

/// The vertical-slice pack: one `idle` progress layer whose `jobs`
/// section holds an always-unlocked element and an xp-gated one.
#[must_use]
pub fn sample_definition() -> Value {
    json!({
        "meta": { "schemaVersion": "1.0.0", "gameId": "sample" },
        "systems": { "tickRate": 60 },
        "state": {
            "resources": { "xp": 0.0, "gold": 0.0 },
            "flags": {},
            "layers": { "idle": { "xp": 0.0, "jobs": {} } }
        },
        "layers": [{
            "id": "idle",
            "type": "progressLayer",
            "reset": { "keep": ["resources.gold"] },
            "sublayers": [{
                "id": "main",
                "type": "panel",
                "sections": [{
                    "id": "jobs",
                    "elements": [
                        { "id": "always-on", "type": "job" },
                        {
                            "id": "xp-gated",
                            "type": "job",
                            "unlock": { "resourceGte": { "path": "resources.xp", "amount": 1 } }
                        }
                    ]
                }]
            }]
        }]
    })
}

/// A richer pack: the sample layer plus softcaps, an effect reference,
/// and a flag-gated recording layer.
#[must_use]
pub fn richer_definition() -> Value {
    json!({
        "meta": { "schemaVersion": "1.0.0", "gameId": "richer" },
        "systems": { "tickRate": 60 },
        "state": {
            "resources": { "xp": 0.0, "gold": 0.0 },
            "flags": { "prestigeReady": false },
            "layers": { "idle": { "xp": 0.0, "jobs": {} }, "prestige": {} }
        },
        "layers": [
            {
                "id": "idle",
                "type": "progressLayer",
                "reset": { "keep": ["resources.gold"] },
                "softcaps": [
                    { "scope": "layer:idle", "key": "xpRate", "start": 10.0, "exponent": 0.5 }
                ],
                "sublayers": [{
                    "id": "main",
                    "type": "panel",
                    "sections": [{
                        "id": "jobs",
                        "elements": [
                            { "id": "always-on", "type": "job" },
                            {
                                "id": "xp-gated",
                                "type": "job",
                                "unlock": { "resourceGte": { "path": "resources.xp", "amount": 1 } },
                                "effect": { "targetRef": "layer:prestige" }
                            }
                        ]
                    }]
                }]
            },
            {
                "id": "prestige",
                "type": "recordingLayer",
                "unlock": { "flag": "flags.prestigeReady" },
                "sublayers": []
            }
        ]
    })
}

/// Call log shared between a [`RecordingLayer`] and its test.
pub type CallLog = Rc<RefCell<Vec<String>>>;

/// Fresh, empty call log.
#[must_use]
pub fn call_log() -> CallLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Layer double that records every lifecycle call.
///
/// Optionally publishes one scripted event from its first `update`, which
/// is how the dispatch-cascade scenarios drive the bus from the
/// layer-update phase.
pub struct RecordingLayer {
    id: String,
    kind: String,
    log: CallLog,
    publish_once_on_update: Option<(String, Value)>,
}

impl RecordingLayer {
    /// Builds a recording layer.
    #[must_use]
    pub fn new(id: &str, kind: &str, log: CallLog) -> Self {
        Self {
            id: id.to_owned(),
            kind: kind.to_owned(),
            log,
            publish_once_on_update: None,
        }
    }

    /// Scripts one publish from the first `update` call.
    #[must_use]
    pub fn publish_once_on_update(mut self, ty: &str, payload: Value) -> Self {
        self.publish_once_on_update = Some((ty.to_owned(), payload));
        self
    }
}

impl Layer for RecordingLayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn init(&mut self, _ctx: &LayerContext) -> Result<(), LayerError> {
        self.log.borrow_mut().push(format!("init:{}", self.id));
        Ok(())
    }

    fn update(&mut self, dt: f64, ctx: &LayerContext) -> Result<(), LayerError> {
        self.log.borrow_mut().push(format!("update:{}:{dt}", self.id));
        if let Some((ty, payload)) = self.publish_once_on_update.take() {
            ctx.events
                .publish(ember_core::event::EventDraft::new(ty).payload(payload))
                .map_err(|error| LayerError::Lifecycle {
                    layer_id: self.id.clone(),
                    stage: "update",
                    reason: error.to_string(),
                })?;
        }
        Ok(())
    }

    fn on_event(&mut self, event: &Event, _ctx: &LayerContext) {
        self.log
            .borrow_mut()
            .push(format!("event:{}:{}", self.id, event.ty));
    }

    fn destroy(&mut self, _ctx: &LayerContext) {
        self.log.borrow_mut().push(format!("destroy:{}", self.id));
    }

    fn view_model(&self) -> Value {
        json!({ "calls": self.log.borrow().len() })
    }
}

/// Factory producing [`RecordingLayer`] instances for `kind`.
#[must_use]
pub fn recording_factory(kind: &str, log: &CallLog) -> LayerFactoryFn {
    let kind = kind.to_owned();
    let log = Rc::clone(log);
    Box::new(move |def: &LayerDef| {
        Ok(Box::new(RecordingLayer::new(&def.id, &kind, Rc::clone(&log))) as Box<dyn Layer>)
    })
}

/// Factory whose instances misreport their id, for contract-assertion
/// tests.
#[must_use]
pub fn mismatched_id_factory(kind: &str, log: &CallLog) -> LayerFactoryFn {
    let kind = kind.to_owned();
    let log = Rc::clone(log);
    Box::new(move |def: &LayerDef| {
        let wrong_id = format!("{}-imposter", def.id);
        Ok(Box::new(RecordingLayer::new(&wrong_id, &kind, Rc::clone(&log))) as Box<dyn Layer>)
    })
}

/// Telemetry sink that collects everything it is told.
#[derive(Debug, Default)]
pub struct CollectingSink {
    /// Phase entries as `(tick, phase name)`.
    pub phases: RefCell<Vec<(u64, &'static str)>>,
    /// Unlock transitions as `(tick, target ref)`.
    pub transitions: RefCell<Vec<(u64, String)>>,
    /// Dispatch reports per tick.
    pub reports: RefCell<Vec<(u64, DispatchReport)>>,
}

impl CollectingSink {
    /// Fresh, empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase names recorded for `tick`, in entry order.
    #[must_use]
    pub fn phases_for_tick(&self, tick: u64) -> Vec<&'static str> {
        self.phases
            .borrow()
            .iter()
            .filter(|(entry_tick, _)| *entry_tick == tick)
            .map(|(_, name)| *name)
            .collect()
    }
}

impl TelemetrySink for CollectingSink {
    fn on_phase(&self, tick: u64, phase: Phase) {
        self.phases.borrow_mut().push((tick, phase.name()));
    }

    fn on_dispatch_report(&self, tick: u64, report: &DispatchReport) {
        self.reports.borrow_mut().push((tick, report.clone()));
    }

    fn on_unlock_transition(&self, tick: u64, target_ref: &str) {
        self.transitions
            .borrow_mut()
            .push((tick, target_ref.to_owned()));
    }
}
