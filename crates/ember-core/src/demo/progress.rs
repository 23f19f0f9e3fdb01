// SPDX-License-Identifier: Apache-2.0
//! Minimal jobs layer.
//!
//! The progress layer accrues experience for every active job in its own
//! namespace (`layers.<id>.jobs.<jobId>`), at a rate shaped by the
//! `xpRate` softcap modifier. Jobs are started and stopped through the
//! `START_JOB` / `STOP_JOB` intent handlers, which the host registers with
//! [`start_job_handler`] / [`stop_job_handler`].

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Value, json};

use ember_defs::{LayerDef, NodeRef};

use crate::catalog::{LAYER_RESET_EXECUTED_EVENT, UNLOCKED_EVENT};
use crate::event::Event;
use crate::intent::IntentHandlerFn;
use crate::layer::{Layer, LayerContext, LayerError, LayerFactoryFn};
use crate::store::StateStore;

/// Layer kind the factory registers under.
pub const PROGRESS_LAYER_KIND: &str = "progressLayer";

/// Modifier key shaping the accrual rate.
const XP_RATE_KEY: &str = "xpRate";

/// Unmodified accrual rate per active job, per second.
const BASE_XP_RATE: f64 = 1.0;

/// Factory for [`ProgressLayer`] instances.
#[must_use]
pub fn factory() -> LayerFactoryFn {
    Box::new(|def: &LayerDef| Ok(Box::new(ProgressLayer::new(&def.id)) as Box<dyn Layer>))
}

/// Experience-accruing jobs layer.
#[derive(Debug)]
pub struct ProgressLayer {
    id: String,
    node_ref: String,
    xp: f64,
    last_unlocked: Option<String>,
}

impl ProgressLayer {
    /// Builds an instance for the given layer id.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            node_ref: NodeRef::for_layer(id).to_string(),
            xp: 0.0,
            last_unlocked: None,
        }
    }

    fn lifecycle_err(&self, stage: &'static str, reason: impl ToString) -> LayerError {
        LayerError::Lifecycle {
            layer_id: self.id.clone(),
            stage,
            reason: reason.to_string(),
        }
    }

    fn active_job_ids(own: Option<&Value>) -> Vec<String> {
        let Some(jobs) = own
            .and_then(|own| own.get("jobs"))
            .and_then(Value::as_object)
        else {
            return Vec::new();
        };
        jobs.iter()
            .filter(|(_, job)| job.get("active") == Some(&Value::Bool(true)))
            .map(|(job_id, _)| job_id.clone())
            .collect()
    }
}

impl Layer for ProgressLayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        PROGRESS_LAYER_KIND
    }

    fn init(&mut self, ctx: &LayerContext) -> Result<(), LayerError> {
        if ctx.state.get_own().is_none() {
            ctx.state
                .set_own("xp", json!(0.0))
                .map_err(|error| self.lifecycle_err("init", error))?;
        }
        Ok(())
    }

    fn update(&mut self, dt: f64, ctx: &LayerContext) -> Result<(), LayerError> {
        let own = ctx.state.get_own();
        let active = Self::active_job_ids(own.as_ref());
        if active.is_empty() {
            return Ok(());
        }

        let rate = ctx
            .modifiers
            .resolve(&self.node_ref, XP_RATE_KEY, BASE_XP_RATE);
        for job_id in &active {
            let progress = own
                .as_ref()
                .and_then(|own| own.get("jobs"))
                .and_then(|jobs| jobs.get(job_id))
                .and_then(|job| job.get("progress"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            ctx.state
                .patch_own(
                    &format!("jobs.{job_id}"),
                    json!({ "progress": progress + rate * dt }),
                )
                .map_err(|error| self.lifecycle_err("update", error))?;
        }
        self.xp += rate * dt * active.len() as f64;
        ctx.state
            .set_own("xp", json!(self.xp))
            .map_err(|error| self.lifecycle_err("update", error))?;
        Ok(())
    }

    fn on_event(&mut self, event: &Event, _ctx: &LayerContext) {
        match event.ty.as_str() {
            UNLOCKED_EVENT => {
                if let Some(target_ref) = event.payload.get("targetRef").and_then(Value::as_str) {
                    self.last_unlocked = Some(target_ref.to_owned());
                }
            }
            LAYER_RESET_EXECUTED_EVENT => {
                let reset_layer = event.payload.get("layerId").and_then(Value::as_str);
                if reset_layer == Some(self.id.as_str()) {
                    self.xp = 0.0;
                }
            }
            _ => {}
        }
    }

    fn destroy(&mut self, _ctx: &LayerContext) {}

    fn view_model(&self) -> Value {
        json!({
            "xp": self.xp,
            "lastUnlocked": self.last_unlocked,
        })
    }
}

/// Host-side `START_JOB` handler: marks the job active in the layer's
/// canonical namespace.
#[must_use]
pub fn start_job_handler(store: Rc<RefCell<StateStore>>, layer_id: &str) -> IntentHandlerFn {
    job_toggle_handler(store, layer_id, true)
}

/// Host-side `STOP_JOB` handler: marks the job inactive.
#[must_use]
pub fn stop_job_handler(store: Rc<RefCell<StateStore>>, layer_id: &str) -> IntentHandlerFn {
    job_toggle_handler(store, layer_id, false)
}

fn job_toggle_handler(
    store: Rc<RefCell<StateStore>>,
    layer_id: &str,
    active: bool,
) -> IntentHandlerFn {
    let layer_id = layer_id.to_owned();
    Box::new(move |intent| {
        let Some(job_id) = intent.payload.get("jobId").and_then(Value::as_str) else {
            return json!({ "error": "missing jobId" });
        };
        let path = format!("layers.{layer_id}.jobs.{job_id}.active");
        match store.borrow_mut().set(&path, json!(active)) {
            Ok(()) => json!({ "jobId": job_id, "active": active }),
            Err(error) => json!({ "error": error.to_string() }),
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::bus::{BusConfig, EventBus};
    use crate::catalog::EventCatalog;
    use crate::layer::ScopedState;
    use crate::modifier::ModifierResolver;
    use crate::reset::LayerResetService;
    use ember_defs::GameDefinition;
    use serde_json::json;

    fn context(definition: &GameDefinition) -> (Rc<RefCell<StateStore>>, LayerContext) {
        let store = Rc::new(RefCell::new(StateStore::new(definition.state.clone())));
        let bus = EventBus::new(
            EventCatalog::seeded(),
            BusConfig {
                strict: false,
                ..BusConfig::default()
            },
        );
        let publisher = bus.publisher();
        let ctx = LayerContext {
            events: publisher.clone(),
            state: ScopedState::new(Rc::clone(&store), "idle"),
            modifiers: Rc::new(ModifierResolver::new(definition)),
            reset: Rc::new(LayerResetService::new(
                definition,
                Rc::clone(&store),
                publisher,
            )),
        };
        (store, ctx)
    }

    fn definition() -> GameDefinition {
        GameDefinition::from_value(&json!({
            "meta": { "schemaVersion": "1.0.0", "gameId": "demo" },
            "state": { "layers": { "idle": { "xp": 0.0, "jobs": {} } } },
            "layers": [{ "id": "idle", "type": "progressLayer", "sublayers": [] }]
        }))
        .unwrap()
    }

    #[test]
    fn accrues_xp_only_for_active_jobs() {
        let definition = definition();
        let (store, ctx) = context(&definition);
        let mut layer = ProgressLayer::new("idle");
        layer.init(&ctx).unwrap();

        layer.update(1.0, &ctx).unwrap();
        assert_eq!(layer.view_model()["xp"], json!(0.0));

        store
            .borrow_mut()
            .set("layers.idle.jobs.mine.active", json!(true))
            .unwrap();
        layer.update(2.0, &ctx).unwrap();
        assert_eq!(layer.view_model()["xp"], json!(2.0));
        let snapshot = store.borrow().snapshot();
        assert_eq!(
            snapshot.canonical["layers"]["idle"]["jobs"]["mine"]["progress"],
            json!(2.0)
        );
    }

    #[test]
    fn job_handlers_toggle_the_active_flag() {
        let definition = definition();
        let (store, _ctx) = context(&definition);
        let mut start = start_job_handler(Rc::clone(&store), "idle");
        let mut stop = stop_job_handler(Rc::clone(&store), "idle");

        let intent = crate::event::Intent::new("START_JOB")
            .with_payload(json!({"targetRef": "layer:idle", "jobId": "mine"}));
        assert_eq!(start(&intent)["active"], json!(true));
        assert_eq!(
            store.borrow().get("layers.idle.jobs.mine.active"),
            Some(&json!(true))
        );
        assert_eq!(stop(&intent)["active"], json!(false));
    }
}
