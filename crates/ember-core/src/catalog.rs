// SPDX-License-Identifier: Apache-2.0
//! Event and intent catalogs.
//!
//! Catalogs are process-wide immutable registries consulted at publish and
//! route time. Each entry is a static spec: a payload validator function,
//! informational producer tags, the consumer kinds used for subscription
//! wiring, and (for events) the phases the type may be published in.
//! Seeded tables cover the engine's built-in vocabulary; hosts with a
//! different vocabulary build catalogs from their own spec tables.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::phase::Phase;

/// `UNLOCKED { targetRef, reason? }` — a node transitioned to unlocked.
pub const UNLOCKED_EVENT: &str = "UNLOCKED";

/// `LAYER_RESET_REQUESTED { layerId, reason?, sourceIntent? }`.
pub const LAYER_RESET_REQUESTED_EVENT: &str = "LAYER_RESET_REQUESTED";

/// `LAYER_RESET_EXECUTED { layerId, preservedKeys?, reason? }`.
pub const LAYER_RESET_EXECUTED_EVENT: &str = "LAYER_RESET_EXECUTED";

/// `START_JOB { targetRef, jobId }` — begin a job on the progress layer.
pub const START_JOB_INTENT: &str = "START_JOB";

/// `STOP_JOB { targetRef, jobId }` — stop a job on the progress layer.
pub const STOP_JOB_INTENT: &str = "STOP_JOB";

/// `REQUEST_LAYER_RESET { layerId, reason? }` — ask for a layer reset.
pub const REQUEST_LAYER_RESET_INTENT: &str = "REQUEST_LAYER_RESET";

/// `PULL_GACHA { targetRef }` — pull on the gacha layer.
pub const PULL_GACHA_INTENT: &str = "PULL_GACHA";

/// `ACTIVATE_MINIGAME { targetRef }` — activate a minigame.
pub const ACTIVATE_MINIGAME_INTENT: &str = "ACTIVATE_MINIGAME";

/// Payload validator: empty `Ok` means the payload is acceptable.
pub type PayloadValidateFn = fn(&Value) -> Result<(), String>;

/// Lock-check policy applied while routing an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPolicy {
    /// Route regardless of unlock state.
    None,
    /// Reject when the payload's `targetRef` is currently locked.
    RejectIfTargetLocked,
}

/// Static description of one event type.
#[derive(Debug, Clone, Copy)]
pub struct EventSpec {
    /// Event type string.
    pub ty: &'static str,
    /// Phases this type may be published in.
    pub phases: &'static [Phase],
    /// Informational producer tags.
    pub producers: &'static [&'static str],
    /// Layer kinds whose `on_event` is wired to this type.
    pub consumers: &'static [&'static str],
    /// Payload validator.
    pub validate: PayloadValidateFn,
}

/// Static description of one intent type.
#[derive(Debug, Clone, Copy)]
pub struct IntentSpec {
    /// Intent type string.
    pub ty: &'static str,
    /// Logical routing target, reported in dispositions.
    pub routing_target: &'static str,
    /// Lock-check policy.
    pub lock_policy: LockPolicy,
    /// Payload validator.
    pub validate: PayloadValidateFn,
}

/// Seeded event vocabulary.
pub const SEEDED_EVENTS: &[EventSpec] = &[
    EventSpec {
        ty: UNLOCKED_EVENT,
        phases: &[Phase::UnlockEvaluation],
        producers: &["UnlockEvaluator"],
        consumers: &["progressLayer"],
        validate: validate_unlocked,
    },
    EventSpec {
        ty: LAYER_RESET_REQUESTED_EVENT,
        // Layers may request a reset from their own update, so the
        // layer-update phase is permitted alongside input and dispatch.
        phases: &[Phase::Input, Phase::LayerUpdate, Phase::EventDispatch],
        producers: &["GameEngine", "layers"],
        consumers: &["LayerResetService"],
        validate: validate_layer_reset_requested,
    },
    EventSpec {
        ty: LAYER_RESET_EXECUTED_EVENT,
        phases: &[Phase::EventDispatch],
        producers: &["LayerResetService"],
        consumers: &["progressLayer"],
        validate: validate_layer_reset_executed,
    },
];

/// Seeded intent vocabulary.
pub const SEEDED_INTENTS: &[IntentSpec] = &[
    IntentSpec {
        ty: START_JOB_INTENT,
        routing_target: "progressLayer",
        lock_policy: LockPolicy::RejectIfTargetLocked,
        validate: validate_job_intent,
    },
    IntentSpec {
        ty: STOP_JOB_INTENT,
        routing_target: "progressLayer",
        lock_policy: LockPolicy::RejectIfTargetLocked,
        validate: validate_job_intent,
    },
    IntentSpec {
        ty: REQUEST_LAYER_RESET_INTENT,
        routing_target: "LayerResetService",
        lock_policy: LockPolicy::RejectIfTargetLocked,
        validate: validate_request_layer_reset,
    },
    IntentSpec {
        ty: PULL_GACHA_INTENT,
        routing_target: "gachaLayer",
        lock_policy: LockPolicy::RejectIfTargetLocked,
        validate: validate_target_ref_only,
    },
    IntentSpec {
        ty: ACTIVATE_MINIGAME_INTENT,
        routing_target: "minigameLayer",
        lock_policy: LockPolicy::RejectIfTargetLocked,
        validate: validate_target_ref_only,
    },
];

/// Immutable event registry with an index by type.
#[derive(Debug, Clone)]
pub struct EventCatalog {
    specs: &'static [EventSpec],
    index: FxHashMap<&'static str, usize>,
}

impl EventCatalog {
    /// Builds a catalog over a static spec table.
    #[must_use]
    pub fn from_specs(specs: &'static [EventSpec]) -> Self {
        let index = specs
            .iter()
            .enumerate()
            .map(|(position, spec)| (spec.ty, position))
            .collect();
        Self { specs, index }
    }

    /// Catalog over the seeded event vocabulary.
    #[must_use]
    pub fn seeded() -> Self {
        Self::from_specs(SEEDED_EVENTS)
    }

    /// Looks up the spec for an event type.
    #[must_use]
    pub fn spec(&self, ty: &str) -> Option<&EventSpec> {
        self.index.get(ty).map(|position| &self.specs[*position])
    }

    /// All specs in table order.
    #[must_use]
    pub fn specs(&self) -> &'static [EventSpec] {
        self.specs
    }
}

/// Immutable intent registry with an index by type.
#[derive(Debug, Clone)]
pub struct IntentCatalog {
    specs: &'static [IntentSpec],
    index: FxHashMap<&'static str, usize>,
}

impl IntentCatalog {
    /// Builds a catalog over a static spec table.
    #[must_use]
    pub fn from_specs(specs: &'static [IntentSpec]) -> Self {
        let index = specs
            .iter()
            .enumerate()
            .map(|(position, spec)| (spec.ty, position))
            .collect();
        Self { specs, index }
    }

    /// Catalog over the seeded intent vocabulary.
    #[must_use]
    pub fn seeded() -> Self {
        Self::from_specs(SEEDED_INTENTS)
    }

    /// Looks up the spec for an intent type.
    #[must_use]
    pub fn spec(&self, ty: &str) -> Option<&IntentSpec> {
        self.index.get(ty).map(|position| &self.specs[*position])
    }

    /// All specs in table order.
    #[must_use]
    pub fn specs(&self) -> &'static [IntentSpec] {
        self.specs
    }
}

fn require_string_field(payload: &Value, key: &str) -> Result<(), String> {
    match payload.get(key).and_then(Value::as_str) {
        Some(value) if !value.trim().is_empty() => Ok(()),
        Some(_) => Err(format!("`{key}` must be non-empty")),
        None => Err(format!("missing string field `{key}`")),
    }
}

fn optional_string_field(payload: &Value, key: &str) -> Result<(), String> {
    match payload.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(format!("`{key}` must be a string when present")),
    }
}

fn validate_unlocked(payload: &Value) -> Result<(), String> {
    require_string_field(payload, "targetRef")?;
    optional_string_field(payload, "reason")
}

fn validate_layer_reset_requested(payload: &Value) -> Result<(), String> {
    require_string_field(payload, "layerId")?;
    optional_string_field(payload, "reason")?;
    optional_string_field(payload, "sourceIntent")
}

fn validate_layer_reset_executed(payload: &Value) -> Result<(), String> {
    require_string_field(payload, "layerId")?;
    optional_string_field(payload, "reason")?;
    match payload.get("preservedKeys") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(entries)) if entries.iter().all(Value::is_string) => Ok(()),
        Some(_) => Err("`preservedKeys` must be an array of strings".to_owned()),
    }
}

fn validate_job_intent(payload: &Value) -> Result<(), String> {
    require_string_field(payload, "targetRef")?;
    require_string_field(payload, "jobId")
}

fn validate_request_layer_reset(payload: &Value) -> Result<(), String> {
    require_string_field(payload, "layerId")?;
    optional_string_field(payload, "targetRef")?;
    optional_string_field(payload, "reason")
}

fn validate_target_ref_only(payload: &Value) -> Result<(), String> {
    require_string_field(payload, "targetRef")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn seeded_event_catalog_resolves_every_type() {
        let catalog = EventCatalog::seeded();
        for ty in [
            UNLOCKED_EVENT,
            LAYER_RESET_REQUESTED_EVENT,
            LAYER_RESET_EXECUTED_EVENT,
        ] {
            assert!(catalog.spec(ty).is_some(), "{ty}");
        }
        assert!(catalog.spec("NOT_A_THING").is_none());
    }

    #[test]
    fn seeded_intents_all_reject_locked_targets() {
        let catalog = IntentCatalog::seeded();
        assert_eq!(catalog.specs().len(), 5);
        for spec in catalog.specs() {
            assert_eq!(spec.lock_policy, LockPolicy::RejectIfTargetLocked, "{}", spec.ty);
        }
    }

    #[test]
    fn unlocked_validator_requires_target_ref() {
        let spec = EventCatalog::seeded().spec(UNLOCKED_EVENT).copied().unwrap();
        assert!((spec.validate)(&json!({"targetRef": "layer:idle"})).is_ok());
        assert!((spec.validate)(&json!({})).is_err());
        assert!((spec.validate)(&json!({"targetRef": " "})).is_err());
        assert!((spec.validate)(&json!({"targetRef": "layer:idle", "reason": 3})).is_err());
    }

    #[test]
    fn preserved_keys_must_be_strings() {
        let spec = EventCatalog::seeded()
            .spec(LAYER_RESET_EXECUTED_EVENT)
            .copied()
            .unwrap();
        assert!((spec.validate)(&json!({"layerId": "idle", "preservedKeys": ["a"]})).is_ok());
        assert!((spec.validate)(&json!({"layerId": "idle", "preservedKeys": [1]})).is_err());
    }

    #[test]
    fn job_intents_require_both_fields() {
        let spec = IntentCatalog::seeded().spec(START_JOB_INTENT).copied().unwrap();
        assert!((spec.validate)(&json!({"targetRef": "layer:idle", "jobId": "x"})).is_ok());
        assert!((spec.validate)(&json!({"targetRef": "layer:idle"})).is_err());
    }
}
