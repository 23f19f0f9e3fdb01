// SPDX-License-Identifier: Apache-2.0
//! Intent routing.
//!
//! Intents flow through the catalog gate in a fixed order: catalog lookup,
//! payload validation (strict mode), lock policy, handler lookup, handler
//! invocation. Every outcome — routed or rejected — is a
//! [`RouteDisposition`] value with a stable code; routing failures never
//! halt a tick. The router itself mutates nothing: effects happen inside
//! handlers through the state store and event publisher handles they
//! capture.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::catalog::{IntentCatalog, LockPolicy};
use crate::event::Intent;

/// Boxed intent handler; the returned value lands in the disposition.
pub type IntentHandlerFn = Box<dyn FnMut(&Intent) -> Value>;

/// Predicate deciding whether a node reference is currently locked.
pub type LockPredicate = Rc<dyn Fn(&str) -> bool>;

/// Errors from handler registration. Duplicate registration is a
/// programming error, not a last-writer-wins policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// Registration with an empty intent type.
    #[error("intent type is empty")]
    EmptyType,
    /// A handler is already registered for the type.
    #[error("duplicate intent handler for `{ty}`")]
    DuplicateHandler {
        /// Offending type.
        ty: String,
    },
}

/// Outcome of routing one intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all_fields = "camelCase")]
pub enum RouteDisposition {
    /// The handler ran; `result` is whatever it returned.
    #[serde(rename = "INTENT_ROUTED")]
    Routed {
        /// Logical routing target from the catalog.
        routing_target: String,
        /// Handler return value.
        result: Value,
    },
    /// The intent type is absent from the catalog.
    #[serde(rename = "INTENT_CATALOG_MISSING")]
    CatalogMissing,
    /// Strict validation rejected the payload.
    #[serde(rename = "INTENT_PAYLOAD_INVALID")]
    PayloadInvalid {
        /// Validator message.
        reason: String,
    },
    /// The lock policy rejected a locked `targetRef`.
    #[serde(rename = "INTENT_TARGET_LOCKED")]
    TargetLocked {
        /// Logical routing target from the catalog.
        routing_target: String,
    },
    /// The catalog knows the type but no handler is registered.
    #[serde(rename = "INTENT_HANDLER_MISSING")]
    HandlerMissing {
        /// Logical routing target from the catalog.
        routing_target: String,
    },
}

impl RouteDisposition {
    /// Stable outcome code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Routed { .. } => "INTENT_ROUTED",
            Self::CatalogMissing => "INTENT_CATALOG_MISSING",
            Self::PayloadInvalid { .. } => "INTENT_PAYLOAD_INVALID",
            Self::TargetLocked { .. } => "INTENT_TARGET_LOCKED",
            Self::HandlerMissing { .. } => "INTENT_HANDLER_MISSING",
        }
    }

    /// Whether the intent reached a handler.
    #[must_use]
    pub fn is_routed(&self) -> bool {
        matches!(self, Self::Routed { .. })
    }
}

/// Catalog-validated intent router with lock policy.
pub struct IntentRouter {
    catalog: IntentCatalog,
    handlers: FxHashMap<String, IntentHandlerFn>,
    strict: bool,
    is_locked: LockPredicate,
}

impl std::fmt::Debug for IntentRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentRouter")
            .field("handlers", &self.handlers.len())
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

impl IntentRouter {
    /// Builds a router over an intent catalog.
    ///
    /// `is_locked` is the engine-supplied unlock predicate; before the
    /// first unlock evaluation it reports everything unlocked.
    #[must_use]
    pub fn new(catalog: IntentCatalog, strict: bool, is_locked: LockPredicate) -> Self {
        Self {
            catalog,
            handlers: FxHashMap::default(),
            strict,
            is_locked,
        }
    }

    /// Registers the handler for an intent type. Exactly one handler per
    /// type; duplicates fail.
    pub fn register(&mut self, ty: &str, handler: IntentHandlerFn) -> Result<(), RouterError> {
        if ty.trim().is_empty() {
            return Err(RouterError::EmptyType);
        }
        if self.handlers.contains_key(ty) {
            return Err(RouterError::DuplicateHandler { ty: ty.to_owned() });
        }
        self.handlers.insert(ty.to_owned(), handler);
        Ok(())
    }

    /// Routes one normalized intent through the catalog gate.
    pub fn route(&mut self, intent: &Intent) -> RouteDisposition {
        let Some(spec) = self.catalog.spec(&intent.ty) else {
            return RouteDisposition::CatalogMissing;
        };

        if self.strict {
            if let Err(reason) = (spec.validate)(&intent.payload) {
                return RouteDisposition::PayloadInvalid { reason };
            }
        }

        if spec.lock_policy == LockPolicy::RejectIfTargetLocked {
            let target_ref = intent
                .payload
                .get("targetRef")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !target_ref.is_empty() && (self.is_locked)(target_ref) {
                return RouteDisposition::TargetLocked {
                    routing_target: spec.routing_target.to_owned(),
                };
            }
        }

        let Some(handler) = self.handlers.get_mut(&intent.ty) else {
            return RouteDisposition::HandlerMissing {
                routing_target: spec.routing_target.to_owned(),
            };
        };
        let result = handler(intent);
        RouteDisposition::Routed {
            routing_target: spec.routing_target.to_owned(),
            result,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;
    use crate::catalog::{PULL_GACHA_INTENT, START_JOB_INTENT};

    fn unlocked_router(strict: bool) -> IntentRouter {
        IntentRouter::new(IntentCatalog::seeded(), strict, Rc::new(|_| false))
    }

    #[test]
    fn unknown_types_report_catalog_missing() {
        let mut router = unlocked_router(true);
        let outcome = router.route(&Intent::new("NOT_A_THING"));
        assert_eq!(outcome.code(), "INTENT_CATALOG_MISSING");
    }

    #[test]
    fn strict_mode_rejects_bad_payloads() {
        let mut router = unlocked_router(true);
        let outcome = router.route(&Intent::new(START_JOB_INTENT));
        assert_eq!(outcome.code(), "INTENT_PAYLOAD_INVALID");
    }

    #[test]
    fn lenient_mode_skips_payload_validation() {
        let mut router = unlocked_router(false);
        let outcome = router.route(&Intent::new(START_JOB_INTENT));
        assert_eq!(outcome.code(), "INTENT_HANDLER_MISSING");
    }

    #[test]
    fn locked_targets_are_rejected_before_handler_lookup() {
        let mut router = IntentRouter::new(IntentCatalog::seeded(), true, Rc::new(|_| true));
        router
            .register(START_JOB_INTENT, Box::new(|_intent| json!("ran")))
            .unwrap();
        let intent = Intent::new(START_JOB_INTENT)
            .with_payload(json!({"targetRef": "layer:idle", "jobId": "x"}));
        let outcome = router.route(&intent);
        assert_eq!(outcome.code(), "INTENT_TARGET_LOCKED");
        assert!(matches!(
            outcome,
            RouteDisposition::TargetLocked { ref routing_target } if routing_target == "progressLayer"
        ));
    }

    #[test]
    fn routed_intents_carry_the_handler_result() {
        let mut router = unlocked_router(true);
        let calls = Rc::new(Cell::new(0u32));
        {
            let calls = Rc::clone(&calls);
            router
                .register(
                    START_JOB_INTENT,
                    Box::new(move |intent| {
                        calls.set(calls.get() + 1);
                        json!({"startedJob": intent.payload["jobId"]})
                    }),
                )
                .unwrap();
        }
        let intent = Intent::new(START_JOB_INTENT)
            .with_payload(json!({"targetRef": "layer:idle", "jobId": "mine"}));
        let outcome = router.route(&intent);
        assert_eq!(calls.get(), 1);
        assert!(outcome.is_routed());
        match outcome {
            RouteDisposition::Routed {
                routing_target,
                result,
            } => {
                assert_eq!(routing_target, "progressLayer");
                assert_eq!(result, json!({"startedJob": "mine"}));
            }
            other => unreachable!("expected routed, got {other:?}"),
        }
    }

    #[test]
    fn gacha_routes_to_handler_missing_without_a_handler() {
        let mut router = unlocked_router(true);
        let intent = Intent::new(PULL_GACHA_INTENT).with_payload(json!({"targetRef": "layer:idle"}));
        let outcome = router.route(&intent);
        assert!(matches!(
            outcome,
            RouteDisposition::HandlerMissing { ref routing_target } if routing_target == "gachaLayer"
        ));
    }

    #[test]
    fn duplicate_registration_is_a_programming_error() {
        let mut router = unlocked_router(true);
        router
            .register(START_JOB_INTENT, Box::new(|_intent| Value::Null))
            .unwrap();
        let err = router
            .register(START_JOB_INTENT, Box::new(|_intent| Value::Null))
            .unwrap_err();
        assert!(matches!(err, RouterError::DuplicateHandler { .. }));
    }
}
