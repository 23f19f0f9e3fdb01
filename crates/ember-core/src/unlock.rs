// SPDX-License-Identifier: Apache-2.0
//! Unlock evaluation.
//!
//! The evaluator enumerates every node reference in the definition at
//! construction (depth-first: layer, then each sublayer, section, element,
//! siblings in array order), parses each node's unlock condition once, and
//! starts everything locked. Unlock state is monotone within a session: a
//! target that evaluates `true` stays `true` and is never re-evaluated,
//! which also keeps lock checks cheap.
//!
//! Evaluation runs only in the end-of-tick phase; each new transition
//! publishes `UNLOCKED { targetRef }` in enumeration order.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use ember_defs::condition::{Condition, ConditionError};
use ember_defs::GameDefinition;

use crate::bus::{BusError, EventPublisher};
use crate::catalog::UNLOCKED_EVENT;
use crate::event::EventDraft;
use crate::phase::Phase;

/// Errors from unlock evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnlockError {
    /// `evaluate_all` called outside the end-of-tick phase.
    #[error("unlock evaluation requires the `unlock-evaluation` phase, got `{found}`")]
    WrongPhase {
        /// Phase the call happened in.
        found: &'static str,
    },
    /// Publishing an `UNLOCKED` event failed.
    #[error(transparent)]
    Publish(#[from] BusError),
}

/// Result of one end-of-tick evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockSummary {
    /// Currently unlocked references, in enumeration order.
    pub unlocked_refs: Vec<String>,
    /// Unlock state of every reference.
    pub unlocked: BTreeMap<String, bool>,
    /// References that transitioned this pass, in enumeration order.
    pub transitions: Vec<String>,
}

struct UnlockTarget {
    node_ref: String,
    condition: Condition,
}

/// Monotone per-node unlock state over a validated definition.
pub struct UnlockEvaluator {
    targets: Vec<UnlockTarget>,
    unlocked: Vec<bool>,
}

impl std::fmt::Debug for UnlockEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockEvaluator")
            .field("targets", &self.targets.len())
            .field(
                "unlocked",
                &self.unlocked.iter().filter(|flag| **flag).count(),
            )
            .finish_non_exhaustive()
    }
}

impl UnlockEvaluator {
    /// Enumerates every node and parses its condition (absent unlocks
    /// default to `always: true`).
    ///
    /// The validation gate has already proven these conditions parse, so
    /// an error here indicates the definition was tampered with after
    /// validation.
    pub fn new(definition: &GameDefinition) -> Result<Self, ConditionError> {
        let mut targets = Vec::new();
        for (node_ref, unlock) in definition.enumerate_nodes() {
            let condition = match unlock {
                Some(raw) => Condition::parse(raw)?,
                None => Condition::Always(true),
            };
            targets.push(UnlockTarget {
                node_ref: node_ref.to_string(),
                condition,
            });
        }
        let unlocked = vec![false; targets.len()];
        Ok(Self { targets, unlocked })
    }

    /// Evaluates every still-locked target against the canonical snapshot,
    /// publishing `UNLOCKED` for each new transition.
    pub fn evaluate_all(
        &mut self,
        phase: Phase,
        canonical: &Value,
        publisher: &EventPublisher,
    ) -> Result<UnlockSummary, UnlockError> {
        if phase != Phase::UnlockEvaluation {
            return Err(UnlockError::WrongPhase { found: phase.name() });
        }

        let mut transitions = Vec::new();
        for (position, target) in self.targets.iter().enumerate() {
            if self.unlocked[position] {
                continue;
            }
            if target.condition.evaluate(canonical) {
                self.unlocked[position] = true;
                transitions.push(target.node_ref.clone());
                publisher.publish(
                    EventDraft::new(UNLOCKED_EVENT)
                        .source("UnlockEvaluator")
                        .payload(json!({ "targetRef": target.node_ref })),
                )?;
            }
        }

        Ok(self.summary_with_transitions(transitions))
    }

    /// Progress estimate for every target, pure with respect to the store.
    #[must_use]
    pub fn progress_all(&self, canonical: &Value) -> BTreeMap<String, f64> {
        self.targets
            .iter()
            .map(|target| {
                (
                    target.node_ref.clone(),
                    target.condition.progress(canonical),
                )
            })
            .collect()
    }

    fn summary_with_transitions(&self, transitions: Vec<String>) -> UnlockSummary {
        let mut unlocked_refs = Vec::new();
        let mut unlocked = BTreeMap::new();
        for (position, target) in self.targets.iter().enumerate() {
            let flag = self.unlocked[position];
            if flag {
                unlocked_refs.push(target.node_ref.clone());
            }
            unlocked.insert(target.node_ref.clone(), flag);
        }
        UnlockSummary {
            unlocked_refs,
            unlocked,
            transitions,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::bus::{BusConfig, EventBus};
    use crate::catalog::EventCatalog;

    fn evaluator() -> UnlockEvaluator {
        let definition = GameDefinition::from_value(&json!({
            "meta": { "schemaVersion": "1.0.0", "gameId": "t" },
            "state": { "resources": { "xp": 0 } },
            "layers": [{
                "id": "idle",
                "type": "progressLayer",
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
        }))
        .unwrap();
        UnlockEvaluator::new(&definition).unwrap()
    }

    fn lenient_bus() -> EventBus {
        EventBus::new(
            EventCatalog::seeded(),
            BusConfig {
                strict: false,
                ..BusConfig::default()
            },
        )
    }

    const GATED: &str = "layer:idle/sublayer:main/section:jobs/element:xp-gated";

    #[test]
    fn rejects_every_other_phase() {
        let mut evaluator = evaluator();
        let bus = lenient_bus();
        for phase in Phase::ALL {
            if phase == Phase::UnlockEvaluation {
                continue;
            }
            let err = evaluator
                .evaluate_all(phase, &json!({}), &bus.publisher())
                .unwrap_err();
            assert!(matches!(err, UnlockError::WrongPhase { .. }));
        }
    }

    #[test]
    fn transitions_surface_in_enumeration_order_and_publish_unlocked() {
        let mut evaluator = evaluator();
        let bus = lenient_bus();
        let state = json!({ "resources": { "xp": 0 } });
        let summary = evaluator
            .evaluate_all(Phase::UnlockEvaluation, &state, &bus.publisher())
            .unwrap();

        assert_eq!(
            summary.transitions,
            vec![
                "layer:idle",
                "layer:idle/sublayer:main",
                "layer:idle/sublayer:main/section:jobs",
                "layer:idle/sublayer:main/section:jobs/element:always-on",
            ]
        );
        assert_eq!(summary.unlocked.get(GATED), Some(&false));
        assert_eq!(bus.queued_len(), 4, "one UNLOCKED per transition");
    }

    #[test]
    fn unlock_state_is_monotone() {
        let mut evaluator = evaluator();
        let bus = lenient_bus();
        let publisher = bus.publisher();

        let rich = json!({ "resources": { "xp": 5 } });
        let summary = evaluator
            .evaluate_all(Phase::UnlockEvaluation, &rich, &publisher)
            .unwrap();
        assert!(summary.transitions.contains(&GATED.to_owned()));

        // Dropping the resource below the gate must not relock anything,
        // and an already-unlocked target emits no second transition.
        let poor = json!({ "resources": { "xp": 0 } });
        let summary = evaluator
            .evaluate_all(Phase::UnlockEvaluation, &poor, &publisher)
            .unwrap();
        assert!(summary.transitions.is_empty());
        assert_eq!(summary.unlocked.get(GATED), Some(&true));
    }

    #[test]
    fn progress_is_bounded_and_pure() {
        let evaluator = evaluator();
        let state = json!({ "resources": { "xp": 0.5 } });
        let progress = evaluator.progress_all(&state);
        assert_eq!(progress.len(), 5);
        for (node_ref, value) in &progress {
            assert!((0.0..=1.0).contains(value), "{node_ref}: {value}");
        }
        assert_eq!(progress.get(GATED), Some(&0.5));
    }
}
