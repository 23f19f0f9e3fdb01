// SPDX-License-Identifier: Apache-2.0
//! Tick phases and the in-order phase gate.
//!
//! A tick is the fixed sequence `input, time, layer-update,
//! event-dispatch, unlock-evaluation, render`, each phase entered exactly
//! once. [`PhaseCursor`] is the gate: it starts before the first phase and
//! admits only the next phase in sequence; anything else is a programmer
//! error surfaced before side effects.

use crate::engine::EngineError;

/// One step of the tick pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Intent draining and routing.
    Input,
    /// Delta-time acquisition and validation.
    Time,
    /// Layer updates in definition order.
    LayerUpdate,
    /// Queued event dispatch.
    EventDispatch,
    /// End-of-tick unlock evaluation.
    UnlockEvaluation,
    /// UI projection.
    Render,
}

impl Phase {
    /// All phases in tick order.
    pub const ALL: [Phase; 6] = [
        Phase::Input,
        Phase::Time,
        Phase::LayerUpdate,
        Phase::EventDispatch,
        Phase::UnlockEvaluation,
        Phase::Render,
    ];

    /// Content-facing phase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Time => "time",
            Self::LayerUpdate => "layer-update",
            Self::EventDispatch => "event-dispatch",
            Self::UnlockEvaluation => "unlock-evaluation",
            Self::Render => "render",
        }
    }
}

/// Per-tick gate over the fixed phase sequence.
#[derive(Debug, Default)]
pub(crate) struct PhaseCursor {
    position: Option<usize>,
}

impl PhaseCursor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Admits `phase` iff it is the next phase in sequence.
    pub(crate) fn enter(&mut self, phase: Phase) -> Result<(), EngineError> {
        let next = self.position.map_or(0, |current| current + 1);
        match Phase::ALL.get(next) {
            Some(expected) if *expected == phase => {
                self.position = Some(next);
                Ok(())
            }
            Some(expected) => Err(EngineError::PhaseOrder {
                expected: expected.name(),
                found: phase.name(),
            }),
            None => Err(EngineError::PhaseOrder {
                expected: "end-of-tick",
                found: phase.name(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn admits_the_full_sequence_exactly_once() {
        let mut cursor = PhaseCursor::new();
        for phase in Phase::ALL {
            cursor.enter(phase).unwrap();
        }
        assert!(cursor.enter(Phase::Input).is_err());
    }

    #[test]
    fn rejects_skipping_a_phase() {
        let mut cursor = PhaseCursor::new();
        cursor.enter(Phase::Input).unwrap();
        let err = cursor.enter(Phase::LayerUpdate).unwrap_err();
        assert!(err.to_string().contains("time"));
    }

    #[test]
    fn rejects_starting_mid_sequence() {
        let mut cursor = PhaseCursor::new();
        assert!(cursor.enter(Phase::Render).is_err());
    }
}
