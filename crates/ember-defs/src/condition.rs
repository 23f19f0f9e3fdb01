// SPDX-License-Identifier: Apache-2.0
//! Unlock conditions.
//!
//! Content packs express unlock rules as single-operator JSON objects
//! (`{"resourceGte": {"path": "resources.xp", "amount": 1}}`). This module
//! parses that form into a closed sum type, evaluates it against a
//! canonical-state snapshot, and estimates progress toward satisfaction.
//!
//! Parsing is the only place errors can appear. Evaluation and progress are
//! total: missing state paths and wrong-typed values read as `false` /
//! progress `0`, never as failures, so content can outlive state-layout
//! drift between versions.

use serde_json::Value;
use thiserror::Error;

/// Largest progress value a still-unsatisfied strict comparison may report.
///
/// Strict thresholds (`gt`, `lt`) at exact equality are not satisfied, so
/// their progress is clamped below `1.0`; the negation of the same
/// comparison reports exactly `1.0`.
const STRICT_PROGRESS_CAP: f64 = 1.0 - f64::EPSILON;

/// Comparison operators accepted by the `compare` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Exactly equal.
    Eq,
    /// Not equal.
    Neq,
}

impl CompareOp {
    /// Canonical operator keyword.
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Eq => "eq",
            Self::Neq => "neq",
        }
    }

    fn from_keyword(raw: &str) -> Option<Self> {
        match raw {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "eq" => Some(Self::Eq),
            "neq" => Some(Self::Neq),
            _ => None,
        }
    }

    fn holds(self, current: f64, value: f64) -> bool {
        match self {
            Self::Gt => current > value,
            Self::Gte => current >= value,
            Self::Lt => current < value,
            Self::Lte => current <= value,
            Self::Eq => current == value,
            Self::Neq => current != value,
        }
    }
}

/// Errors produced while parsing a raw condition value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// The raw value was not a JSON object.
    #[error("condition must be an object")]
    NotAnObject,
    /// The object did not carry exactly one operator key.
    #[error("condition must carry exactly one operator, found {found}")]
    OperatorCount {
        /// Number of keys present.
        found: usize,
    },
    /// The operator key was not recognized.
    #[error("unknown condition operator `{name}`")]
    UnknownOperator {
        /// Offending operator key.
        name: String,
    },
    /// The operator payload had the wrong shape.
    #[error("bad `{operator}` payload: {reason}")]
    BadPayload {
        /// Operator whose payload failed.
        operator: &'static str,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// An `all`/`any` group had no children.
    #[error("`{operator}` requires at least one child condition")]
    EmptyGroup {
        /// Group operator name.
        operator: &'static str,
    },
    /// A `compare` payload named an invalid operator.
    #[error("invalid compare operator `{raw}`")]
    BadCompareOp {
        /// Offending compare keyword.
        raw: String,
    },
}

impl ConditionError {
    /// Stable machine code for the failure mode.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAnObject => "COND_NOT_AN_OBJECT",
            Self::OperatorCount { .. } => "COND_OPERATOR_COUNT",
            Self::UnknownOperator { .. } => "COND_UNKNOWN_OPERATOR",
            Self::BadPayload { .. } => "COND_BAD_PAYLOAD",
            Self::EmptyGroup { .. } => "COND_EMPTY_GROUP",
            Self::BadCompareOp { .. } => "COND_BAD_COMPARE_OP",
        }
    }
}

/// Parsed unlock condition tree.
///
/// Exactly one operator per node; `all`/`any` carry at least one child.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Constant truth value.
    Always(bool),
    /// State value at `path` is a finite number `>= amount`.
    ResourceGte {
        /// Dot-delimited canonical state path.
        path: String,
        /// Threshold amount.
        amount: f64,
    },
    /// State value at `path` compared against `value` with `op`.
    Compare {
        /// Dot-delimited canonical state path.
        path: String,
        /// Comparison operator.
        op: CompareOp,
        /// Right-hand value.
        value: f64,
    },
    /// State value at `path` is exactly `true`.
    Flag {
        /// Dot-delimited canonical state path.
        path: String,
    },
    /// Short-circuit conjunction over children.
    All(Vec<Condition>),
    /// Short-circuit disjunction over children.
    Any(Vec<Condition>),
    /// Logical negation of the child.
    Not(Box<Condition>),
}

impl Condition {
    /// Parses a raw JSON condition into its tree form.
    pub fn parse(raw: &Value) -> Result<Self, ConditionError> {
        let Some(object) = raw.as_object() else {
            return Err(ConditionError::NotAnObject);
        };
        if object.len() != 1 {
            return Err(ConditionError::OperatorCount {
                found: object.len(),
            });
        }
        // `len() == 1` above guarantees the iterator yields one entry.
        let Some((operator, payload)) = object.iter().next() else {
            return Err(ConditionError::OperatorCount { found: 0 });
        };

        match operator.as_str() {
            "always" => match payload.as_bool() {
                Some(value) => Ok(Self::Always(value)),
                None => Err(ConditionError::BadPayload {
                    operator: "always",
                    reason: "expected a boolean",
                }),
            },
            "resourceGte" => {
                let path = require_path(payload, "resourceGte")?;
                let amount = require_number(payload, "amount", "resourceGte")?;
                Ok(Self::ResourceGte { path, amount })
            }
            "compare" => {
                let path = require_path(payload, "compare")?;
                let value = require_number(payload, "value", "compare")?;
                let raw_op = payload
                    .get("op")
                    .and_then(Value::as_str)
                    .ok_or(ConditionError::BadPayload {
                        operator: "compare",
                        reason: "expected a string `op`",
                    })?;
                let op = CompareOp::from_keyword(raw_op).ok_or_else(|| {
                    ConditionError::BadCompareOp {
                        raw: raw_op.to_owned(),
                    }
                })?;
                Ok(Self::Compare { path, op, value })
            }
            "flag" => match payload.as_str() {
                Some(path) if !path.trim().is_empty() => Ok(Self::Flag {
                    path: path.trim().to_owned(),
                }),
                Some(_) => Err(ConditionError::BadPayload {
                    operator: "flag",
                    reason: "path must be non-empty",
                }),
                None => Err(ConditionError::BadPayload {
                    operator: "flag",
                    reason: "expected a string path",
                }),
            },
            "all" => Ok(Self::All(parse_group(payload, "all")?)),
            "any" => Ok(Self::Any(parse_group(payload, "any")?)),
            "not" => Ok(Self::Not(Box::new(Self::parse(payload)?))),
            other => Err(ConditionError::UnknownOperator {
                name: other.to_owned(),
            }),
        }
    }

    /// Evaluates the condition against a canonical-state snapshot.
    ///
    /// Missing paths and wrong-typed values read as `false` for every
    /// state-reading leaf.
    #[must_use]
    pub fn evaluate(&self, state: &Value) -> bool {
        match self {
            Self::Always(value) => *value,
            Self::ResourceGte { path, amount } => {
                read_number(state, path).is_some_and(|current| current >= *amount)
            }
            Self::Compare { path, op, value } => {
                read_number(state, path).is_some_and(|current| op.holds(current, *value))
            }
            Self::Flag { path } => {
                matches!(lookup_path(state, path), Some(Value::Bool(true)))
            }
            Self::All(children) => children.iter().all(|child| child.evaluate(state)),
            Self::Any(children) => children.iter().any(|child| child.evaluate(state)),
            Self::Not(child) => !child.evaluate(state),
        }
    }

    /// Deterministic progress estimate in `[0, 1]`.
    ///
    /// Binary leaves report `0` or `1`; threshold leaves interpolate toward
    /// the target; groups combine children by arithmetic mean (`all`) or
    /// maximum (`any`).
    #[must_use]
    pub fn progress(&self, state: &Value) -> f64 {
        match self {
            Self::Always(value) => f64::from(u8::from(*value)),
            Self::ResourceGte { path, amount } => {
                if self.evaluate(state) {
                    1.0
                } else if *amount <= 0.0 {
                    // Missing-path reads cannot satisfy a non-positive
                    // threshold, so this branch is binary-false.
                    0.0
                } else {
                    let current = read_number(state, path).unwrap_or(0.0);
                    clamp01(current / *amount)
                }
            }
            Self::Compare { path, op, value } => {
                let current = read_number(state, path).unwrap_or(0.0);
                match op {
                    CompareOp::Eq | CompareOp::Neq => f64::from(u8::from(self.evaluate(state))),
                    CompareOp::Gt => threshold_progress(current, *value, true, true),
                    CompareOp::Gte => threshold_progress(current, *value, true, false),
                    CompareOp::Lt => threshold_progress(current, *value, false, true),
                    CompareOp::Lte => threshold_progress(current, *value, false, false),
                }
            }
            Self::Flag { .. } => f64::from(u8::from(self.evaluate(state))),
            Self::All(children) => {
                let total: f64 = children.iter().map(|child| child.progress(state)).sum();
                // Parse guarantees at least one child.
                clamp01(total / children.len().max(1) as f64)
            }
            Self::Any(children) => clamp01(
                children
                    .iter()
                    .map(|child| child.progress(state))
                    .fold(0.0, f64::max),
            ),
            Self::Not(child) => {
                if self.evaluate(state) {
                    1.0
                } else {
                    clamp01(1.0 - child.progress(state))
                }
            }
        }
    }

    /// Every canonical-state path the condition tree reads.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Always(_) => {}
            Self::ResourceGte { path, .. } | Self::Compare { path, .. } | Self::Flag { path } => {
                out.push(path);
            }
            Self::All(children) | Self::Any(children) => {
                for child in children {
                    child.collect_paths(out);
                }
            }
            Self::Not(child) => child.collect_paths(out),
        }
    }
}

fn parse_group(payload: &Value, operator: &'static str) -> Result<Vec<Condition>, ConditionError> {
    let Some(entries) = payload.as_array() else {
        return Err(ConditionError::BadPayload {
            operator,
            reason: "expected an array of conditions",
        });
    };
    if entries.is_empty() {
        return Err(ConditionError::EmptyGroup { operator });
    }
    entries.iter().map(Condition::parse).collect()
}

fn require_path(payload: &Value, operator: &'static str) -> Result<String, ConditionError> {
    let raw = payload
        .get("path")
        .and_then(Value::as_str)
        .ok_or(ConditionError::BadPayload {
            operator,
            reason: "expected a string `path`",
        })?;
    let path = raw.trim();
    if path.is_empty() {
        return Err(ConditionError::BadPayload {
            operator,
            reason: "path must be non-empty",
        });
    }
    Ok(path.to_owned())
}

fn require_number(
    payload: &Value,
    key: &'static str,
    operator: &'static str,
) -> Result<f64, ConditionError> {
    payload
        .get(key)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
        .ok_or(ConditionError::BadPayload {
            operator,
            reason: "expected a finite number",
        })
}

/// Looks up a dot-delimited path in a JSON tree, traversing objects only.
#[must_use]
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cursor = root;
    for segment in path.split('.') {
        cursor = cursor.as_object()?.get(segment)?;
    }
    Some(cursor)
}

fn read_number(state: &Value, path: &str) -> Option<f64> {
    lookup_path(state, path)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
}

fn clamp01(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Progress toward a numeric threshold.
///
/// `at_least` selects the direction; `strict` marks `gt`/`lt`. The at-most
/// direction mirrors at-least under negation of both operands, so only one
/// formula exists.
fn threshold_progress(current: f64, target: f64, at_least: bool, strict: bool) -> f64 {
    if !at_least {
        return threshold_progress(-current, -target, true, strict);
    }
    let satisfied = if strict {
        current > target
    } else {
        current >= target
    };
    if satisfied {
        return 1.0;
    }
    let computed = if current >= target {
        // Strict comparison sitting exactly on the boundary.
        1.0
    } else if target == 0.0 {
        1.0 / (1.0 + current.abs())
    } else if target > 0.0 {
        clamp01(current / target)
    } else {
        // Unsatisfied negative target implies `current < target < 0`.
        clamp01(target / current)
    };
    if strict {
        computed.min(STRICT_PROGRESS_CAP)
    } else {
        computed
    }
}
