// SPDX-License-Identifier: Apache-2.0
//! Startup validation gate.
//!
//! Validation is a gate, not a stream of warnings: every schema and
//! reference issue across the whole pack is collected into one
//! [`ValidationReport`] and reported together, and no runtime is built from
//! a pack that produced any issue. Each issue carries a stable machine
//! code, a JSON-pointer-style path, a human message, and a remediation
//! hint.
//!
//! [`ValidatedDefinition`] is the proof token the engine constructor
//! demands; it can only be produced here.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::condition::{Condition, lookup_path};
use crate::definition::GameDefinition;
use crate::digest::{DefinitionDigest, definition_digest};
use crate::noderef::NodeRef;

/// Major schema version this runtime understands.
const SUPPORTED_SCHEMA_MAJOR: u64 = 1;

/// Canonical schema version rendering, used in hints.
const CANONICAL_SCHEMA_VERSION: &str = "1.0.0";

/// Stable machine codes for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCode {
    /// The raw pack did not deserialize into the definition model.
    SchemaInvalid,
    /// `meta.schemaVersion` is missing, malformed, or has the wrong major.
    SchemaVersionUnsupported,
    /// A required id was empty after trimming.
    IdEmpty,
    /// Two siblings share an id within the same scope.
    DuplicateSiblingId,
    /// A layer is missing its kind.
    TypeMissing,
    /// The initial `state` entry is not a JSON object.
    StateNotObject,
    /// An unlock condition failed to parse.
    ConditionInvalid,
    /// An unlock condition reads a path absent from the initial state.
    UnknownStatePath,
    /// A node reference string failed to parse.
    BadNodeRef,
    /// An effect target does not resolve to a node in the tree.
    UnknownTargetRef,
    /// A softcap scope does not resolve to a node in the tree.
    UnknownSoftcapScope,
}

impl IssueCode {
    /// Stable machine-readable code string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SchemaInvalid => "DEF_SCHEMA_INVALID",
            Self::SchemaVersionUnsupported => "DEF_SCHEMA_VERSION_UNSUPPORTED",
            Self::IdEmpty => "DEF_ID_EMPTY",
            Self::DuplicateSiblingId => "DEF_DUPLICATE_SIBLING_ID",
            Self::TypeMissing => "DEF_TYPE_MISSING",
            Self::StateNotObject => "DEF_STATE_NOT_OBJECT",
            Self::ConditionInvalid => "DEF_CONDITION_INVALID",
            Self::UnknownStatePath => "DEF_UNKNOWN_STATE_PATH",
            Self::BadNodeRef => "DEF_BAD_NODE_REF",
            Self::UnknownTargetRef => "DEF_UNKNOWN_TARGET_REF",
            Self::UnknownSoftcapScope => "DEF_UNKNOWN_SOFTCAP_SCOPE",
        }
    }
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Machine code for the failure class.
    pub code: IssueCode,
    /// JSON-pointer-style location in the raw pack.
    pub path: String,
    /// Human-readable description.
    pub message: String,
    /// Remediation hint.
    pub hint: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} (hint: {})",
            self.code.as_str(),
            self.path,
            self.message,
            self.hint
        )
    }
}

/// Aggregate of every issue found in one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    /// Issues in discovery order.
    pub issues: Vec<ValidationIssue>,
}

impl std::error::Error for ValidationReport {}

impl ValidationReport {
    /// Wraps a deserialization failure as a single-issue report.
    #[must_use]
    pub fn from_parse_error(error: &serde_json::Error) -> Self {
        Self {
            issues: vec![ValidationIssue {
                code: IssueCode::SchemaInvalid,
                path: "/".to_owned(),
                message: error.to_string(),
                hint: "fix the pack shape to match the definition schema".to_owned(),
            }],
        }
    }

    /// Whether any issue was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, code: IssueCode, path: String, message: String, hint: &str) {
        self.issues.push(ValidationIssue {
            code,
            path,
            message,
            hint: hint.to_owned(),
        });
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "definition validation failed with {} issue(s):", self.issues.len())?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

/// A definition that passed the gate, plus its content digest.
///
/// This type cannot be constructed outside this module; holding one is
/// proof the pack validated clean.
#[derive(Debug, Clone)]
pub struct ValidatedDefinition {
    definition: GameDefinition,
    digest: DefinitionDigest,
}

impl ValidatedDefinition {
    /// The validated definition tree.
    #[must_use]
    pub fn definition(&self) -> &GameDefinition {
        &self.definition
    }

    /// Content digest of the validated pack.
    #[must_use]
    pub fn digest(&self) -> DefinitionDigest {
        self.digest
    }

    /// Splits into the owned definition and its digest.
    #[must_use]
    pub fn into_parts(self) -> (GameDefinition, DefinitionDigest) {
        (self.definition, self.digest)
    }
}

/// Runs the full gate over a definition.
///
/// Collects every issue before returning; a clean pass yields the
/// [`ValidatedDefinition`] proof token.
pub fn validate(definition: GameDefinition) -> Result<ValidatedDefinition, ValidationReport> {
    let mut report = ValidationReport::default();

    check_meta(&definition, &mut report);
    check_state_shape(&definition, &mut report);
    check_tree_ids(&definition, &mut report);

    let known_refs = collect_known_refs(&definition);
    check_unlocks(&definition, &mut report);
    check_effects(&definition, &known_refs, &mut report);
    check_softcaps(&definition, &known_refs, &mut report);

    if report.is_empty() {
        let digest = definition_digest(&definition);
        Ok(ValidatedDefinition { definition, digest })
    } else {
        Err(report)
    }
}

fn check_meta(definition: &GameDefinition, report: &mut ValidationReport) {
    let version = definition.meta.schema_version.trim();
    if !schema_version_supported(version) {
        report.push(
            IssueCode::SchemaVersionUnsupported,
            "/meta/schemaVersion".to_owned(),
            format!("unsupported schema version `{version}`"),
            &format!(
                "use the canonical three-part form `{CANONICAL_SCHEMA_VERSION}` with major {SUPPORTED_SCHEMA_MAJOR}"
            ),
        );
    }
    if definition.meta.game_id.trim().is_empty() {
        report.push(
            IssueCode::IdEmpty,
            "/meta/gameId".to_owned(),
            "gameId is empty".to_owned(),
            "give the pack a stable identifier",
        );
    }
}

fn schema_version_supported(version: &str) -> bool {
    let mut parts = version.split('.');
    let major = parts.next().and_then(|p| p.parse::<u64>().ok());
    let minor = parts.next().and_then(|p| p.parse::<u64>().ok());
    let patch = parts.next().and_then(|p| p.parse::<u64>().ok());
    parts.next().is_none()
        && minor.is_some()
        && patch.is_some()
        && major == Some(SUPPORTED_SCHEMA_MAJOR)
}

fn check_state_shape(definition: &GameDefinition, report: &mut ValidationReport) {
    if !definition.state.is_object() {
        report.push(
            IssueCode::StateNotObject,
            "/state".to_owned(),
            "initial state must be a JSON object".to_owned(),
            "wrap the initial state in an object tree",
        );
    }
}

fn check_tree_ids(definition: &GameDefinition, report: &mut ValidationReport) {
    check_sibling_ids(
        definition.layers.iter().map(|layer| layer.id.as_str()),
        "/layers",
        report,
    );
    for (li, layer) in definition.layers.iter().enumerate() {
        if layer.kind.trim().is_empty() {
            report.push(
                IssueCode::TypeMissing,
                format!("/layers/{li}/type"),
                format!("layer `{}` has no type", layer.id),
                "name the layer kind registered with the layer registry",
            );
        }
        check_sibling_ids(
            layer.sublayers.iter().map(|sublayer| sublayer.id.as_str()),
            &format!("/layers/{li}/sublayers"),
            report,
        );
        for (si, sublayer) in layer.sublayers.iter().enumerate() {
            check_sibling_ids(
                sublayer.sections.iter().map(|section| section.id.as_str()),
                &format!("/layers/{li}/sublayers/{si}/sections"),
                report,
            );
            for (ci, section) in sublayer.sections.iter().enumerate() {
                check_sibling_ids(
                    section.elements.iter().map(|element| element.id.as_str()),
                    &format!("/layers/{li}/sublayers/{si}/sections/{ci}/elements"),
                    report,
                );
            }
        }
    }
}

fn check_sibling_ids<'a>(
    ids: impl Iterator<Item = &'a str>,
    base_path: &str,
    report: &mut ValidationReport,
) {
    let mut seen: HashSet<&str> = HashSet::new();
    for (index, id) in ids.enumerate() {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            report.push(
                IssueCode::IdEmpty,
                format!("{base_path}/{index}/id"),
                "id is empty".to_owned(),
                "give every node a non-empty id",
            );
            continue;
        }
        if !seen.insert(trimmed) {
            report.push(
                IssueCode::DuplicateSiblingId,
                format!("{base_path}/{index}/id"),
                format!("sibling id `{trimmed}` appears more than once"),
                "sibling ids must be unique within their scope",
            );
        }
    }
}

fn check_unlocks(definition: &GameDefinition, report: &mut ValidationReport) {
    let mut entries: Vec<(String, &Value)> = Vec::new();
    for (li, layer) in definition.layers.iter().enumerate() {
        if let Some(raw) = &layer.unlock {
            entries.push((format!("/layers/{li}/unlock"), raw));
        }
        for (si, sublayer) in layer.sublayers.iter().enumerate() {
            if let Some(raw) = &sublayer.unlock {
                entries.push((format!("/layers/{li}/sublayers/{si}/unlock"), raw));
            }
            for (ci, section) in sublayer.sections.iter().enumerate() {
                if let Some(raw) = &section.unlock {
                    entries.push((
                        format!("/layers/{li}/sublayers/{si}/sections/{ci}/unlock"),
                        raw,
                    ));
                }
                for (ei, element) in section.elements.iter().enumerate() {
                    if let Some(raw) = &element.unlock {
                        entries.push((
                            format!(
                                "/layers/{li}/sublayers/{si}/sections/{ci}/elements/{ei}/unlock"
                            ),
                            raw,
                        ));
                    }
                }
            }
        }
    }

    for (path, raw) in entries {
        match Condition::parse(raw) {
            Ok(condition) => {
                for state_path in condition.paths() {
                    if lookup_path(&definition.state, state_path).is_none() {
                        report.push(
                            IssueCode::UnknownStatePath,
                            path.clone(),
                            format!(
                                "unlock reads `{state_path}`, which is absent from the initial state"
                            ),
                            "declare the path in the initial state tree",
                        );
                    }
                }
            }
            Err(error) => report.push(
                IssueCode::ConditionInvalid,
                path,
                format!("[{}] {error}", error.code()),
                "fix the condition to a single-operator object",
            ),
        }
    }
}

fn collect_known_refs(definition: &GameDefinition) -> HashSet<String> {
    let mut known = HashSet::new();
    definition.visit_nodes(|node_ref, _, _| {
        known.insert(node_ref.to_string());
    });
    known
}

fn check_effects(
    definition: &GameDefinition,
    known_refs: &HashSet<String>,
    report: &mut ValidationReport,
) {
    for (li, layer) in definition.layers.iter().enumerate() {
        for (si, sublayer) in layer.sublayers.iter().enumerate() {
            for (ci, section) in sublayer.sections.iter().enumerate() {
                for (ei, element) in section.elements.iter().enumerate() {
                    let Some(effect) = &element.effect else {
                        continue;
                    };
                    let path = format!(
                        "/layers/{li}/sublayers/{si}/sections/{ci}/elements/{ei}/effect/targetRef"
                    );
                    check_reference(
                        &effect.target_ref,
                        known_refs,
                        IssueCode::UnknownTargetRef,
                        path,
                        report,
                    );
                }
            }
        }
    }
}

fn check_softcaps(
    definition: &GameDefinition,
    known_refs: &HashSet<String>,
    report: &mut ValidationReport,
) {
    for (li, layer) in definition.layers.iter().enumerate() {
        for (ci, softcap) in layer.softcaps.iter().enumerate() {
            let path = format!("/layers/{li}/softcaps/{ci}/scope");
            check_reference(
                &softcap.scope,
                known_refs,
                IssueCode::UnknownSoftcapScope,
                path,
                report,
            );
        }
    }
}

fn check_reference(
    raw: &str,
    known_refs: &HashSet<String>,
    missing_code: IssueCode,
    path: String,
    report: &mut ValidationReport,
) {
    match NodeRef::parse(raw) {
        Ok(parsed) => {
            let canonical = parsed.to_string();
            if !known_refs.contains(&canonical) {
                report.push(
                    missing_code,
                    path,
                    format!("`{canonical}` does not resolve to a node in this pack"),
                    "reference an existing layer/sublayer/section/element",
                );
            }
        }
        Err(error) => report.push(
            IssueCode::BadNodeRef,
            path,
            format!("[{}] {error}", error.code()),
            "use the canonical `layer:<id>/sublayer:<id>/...` form",
        ),
    }
}
