// SPDX-License-Identifier: Apache-2.0
//! ember-defs: shared content-pack schema for the Ember runtime.
//!
//! This crate owns everything a pack is made of before a runtime exists:
//! the [`definition`] model, the [`noderef`] codec, the [`condition`]
//! unlock language, the [`validate`] startup gate, and the [`digest`]
//! content identity. It is deliberately runtime-free so tooling (editors,
//! linters, savers) can depend on it without pulling in the engine.

pub mod condition;
pub mod definition;
pub mod digest;
pub mod noderef;
pub mod validate;

pub use condition::{CompareOp, Condition, ConditionError};
pub use definition::{
    EffectDef, ElementDef, GameDefinition, LayerDef, MetaDef, ResetDef, SectionDef, SoftcapDef,
    SublayerDef,
};
pub use digest::{DefinitionDigest, definition_digest};
pub use noderef::{NodeRef, NodeRefError, RefScope, normalize};
pub use validate::{
    IssueCode, ValidatedDefinition, ValidationIssue, ValidationReport, validate,
};
