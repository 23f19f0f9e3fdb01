// SPDX-License-Identifier: Apache-2.0
//! Layer reset service.
//!
//! A reset rebuilds canonical state from the definition's initial tree,
//! carrying over the values at the layer's `reset.keep` paths. The swap is
//! wholesale: the baseline is assembled off to the side and replaces the
//! canonical namespace in one move, so observers never see intermediate
//! states. Every executed reset publishes `LAYER_RESET_EXECUTED` with the
//! keep paths that actually had values to preserve.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use ember_defs::GameDefinition;

use rustc_hash::FxHashMap;

use crate::bus::{BusError, EventPublisher};
use crate::catalog::LAYER_RESET_EXECUTED_EVENT;
use crate::event::EventDraft;
use crate::paths;
use crate::store::{StateStore, StoreError};

/// Default reason tag when an execute call carries none.
const DEFAULT_RESET_REASON: &str = "reset-executed";

/// Errors from reset preview/execute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResetError {
    /// The layer id does not exist in the definition.
    #[error("unknown layer `{layer_id}`")]
    UnknownLayer {
        /// Offending layer id.
        layer_id: String,
    },
    /// Assembling the baseline failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Publishing the executed event failed.
    #[error(transparent)]
    Publish(#[from] BusError),
}

/// What a reset would keep, without executing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPreview {
    /// Layer the preview is for.
    pub layer_id: String,
    /// Sanitized keep paths in declaration order.
    pub keep_paths: Vec<String>,
    /// Whether any keep rules exist.
    pub has_keep_rules: bool,
}

/// Preview and atomic execution of layer resets.
pub struct LayerResetService {
    store: Rc<RefCell<StateStore>>,
    publisher: EventPublisher,
    initial_state: Value,
    keep_paths: FxHashMap<String, Vec<String>>,
}

impl std::fmt::Debug for LayerResetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerResetService")
            .field("layers", &self.keep_paths.len())
            .finish_non_exhaustive()
    }
}

impl LayerResetService {
    /// Builds the service over a validated definition.
    ///
    /// Keep paths are sanitized once: trimmed, empties dropped, order
    /// preserved.
    #[must_use]
    pub fn new(
        definition: &GameDefinition,
        store: Rc<RefCell<StateStore>>,
        publisher: EventPublisher,
    ) -> Self {
        let mut keep_paths = FxHashMap::default();
        for layer in &definition.layers {
            let sanitized: Vec<String> = layer
                .reset
                .as_ref()
                .map(|reset| {
                    reset
                        .keep
                        .iter()
                        .map(|path| path.trim().to_owned())
                        .filter(|path| !path.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            keep_paths.insert(layer.id.clone(), sanitized);
        }
        Self {
            store,
            publisher,
            initial_state: definition.state.clone(),
            keep_paths,
        }
    }

    /// Keep rules for a layer, without executing anything.
    pub fn preview(&self, layer_id: &str) -> Result<ResetPreview, ResetError> {
        let keep = self.keep(layer_id)?;
        Ok(ResetPreview {
            layer_id: layer_id.to_owned(),
            has_keep_rules: !keep.is_empty(),
            keep_paths: keep.clone(),
        })
    }

    /// Executes a reset: initial state plus kept values, swapped in
    /// wholesale, then `LAYER_RESET_EXECUTED` is queued.
    pub fn execute(&self, layer_id: &str, reason: Option<&str>) -> Result<(), ResetError> {
        let keep = self.keep(layer_id)?;

        let current = self.store.borrow().snapshot();
        let mut baseline = self.initial_state.clone();
        let mut preserved_keys = Vec::new();
        for path in keep {
            if let Some(value) = paths::lookup(&current.canonical, path) {
                paths::set_at(&mut baseline, path, value.clone())?;
                preserved_keys.push(path.clone());
            }
        }

        self.store.borrow_mut().replace_canonical(baseline);
        self.publisher.publish(
            EventDraft::new(LAYER_RESET_EXECUTED_EVENT)
                .source("LayerResetService")
                .payload(json!({
                    "layerId": layer_id,
                    "preservedKeys": preserved_keys,
                    "reason": reason.unwrap_or(DEFAULT_RESET_REASON),
                })),
        )?;
        Ok(())
    }

    fn keep(&self, layer_id: &str) -> Result<&Vec<String>, ResetError> {
        self.keep_paths
            .get(layer_id)
            .ok_or_else(|| ResetError::UnknownLayer {
                layer_id: layer_id.to_owned(),
            })
    }
}
