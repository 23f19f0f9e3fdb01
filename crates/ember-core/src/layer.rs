// SPDX-License-Identifier: Apache-2.0
//! Layer contract and host plumbing.
//!
//! A layer is a plugin module owning one top-level entry in the
//! definition's `layers` array. Layers never touch engine internals
//! directly: each instance receives a [`LayerContext`] carrying an event
//! publisher, a state facade scoped to the layer's own namespace, and the
//! modifier/reset service handles. The scoped facade is a structural
//! guarantee, not a convention — a suffix that would escape into another
//! layer's namespace is rejected before any write happens.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use ember_defs::LayerDef;

use crate::bus::EventPublisher;
use crate::event::Event;
use crate::modifier::ModifierResolver;
use crate::reset::LayerResetService;
use crate::store::{StateStore, StoreError};

/// Canonical namespace root for layer-owned state.
const LAYERS_ROOT: &str = "layers";

/// Errors from layer registration, construction, and lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    /// Registration with an empty kind string.
    #[error("layer kind is empty")]
    EmptyKind,
    /// A factory is already registered for the kind.
    #[error("duplicate layer factory for kind `{kind}`")]
    DuplicateKind {
        /// Offending kind.
        kind: String,
    },
    /// No factory is registered for a definition's kind.
    #[error("no layer factory registered for kind `{kind}`")]
    UnknownKind {
        /// Missing kind.
        kind: String,
    },
    /// A constructed instance does not honor the layer contract.
    #[error("layer `{layer_id}` violates the layer contract: {detail}")]
    ContractViolation {
        /// Layer id from the definition.
        layer_id: String,
        /// What was wrong.
        detail: String,
    },
    /// A lifecycle call failed.
    #[error("layer `{layer_id}` failed during {stage}: {reason}")]
    Lifecycle {
        /// Layer id from the definition.
        layer_id: String,
        /// Lifecycle stage (`init`, `update`).
        stage: &'static str,
        /// Layer-supplied reason.
        reason: String,
    },
}

/// The layer contract.
///
/// `view_model` is part of the v1 contract; the default body returns
/// `Value::Null` so trivial layers stay terse. The host copies each
/// layer's view model into derived state every tick.
pub trait Layer {
    /// Layer id; must equal the definition entry's id.
    fn id(&self) -> &str;

    /// Layer kind; must equal the definition entry's type.
    fn kind(&self) -> &str;

    /// One-time setup after construction.
    fn init(&mut self, ctx: &LayerContext) -> Result<(), LayerError>;

    /// Per-tick update during the layer-update phase.
    fn update(&mut self, dt: f64, ctx: &LayerContext) -> Result<(), LayerError>;

    /// Delivery of a subscribed event during the dispatch phase.
    fn on_event(&mut self, event: &Event, ctx: &LayerContext);

    /// Teardown in reverse creation order.
    fn destroy(&mut self, ctx: &LayerContext);

    /// Read-only presentation model for the host.
    fn view_model(&self) -> Value {
        Value::Null
    }
}

/// Factory constructing a layer instance from its definition entry.
pub type LayerFactoryFn = Box<dyn Fn(&LayerDef) -> Result<Box<dyn Layer>, LayerError>>;

/// Registry mapping layer kinds to factories.
#[derive(Default)]
pub struct LayerRegistry {
    factories: FxHashMap<String, LayerFactoryFn>,
}

impl std::fmt::Debug for LayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerRegistry")
            .field("kinds", &self.factories.len())
            .finish_non_exhaustive()
    }
}

impl LayerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `kind`. Duplicates and empty kinds fail.
    pub fn register(&mut self, kind: &str, factory: LayerFactoryFn) -> Result<(), LayerError> {
        if kind.trim().is_empty() {
            return Err(LayerError::EmptyKind);
        }
        if self.factories.contains_key(kind) {
            return Err(LayerError::DuplicateKind {
                kind: kind.to_owned(),
            });
        }
        self.factories.insert(kind.to_owned(), factory);
        Ok(())
    }

    /// Constructs an instance for a definition entry and asserts the
    /// contract: the instance must report the entry's id and kind.
    pub fn create(&self, def: &LayerDef) -> Result<Box<dyn Layer>, LayerError> {
        let Some(factory) = self.factories.get(&def.kind) else {
            return Err(LayerError::UnknownKind {
                kind: def.kind.clone(),
            });
        };
        let instance = factory(def)?;
        if instance.id() != def.id {
            return Err(LayerError::ContractViolation {
                layer_id: def.id.clone(),
                detail: format!("instance reports id `{}`", instance.id()),
            });
        }
        if instance.kind() != def.kind {
            return Err(LayerError::ContractViolation {
                layer_id: def.id.clone(),
                detail: format!("instance reports kind `{}`", instance.kind()),
            });
        }
        Ok(instance)
    }
}

/// State facade scoped to one layer.
///
/// Global reads are unrestricted; writes are confined to the layer's own
/// `layers.<id>` subtree. Reads return owned clones: the store lives
/// behind a shared cell and cannot hand out references.
#[derive(Clone)]
pub struct ScopedState {
    store: Rc<RefCell<StateStore>>,
    layer_id: String,
}

impl std::fmt::Debug for ScopedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedState")
            .field("layer_id", &self.layer_id)
            .finish_non_exhaustive()
    }
}

impl ScopedState {
    pub(crate) fn new(store: Rc<RefCell<StateStore>>, layer_id: impl Into<String>) -> Self {
        Self {
            store,
            layer_id: layer_id.into(),
        }
    }

    /// Reads any path, canonical or derived.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        self.store.borrow().get(path).cloned()
    }

    /// The layer's own subtree, or `None` before its first write.
    #[must_use]
    pub fn get_own(&self) -> Option<Value> {
        self.get(&self.own_path(""))
    }

    /// Writes inside the layer's own namespace.
    pub fn set_own(&self, suffix: &str, value: Value) -> Result<(), StoreError> {
        let path = self.guarded_own_path(suffix)?;
        self.store.borrow_mut().set(&path, value)
    }

    /// Patches inside the layer's own namespace.
    pub fn patch_own(&self, suffix: &str, partial: Value) -> Result<(), StoreError> {
        let path = self.guarded_own_path(suffix)?;
        self.store.borrow_mut().patch(&path, partial)
    }

    fn guarded_own_path(&self, suffix: &str) -> Result<String, StoreError> {
        if suffix == LAYERS_ROOT || suffix.starts_with("layers.") {
            return Err(StoreError::CrossLayerWrite {
                suffix: suffix.to_owned(),
            });
        }
        if suffix.trim().is_empty() {
            return Err(StoreError::EmptyPath);
        }
        Ok(self.own_path(suffix))
    }

    fn own_path(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("{LAYERS_ROOT}.{}", self.layer_id)
        } else {
            format!("{LAYERS_ROOT}.{}.{suffix}", self.layer_id)
        }
    }
}

/// Everything a layer instance may touch.
#[derive(Clone)]
pub struct LayerContext {
    /// Scoped event bus facade.
    pub events: EventPublisher,
    /// Scoped state facade.
    pub state: ScopedState,
    /// Softcap modifier resolver.
    pub modifiers: Rc<ModifierResolver>,
    /// Layer reset service.
    pub reset: Rc<LayerResetService>,
}

impl std::fmt::Debug for LayerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerContext")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
