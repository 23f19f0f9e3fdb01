// SPDX-License-Identifier: Apache-2.0
//! Canonical/derived state store.
//!
//! The store is the engine's sole shared mutable resource. It holds two
//! disjoint namespaces: *canonical* state (authoritative, persistable,
//! seeded from the definition's initial tree) and *derived* state
//! (recomputable projections such as the unlock summary). The split is a
//! hard runtime invariant, not a convention: canonical writes into the
//! `derived` namespace are rejected, and derived state has its own write
//! entry point.
//!
//! Snapshots are owned deep copies. Rust ownership is the freeze: a
//! [`StateSnapshot`] cannot alias live store internals.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::paths;

/// Prefix that routes reads into the derived namespace.
const DERIVED_PREFIX: &str = "derived.";

/// Root key of the derived namespace.
const DERIVED_ROOT: &str = "derived";

/// Errors produced by state-store writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Canonical write targeted the derived namespace.
    #[error("canonical write into the derived namespace is denied: `{path}`")]
    DerivedWriteDenied {
        /// Offending path.
        path: String,
    },
    /// A path was empty or contained an empty segment.
    #[error("state path is empty or has an empty segment")]
    EmptyPath,
    /// A write would traverse an existing non-object value.
    #[error("path `{path}` traverses a non-object value")]
    PathThroughNonObject {
        /// Offending path.
        path: String,
    },
    /// A patch targeted an existing non-object value.
    #[error("patch target `{path}` exists and is not an object")]
    PatchTargetNotObject {
        /// Offending path.
        path: String,
    },
    /// A patch payload was not an object.
    #[error("patch payload must be an object")]
    PatchValueNotObject,
    /// A layer-scoped write tried to leave its own namespace.
    #[error("cross-layer write denied: suffix `{suffix}` escapes the layer namespace")]
    CrossLayerWrite {
        /// Offending path suffix.
        suffix: String,
    },
}

/// Owned, internally consistent copy of both namespaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    /// Canonical namespace at snapshot time.
    pub canonical: Value,
    /// Derived namespace at snapshot time.
    pub derived: Value,
}

/// Canonical + derived state behind a write policy.
#[derive(Debug, Clone)]
pub struct StateStore {
    canonical: Value,
    derived: Value,
}

impl StateStore {
    /// Builds a store seeded with the given canonical tree.
    #[must_use]
    pub fn new(initial_canonical: Value) -> Self {
        Self {
            canonical: initial_canonical,
            derived: Value::Object(Map::new()),
        }
    }

    /// Reads the value at `path`.
    ///
    /// Paths under `derived.` read the derived namespace; anything else
    /// reads canonical state. Missing segments read as `None`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        if path == DERIVED_ROOT {
            return Some(&self.derived);
        }
        if let Some(rest) = path.strip_prefix(DERIVED_PREFIX) {
            return paths::lookup(&self.derived, rest);
        }
        paths::lookup(&self.canonical, path)
    }

    /// Writes `value` into canonical state at `path`.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), StoreError> {
        Self::guard_canonical(path)?;
        paths::set_at(&mut self.canonical, path, value)
    }

    /// Shallow-merges an object `partial` into canonical state at `path`.
    ///
    /// The existing node must be absent or an object.
    pub fn patch(&mut self, path: &str, partial: Value) -> Result<(), StoreError> {
        Self::guard_canonical(path)?;
        let Value::Object(partial) = partial else {
            return Err(StoreError::PatchValueNotObject);
        };
        paths::merge_at(&mut self.canonical, path, &partial)
    }

    /// Writes `value` into the derived namespace at `path`.
    pub fn set_derived(&mut self, path: &str, value: Value) -> Result<(), StoreError> {
        paths::set_at(&mut self.derived, path, value)
    }

    /// Owned deep copy of both namespaces.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            canonical: self.canonical.clone(),
            derived: self.derived.clone(),
        }
    }

    /// Read-only handle on the canonical tree.
    #[must_use]
    pub fn canonical_root(&self) -> &Value {
        &self.canonical
    }

    /// Atomically replaces the whole canonical namespace.
    ///
    /// Reserved for the layer reset service; derived state is untouched.
    pub fn replace_canonical(&mut self, next: Value) {
        self.canonical = next;
    }

    fn guard_canonical(path: &str) -> Result<(), StoreError> {
        if path == DERIVED_ROOT || path.starts_with(DERIVED_PREFIX) {
            return Err(StoreError::DerivedWriteDenied {
                path: path.to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store() -> StateStore {
        StateStore::new(json!({"resources": {"xp": 1, "gold": 2}}))
    }

    #[test]
    fn canonical_writes_into_derived_fail_without_mutation() {
        let mut store = store();
        let before = store.snapshot();
        for path in ["derived", "derived.unlocks", "derived.unlocks.unlocked"] {
            let err = store.set(path, json!(1)).unwrap_err();
            assert!(matches!(err, StoreError::DerivedWriteDenied { .. }), "{path}");
            let err = store.patch(path, json!({"a": 1})).unwrap_err();
            assert!(matches!(err, StoreError::DerivedWriteDenied { .. }), "{path}");
        }
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn derived_prefix_reads_the_derived_namespace() {
        let mut store = store();
        store.set_derived("unlocks.count", json!(3)).unwrap();
        assert_eq!(store.get("derived.unlocks.count"), Some(&json!(3)));
        // A canonical subtree literally named `derived` is unreachable by
        // design; the prefix always routes to the derived namespace.
        assert_eq!(store.get("unlocks.count"), None);
    }

    #[test]
    fn patch_merges_shallow_and_rejects_scalars() {
        let mut store = store();
        store.patch("resources", json!({"mana": 4})).unwrap();
        assert_eq!(
            store.get("resources"),
            Some(&json!({"xp": 1, "gold": 2, "mana": 4}))
        );
        assert!(matches!(
            store.patch("resources.xp", json!({"a": 1})),
            Err(StoreError::PatchTargetNotObject { .. })
        ));
        assert!(matches!(
            store.patch("resources", json!(5)),
            Err(StoreError::PatchValueNotObject)
        ));
    }

    #[test]
    fn snapshots_are_detached_copies() {
        let mut store = store();
        let snapshot = store.snapshot();
        store.set("resources.xp", json!(99)).unwrap();
        assert_eq!(snapshot.canonical["resources"]["xp"], json!(1));
        assert_eq!(store.get("resources.xp"), Some(&json!(99)));
    }

    #[test]
    fn replace_canonical_is_wholesale_and_leaves_derived() {
        let mut store = store();
        store.set_derived("unlocks", json!({"n": 1})).unwrap();
        store.replace_canonical(json!({"resources": {"xp": 0}}));
        assert_eq!(store.get("resources.gold"), None);
        assert_eq!(store.get("derived.unlocks.n"), Some(&json!(1)));
    }
}
