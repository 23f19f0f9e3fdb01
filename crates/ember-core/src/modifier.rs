// SPDX-License-Identifier: Apache-2.0
//! Softcap modifier resolution.
//!
//! At construction the resolver indexes every layer's softcap declarations
//! by `(normalized scope reference, key)`. Declarations that do not parse
//! or carry unusable parameters are skipped at index time; resolution is
//! therefore infallible and returns the base value untouched for pairs
//! nothing applies to.

use rustc_hash::FxHashMap;

use ember_defs::{GameDefinition, NodeRef};

use crate::softcap;

#[derive(Debug, Clone, Copy)]
struct CapParams {
    start: f64,
    exponent: f64,
}

/// Index of softcaps by `(scope reference, key)`.
#[derive(Debug, Default)]
pub struct ModifierResolver {
    index: FxHashMap<(String, String), Vec<CapParams>>,
}

impl ModifierResolver {
    /// Indexes every usable softcap declaration, in declaration order.
    #[must_use]
    pub fn new(definition: &GameDefinition) -> Self {
        let mut index: FxHashMap<(String, String), Vec<CapParams>> = FxHashMap::default();
        for layer in &definition.layers {
            for cap in &layer.softcaps {
                let Ok(scope) = NodeRef::parse(&cap.scope) else {
                    continue;
                };
                if cap.key.trim().is_empty() || !softcap::params_valid(cap.start, cap.exponent) {
                    continue;
                }
                index
                    .entry((scope.to_string(), cap.key.clone()))
                    .or_default()
                    .push(CapParams {
                        start: cap.start,
                        exponent: cap.exponent,
                    });
            }
        }
        Self { index }
    }

    /// Resolves the effective value for `(target_ref, key)`.
    ///
    /// Applies every indexed softcap for the pair in declaration order;
    /// unindexed pairs and unparseable references return `base` untouched.
    #[must_use]
    pub fn resolve(&self, target_ref: &str, key: &str, base: f64) -> f64 {
        let Ok(scope) = NodeRef::parse(target_ref) else {
            return base;
        };
        let Some(caps) = self.index.get(&(scope.to_string(), key.to_owned())) else {
            return base;
        };
        let resolved = caps
            .iter()
            .fold(base, |value, cap| softcap::apply(value, cap.start, cap.exponent));
        if resolved.is_finite() { resolved } else { base }
    }

    /// Number of indexed `(scope, key)` pairs.
    #[must_use]
    pub fn indexed_pairs(&self) -> usize {
        self.index.len()
    }
}
