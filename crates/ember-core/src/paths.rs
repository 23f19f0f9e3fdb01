// SPDX-License-Identifier: Apache-2.0
//! Dot-path helpers over JSON trees.
//!
//! Canonical and derived state are object trees addressed by dot-delimited
//! paths (`resources.xp`, `layers.idle.jobs.mine`). Traversal descends
//! objects only; reads on missing segments return `None`, writes create
//! missing intermediate objects and refuse to tunnel through non-objects.

use serde_json::{Map, Value};

use crate::store::StoreError;

/// Reads the value at `path`, or `None` when any segment is absent.
#[must_use]
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    ember_defs::condition::lookup_path(root, path)
}

/// Writes `value` at `path`, creating missing intermediate objects.
pub fn set_at(root: &mut Value, path: &str, value: Value) -> Result<(), StoreError> {
    let (parent, leaf) = descend_to_parent(root, path)?;
    parent.insert(leaf.to_owned(), value);
    Ok(())
}

/// Shallow-merges the keys of `partial` into the object at `path`.
///
/// The target must be absent (an empty object is created) or already an
/// object.
pub fn merge_at(
    root: &mut Value,
    path: &str,
    partial: &Map<String, Value>,
) -> Result<(), StoreError> {
    let (parent, leaf) = descend_to_parent(root, path)?;
    let slot = parent
        .entry(leaf.to_owned())
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(target) = slot.as_object_mut() else {
        return Err(StoreError::PatchTargetNotObject {
            path: path.to_owned(),
        });
    };
    for (key, value) in partial {
        target.insert(key.clone(), value.clone());
    }
    Ok(())
}

/// Walks to the parent object of the path's final segment, creating
/// intermediate objects as needed.
fn descend_to_parent<'a>(
    root: &'a mut Value,
    path: &str,
) -> Result<(&'a mut Map<String, Value>, String), StoreError> {
    if path.trim().is_empty() {
        return Err(StoreError::EmptyPath);
    }
    let mut segments = path.split('.').peekable();
    let mut cursor = root;
    loop {
        let Some(segment) = segments.next() else {
            return Err(StoreError::EmptyPath);
        };
        if segment.is_empty() {
            return Err(StoreError::EmptyPath);
        }
        let object = match cursor {
            Value::Object(object) => object,
            _ => {
                return Err(StoreError::PathThroughNonObject {
                    path: path.to_owned(),
                });
            }
        };
        if segments.peek().is_none() {
            return Ok((object, segment.to_owned()));
        }
        cursor = object
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}
