// SPDX-License-Identifier: Apache-2.0
//! UI projection.
//!
//! The render phase composes a pure object tree from the definition
//! filtered by the current unlock summary. A node appears iff it and every
//! ancestor are unlocked; locked subtrees are omitted entirely rather than
//! flagged.

use std::collections::BTreeMap;

use serde::Serialize;

use ember_defs::{GameDefinition, NodeRef};

/// Root of the UI projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UiTree {
    /// Unlocked layers in definition order.
    pub layers: Vec<UiLayer>,
}

/// One unlocked layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiLayer {
    /// Layer id.
    pub id: String,
    /// Layer kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Canonical node reference.
    pub node_ref: String,
    /// Unlocked sublayers in definition order.
    pub sublayers: Vec<UiSublayer>,
}

/// One unlocked sublayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiSublayer {
    /// Sublayer id.
    pub id: String,
    /// Sublayer kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Canonical node reference.
    pub node_ref: String,
    /// Unlocked sections in definition order.
    pub sections: Vec<UiSection>,
}

/// One unlocked section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiSection {
    /// Section id.
    pub id: String,
    /// Canonical node reference.
    pub node_ref: String,
    /// Unlocked elements in definition order.
    pub elements: Vec<UiElement>,
}

/// One unlocked element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiElement {
    /// Element id.
    pub id: String,
    /// Element kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Canonical node reference.
    pub node_ref: String,
}

/// Composes the UI tree for the current unlock state.
///
/// `unlocked` maps every node reference to its unlock flag; references
/// absent from the map count as locked.
#[must_use]
pub fn compose(definition: &GameDefinition, unlocked: &BTreeMap<String, bool>) -> UiTree {
    let is_unlocked = |node_ref: &NodeRef| {
        unlocked
            .get(&node_ref.to_string())
            .copied()
            .unwrap_or(false)
    };

    let mut layers = Vec::new();
    for layer in &definition.layers {
        let layer_ref = NodeRef::for_layer(layer.id.clone());
        if !is_unlocked(&layer_ref) {
            continue;
        }
        let mut sublayers = Vec::new();
        for sublayer in &layer.sublayers {
            let sublayer_ref = layer_ref.clone().with_sublayer(sublayer.id.clone());
            if !is_unlocked(&sublayer_ref) {
                continue;
            }
            let mut sections = Vec::new();
            for section in &sublayer.sections {
                let section_ref = sublayer_ref.clone().with_section(section.id.clone());
                if !is_unlocked(&section_ref) {
                    continue;
                }
                let mut elements = Vec::new();
                for element in &section.elements {
                    let element_ref = section_ref.clone().with_element(element.id.clone());
                    if !is_unlocked(&element_ref) {
                        continue;
                    }
                    elements.push(UiElement {
                        id: element.id.clone(),
                        kind: element.kind.clone(),
                        node_ref: element_ref.to_string(),
                    });
                }
                sections.push(UiSection {
                    id: section.id.clone(),
                    node_ref: section_ref.to_string(),
                    elements,
                });
            }
            sublayers.push(UiSublayer {
                id: sublayer.id.clone(),
                kind: sublayer.kind.clone(),
                node_ref: sublayer_ref.to_string(),
                sections,
            });
        }
        layers.push(UiLayer {
            id: layer.id.clone(),
            kind: layer.kind.clone(),
            node_ref: layer_ref.to_string(),
            sublayers,
        });
    }
    UiTree { layers }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    fn definition() -> GameDefinition {
        GameDefinition::from_value(&json!({
            "meta": { "schemaVersion": "1.0.0", "gameId": "t" },
            "state": {},
            "layers": [{
                "id": "idle",
                "type": "progressLayer",
                "sublayers": [{
                    "id": "main",
                    "type": "panel",
                    "sections": [{
                        "id": "jobs",
                        "elements": [
                            { "id": "a", "type": "job" },
                            { "id": "b", "type": "job" }
                        ]
                    }]
                }]
            }]
        }))
        .unwrap()
    }

    fn unlocked_map(entries: &[(&str, bool)]) -> BTreeMap<String, bool> {
        entries
            .iter()
            .map(|(node_ref, flag)| ((*node_ref).to_owned(), *flag))
            .collect()
    }

    #[test]
    fn locked_nodes_and_their_subtrees_are_omitted() {
        let definition = definition();
        let unlocked = unlocked_map(&[
            ("layer:idle", true),
            ("layer:idle/sublayer:main", true),
            ("layer:idle/sublayer:main/section:jobs", true),
            ("layer:idle/sublayer:main/section:jobs/element:a", true),
            ("layer:idle/sublayer:main/section:jobs/element:b", false),
        ]);
        let tree = compose(&definition, &unlocked);
        let ids: Vec<&str> = tree.layers[0].sublayers[0].sections[0]
            .elements
            .iter()
            .map(|element| element.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn a_locked_ancestor_hides_unlocked_descendants() {
        let definition = definition();
        let unlocked = unlocked_map(&[
            ("layer:idle", true),
            ("layer:idle/sublayer:main", false),
            ("layer:idle/sublayer:main/section:jobs", true),
            ("layer:idle/sublayer:main/section:jobs/element:a", true),
        ]);
        let tree = compose(&definition, &unlocked);
        assert_eq!(tree.layers.len(), 1);
        assert!(tree.layers[0].sublayers.is_empty());
    }

    #[test]
    fn node_refs_are_canonical_strings() {
        let definition = definition();
        let unlocked = unlocked_map(&[
            ("layer:idle", true),
            ("layer:idle/sublayer:main", true),
            ("layer:idle/sublayer:main/section:jobs", true),
        ]);
        let tree = compose(&definition, &unlocked);
        assert_eq!(
            tree.layers[0].sublayers[0].sections[0].node_ref,
            "layer:idle/sublayer:main/section:jobs"
        );
    }
}
