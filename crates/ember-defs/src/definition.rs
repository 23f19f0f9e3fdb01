// SPDX-License-Identifier: Apache-2.0
//! Game definition model.
//!
//! The definition is the immutable content-pack tree a runtime is built
//! from: `meta` + `systems` config + the initial canonical `state` + the
//! ordered `layers` hierarchy. Deserialization is strict
//! (`deny_unknown_fields`) so content typos surface at the validation gate
//! instead of silently vanishing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::noderef::{NodeRef, RefScope};

/// Root of a content pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct GameDefinition {
    /// Pack identity and schema version.
    pub meta: MetaDef,
    /// Scalar configuration consumed by engine systems.
    #[serde(default = "empty_object")]
    pub systems: Value,
    /// Initial canonical state tree.
    #[serde(default = "empty_object")]
    pub state: Value,
    /// Ordered layer hierarchy.
    #[serde(default)]
    pub layers: Vec<LayerDef>,
}

/// Pack metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MetaDef {
    /// Content schema version (canonical form `1.0.0`).
    pub schema_version: String,
    /// Stable pack identifier.
    pub game_id: String,
}

/// One top-level layer entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LayerDef {
    /// Layer id, unique among siblings.
    pub id: String,
    /// Layer kind, resolved against the layer registry.
    #[serde(rename = "type")]
    pub kind: String,
    /// Raw unlock condition; absent means always unlocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock: Option<Value>,
    /// Reset rules for this layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<ResetDef>,
    /// Softcap declarations owned by this layer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub softcaps: Vec<SoftcapDef>,
    /// Ordered sublayers.
    #[serde(default)]
    pub sublayers: Vec<SublayerDef>,
}

/// Reset rules: canonical paths preserved across a layer reset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetDef {
    /// Dot-delimited canonical paths to keep, in declaration order.
    #[serde(default)]
    pub keep: Vec<String>,
}

/// One softcap declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoftcapDef {
    /// Node reference the cap applies to.
    pub scope: String,
    /// Modifier key the cap applies to (e.g. `xpRate`).
    pub key: String,
    /// Value above which compression starts.
    pub start: f64,
    /// Compression exponent in `(0, 1]`.
    pub exponent: f64,
}

/// One sublayer entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SublayerDef {
    /// Sublayer id, unique among siblings.
    pub id: String,
    /// Presentation kind.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Raw unlock condition; absent means always unlocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock: Option<Value>,
    /// Ordered sections.
    #[serde(default)]
    pub sections: Vec<SectionDef>,
}

/// One section entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SectionDef {
    /// Section id, unique among siblings.
    pub id: String,
    /// Raw unlock condition; absent means always unlocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock: Option<Value>,
    /// Ordered elements.
    #[serde(default)]
    pub elements: Vec<ElementDef>,
}

/// One element entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ElementDef {
    /// Element id, unique among siblings.
    pub id: String,
    /// Presentation kind.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Raw unlock condition; absent means always unlocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock: Option<Value>,
    /// Optional effect wiring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<EffectDef>,
}

/// Effect wiring carried by an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct EffectDef {
    /// Node reference the effect targets.
    pub target_ref: String,
}

impl GameDefinition {
    /// Deserializes a definition from a raw JSON value.
    pub fn from_value(raw: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(raw.clone())
    }

    /// Deserializes a definition from JSON text.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Visits every node depth-first in enumeration order.
    pub fn visit_nodes<'a>(&'a self, mut visit: impl FnMut(&NodeRef, Option<&'a Value>, RefScope)) {
        for layer in &self.layers {
            let layer_ref = NodeRef::for_layer(layer.id.clone());
            visit(&layer_ref, layer.unlock.as_ref(), RefScope::Layer);
            for sublayer in &layer.sublayers {
                let sublayer_ref = layer_ref.clone().with_sublayer(sublayer.id.clone());
                visit(&sublayer_ref, sublayer.unlock.as_ref(), RefScope::Sublayer);
                for section in &sublayer.sections {
                    let section_ref = sublayer_ref.clone().with_section(section.id.clone());
                    visit(&section_ref, section.unlock.as_ref(), RefScope::Section);
                    for element in &section.elements {
                        let element_ref = section_ref.clone().with_element(element.id.clone());
                        visit(&element_ref, element.unlock.as_ref(), RefScope::Element);
                    }
                }
            }
        }
    }

    /// Collects every `(reference, unlock)` pair in enumeration order.
    #[must_use]
    pub fn enumerate_nodes(&self) -> Vec<(NodeRef, Option<&Value>)> {
        let mut out = Vec::new();
        self.visit_nodes(|node_ref, unlock, _| out.push((node_ref.clone(), unlock)));
        out
    }

    /// Looks up a layer definition by id.
    #[must_use]
    pub fn layer(&self, id: &str) -> Option<&LayerDef> {
        self.layers.iter().find(|layer| layer.id == id)
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}
