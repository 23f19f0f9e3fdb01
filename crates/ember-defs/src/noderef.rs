// SPDX-License-Identifier: Apache-2.0
//! Canonical node references.
//!
//! A node reference addresses one node in a game definition tree as
//! `layer:<id>[/sublayer:<id>[/section:<id>[/element:<id>]]]`. Scopes are
//! strictly ordered, gap-free, and each appears at most once; ids are
//! trimmed and non-empty. [`NodeRef::parse`] is total over `&str` and
//! [`NodeRef`]'s `Display` renders the canonical text, so
//! `format(parse(s)) == normalize(s)` for every valid input.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// The four reference scopes, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RefScope {
    /// Top-level layer scope.
    Layer,
    /// Sublayer scope, nested in a layer.
    Sublayer,
    /// Section scope, nested in a sublayer.
    Section,
    /// Element scope, nested in a section.
    Element,
}

impl RefScope {
    /// Canonical keyword used in reference text.
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Layer => "layer",
            Self::Sublayer => "sublayer",
            Self::Section => "section",
            Self::Element => "element",
        }
    }

    fn from_keyword(raw: &str) -> Option<Self> {
        match raw {
            "layer" => Some(Self::Layer),
            "sublayer" => Some(Self::Sublayer),
            "section" => Some(Self::Section),
            "element" => Some(Self::Element),
            _ => None,
        }
    }

    fn depth(self) -> usize {
        match self {
            Self::Layer => 0,
            Self::Sublayer => 1,
            Self::Section => 2,
            Self::Element => 3,
        }
    }
}

/// Errors produced while parsing or normalizing a node reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeRefError {
    /// Input was empty or whitespace-only.
    #[error("reference is empty")]
    Empty,
    /// A `/`-separated segment was empty after trimming.
    #[error("segment {position} is empty")]
    EmptySegment {
        /// Zero-based segment position.
        position: usize,
    },
    /// A segment did not match the `scope:id` shape.
    #[error("segment `{segment}` is not of the form `scope:id`")]
    BadFormat {
        /// Offending segment text.
        segment: String,
    },
    /// A segment carried an empty id after trimming.
    #[error("scope `{scope}` has an empty id")]
    EmptyId {
        /// Scope keyword of the offending segment.
        scope: String,
    },
    /// A segment named a scope outside the canonical four.
    #[error("unknown scope `{scope}`")]
    UnknownScope {
        /// Unrecognized scope keyword.
        scope: String,
    },
    /// A scope appeared more than once.
    #[error("scope `{scope}` appears more than once")]
    DuplicateScope {
        /// Repeated scope keyword.
        scope: &'static str,
    },
    /// Scopes were not in strictly nested, gap-free order.
    #[error("scope `{scope}` is out of order")]
    OutOfOrder {
        /// Scope keyword that broke the ordering.
        scope: &'static str,
    },
    /// The reference did not start with a layer scope.
    #[error("a reference must start with `layer:<id>`")]
    LayerRequired,
}

impl NodeRefError {
    /// Stable machine code for the failure mode.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Empty => "REF_EMPTY",
            Self::EmptySegment { .. } => "REF_EMPTY_SEGMENT",
            Self::BadFormat { .. } => "REF_BAD_FORMAT",
            Self::EmptyId { .. } => "REF_EMPTY_ID",
            Self::UnknownScope { .. } => "REF_UNKNOWN_SCOPE",
            Self::DuplicateScope { .. } => "REF_DUPLICATE_SCOPE",
            Self::OutOfOrder { .. } => "REF_OUT_OF_ORDER",
            Self::LayerRequired => "REF_LAYER_REQUIRED",
        }
    }
}

/// Parsed node reference with up to four nested scope ids.
///
/// The layer id is always present; deeper scopes are optional but gap-free
/// (a section id implies a sublayer id, and so on). Equality and hashing
/// follow the canonical text exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    layer: String,
    sublayer: Option<String>,
    section: Option<String>,
    element: Option<String>,
}

impl NodeRef {
    /// Builds a layer-level reference.
    #[must_use]
    pub fn for_layer(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            sublayer: None,
            section: None,
            element: None,
        }
    }

    /// Extends the reference with a sublayer id.
    #[must_use]
    pub fn with_sublayer(mut self, id: impl Into<String>) -> Self {
        self.sublayer = Some(id.into());
        self
    }

    /// Extends the reference with a section id.
    #[must_use]
    pub fn with_section(mut self, id: impl Into<String>) -> Self {
        self.section = Some(id.into());
        self
    }

    /// Extends the reference with an element id.
    #[must_use]
    pub fn with_element(mut self, id: impl Into<String>) -> Self {
        self.element = Some(id.into());
        self
    }

    /// Layer id (always present).
    #[must_use]
    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Sublayer id, if the reference descends that far.
    #[must_use]
    pub fn sublayer(&self) -> Option<&str> {
        self.sublayer.as_deref()
    }

    /// Section id, if the reference descends that far.
    #[must_use]
    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    /// Element id, if the reference descends that far.
    #[must_use]
    pub fn element(&self) -> Option<&str> {
        self.element.as_deref()
    }

    /// Parses reference text into its record form.
    ///
    /// Whitespace around segments, scope keywords, and ids is trimmed; the
    /// input itself is never mutated. Every failure mode maps to a distinct
    /// [`NodeRefError`] variant.
    pub fn parse(input: &str) -> Result<Self, NodeRefError> {
        if input.trim().is_empty() {
            return Err(NodeRefError::Empty);
        }

        let mut ids: [Option<String>; 4] = [None, None, None, None];
        let mut last_depth: Option<usize> = None;

        for (position, raw_segment) in input.split('/').enumerate() {
            let segment = raw_segment.trim();
            if segment.is_empty() {
                return Err(NodeRefError::EmptySegment { position });
            }
            let Some((raw_scope, raw_id)) = segment.split_once(':') else {
                return Err(NodeRefError::BadFormat {
                    segment: segment.to_owned(),
                });
            };
            let scope_text = raw_scope.trim();
            let Some(scope) = RefScope::from_keyword(scope_text) else {
                return Err(NodeRefError::UnknownScope {
                    scope: scope_text.to_owned(),
                });
            };
            let id = raw_id.trim();
            if id.is_empty() {
                return Err(NodeRefError::EmptyId {
                    scope: scope_text.to_owned(),
                });
            }

            let depth = scope.depth();
            if ids[depth].is_some() {
                return Err(NodeRefError::DuplicateScope {
                    scope: scope.keyword(),
                });
            }
            match last_depth {
                None if depth != 0 => return Err(NodeRefError::LayerRequired),
                Some(prev) if depth != prev + 1 => {
                    return Err(NodeRefError::OutOfOrder {
                        scope: scope.keyword(),
                    });
                }
                _ => {}
            }
            ids[depth] = Some(id.to_owned());
            last_depth = Some(depth);
        }

        let [layer, sublayer, section, element] = ids;
        match layer {
            Some(layer) => Ok(Self {
                layer,
                sublayer,
                section,
                element,
            }),
            None => Err(NodeRefError::LayerRequired),
        }
    }

    /// Deepest scope present in the reference.
    #[must_use]
    pub fn scope(&self) -> RefScope {
        if self.element.is_some() {
            RefScope::Element
        } else if self.section.is_some() {
            RefScope::Section
        } else if self.sublayer.is_some() {
            RefScope::Sublayer
        } else {
            RefScope::Layer
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer:{}", self.layer)?;
        if let Some(sublayer) = &self.sublayer {
            write!(f, "/sublayer:{sublayer}")?;
        }
        if let Some(section) = &self.section {
            write!(f, "/section:{section}")?;
        }
        if let Some(element) = &self.element {
            write!(f, "/element:{element}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for NodeRef {
    type Err = NodeRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for NodeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

/// Rewrites reference text into its canonical rendering.
///
/// Equivalent inputs (whitespace variants) normalize to byte-identical
/// canonical text.
pub fn normalize(input: &str) -> Result<String, NodeRefError> {
    NodeRef::parse(input).map(|parsed| parsed.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_full_depth_reference() {
        let parsed = NodeRef::parse("layer:idle/sublayer:main/section:jobs/element:mine").unwrap();
        assert_eq!(parsed.layer(), "idle");
        assert_eq!(parsed.sublayer(), Some("main"));
        assert_eq!(parsed.section(), Some("jobs"));
        assert_eq!(parsed.element(), Some("mine"));
        assert_eq!(parsed.scope(), RefScope::Element);
    }

    #[test]
    fn normalization_trims_whitespace_per_segment() {
        let normalized = normalize("  layer : idle / sublayer : main  ").unwrap();
        assert_eq!(normalized, "layer:idle/sublayer:main");
    }

    #[test]
    fn error_codes_cover_every_failure_mode() {
        let cases: &[(&str, &str)] = &[
            ("", "REF_EMPTY"),
            ("   ", "REF_EMPTY"),
            ("layer:idle//section:jobs", "REF_EMPTY_SEGMENT"),
            ("layer idle", "REF_BAD_FORMAT"),
            ("layer:", "REF_EMPTY_ID"),
            ("layer:  ", "REF_EMPTY_ID"),
            ("galaxy:idle", "REF_UNKNOWN_SCOPE"),
            ("layer:idle/layer:idle", "REF_DUPLICATE_SCOPE"),
            ("layer:idle/section:jobs", "REF_OUT_OF_ORDER"),
            ("layer:idle/sublayer:main/element:mine", "REF_OUT_OF_ORDER"),
            ("sublayer:main", "REF_LAYER_REQUIRED"),
        ];
        for (input, code) in cases {
            let err = NodeRef::parse(input).unwrap_err();
            assert_eq!(err.code(), *code, "input: {input:?}");
        }
    }

    #[test]
    fn reversed_scopes_report_layer_required() {
        let err = NodeRef::parse("element:mine/layer:idle").unwrap_err();
        assert_eq!(err.code(), "REF_LAYER_REQUIRED");
    }

    #[test]
    fn builder_matches_parsed_form() {
        let built = NodeRef::for_layer("idle")
            .with_sublayer("main")
            .with_section("jobs");
        assert_eq!(built.to_string(), "layer:idle/sublayer:main/section:jobs");
        assert_eq!(NodeRef::parse(&built.to_string()).unwrap(), built);
    }

    fn id_strategy() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,11}"
    }

    proptest! {
        #[test]
        fn round_trips_canonical_text(
            layer in id_strategy(),
            sublayer in proptest::option::of(id_strategy()),
            section in proptest::option::of(id_strategy()),
        ) {
            let mut reference = NodeRef::for_layer(layer);
            if let Some(sublayer) = sublayer {
                reference = reference.with_sublayer(sublayer);
                if let Some(section) = section {
                    reference = reference.with_section(section);
                }
            }
            let text = reference.to_string();
            prop_assert_eq!(NodeRef::parse(&text).unwrap(), reference);
            prop_assert_eq!(normalize(&text).unwrap(), text);
        }

        #[test]
        fn whitespace_variants_normalize_identically(
            layer in id_strategy(),
            sublayer in id_strategy(),
            pad in "[ \\t]{0,3}",
        ) {
            let canonical = format!("layer:{layer}/sublayer:{sublayer}");
            let padded = format!("{pad}layer{pad}:{pad}{layer}{pad}/{pad}sublayer{pad}:{pad}{sublayer}{pad}");
            prop_assert_eq!(normalize(&padded).unwrap(), canonical);
        }
    }
}
