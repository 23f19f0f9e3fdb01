// SPDX-License-Identifier: Apache-2.0
//! Event and intent records.
//!
//! Events are what subsystems say to each other; intents are what the
//! outside world asks of the engine. Both are normalized on entry: absent
//! fields take documented defaults so handlers never see half-built
//! records.

use serde_json::{Map, Value};

use crate::phase::Phase;

/// Default source tag for events published without one.
const DEFAULT_EVENT_SOURCE: &str = "engine";

/// Default source tag for intents enqueued without one.
const DEFAULT_INTENT_SOURCE: &str = "ui";

/// A normalized event as delivered to handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Catalog event type.
    pub ty: String,
    /// Structured payload (`{}` when absent).
    pub payload: Value,
    /// Tick index at publish time.
    pub ts: u64,
    /// Publishing subsystem tag.
    pub source: String,
    /// Phase the event was published in, when known.
    pub phase: Option<Phase>,
    /// Free-form metadata (`{}` when absent).
    pub meta: Value,
}

/// Builder for an event about to be published.
///
/// The bus finalizes the draft on publish: it stamps the current tick,
/// defaults the payload/meta objects, and fills the phase from the
/// engine's current phase when the draft carries none.
#[derive(Debug, Clone)]
pub struct EventDraft {
    ty: String,
    payload: Option<Value>,
    source: Option<String>,
    phase: Option<Phase>,
    meta: Option<Value>,
}

impl EventDraft {
    /// Starts a draft for the given event type.
    #[must_use]
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            payload: None,
            source: None,
            phase: None,
            meta: None,
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the source tag.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Pins an explicit phase instead of inheriting the current one.
    #[must_use]
    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Sets free-form metadata.
    #[must_use]
    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Event type of the draft.
    #[must_use]
    pub fn ty(&self) -> &str {
        &self.ty
    }

    pub(crate) fn finalize(self, ts: u64, default_phase: Option<Phase>) -> Event {
        Event {
            ty: self.ty,
            payload: self.payload.unwrap_or_else(empty_object),
            ts,
            source: self.source.unwrap_or_else(|| DEFAULT_EVENT_SOURCE.to_owned()),
            phase: self.phase.or(default_phase),
            meta: self.meta.unwrap_or_else(empty_object),
        }
    }
}

/// A normalized intent as seen by the router.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    /// Catalog intent type.
    pub ty: String,
    /// Structured payload (`{}` when absent).
    pub payload: Value,
    /// Originating surface tag (`"ui"` when absent).
    pub source: String,
}

impl Intent {
    /// Builds an intent with default payload and source.
    #[must_use]
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            payload: empty_object(),
            source: DEFAULT_INTENT_SOURCE.to_owned(),
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the source tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}
