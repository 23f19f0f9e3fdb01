// SPDX-License-Identifier: Apache-2.0
//! ember-core: deterministic tick runtime for data-driven idle games.
//!
//! A validated content pack (see `ember-defs`) is turned into a runtime
//! whose every frame is the fixed phase sequence `input, time,
//! layer-update, event-dispatch, unlock-evaluation, render`. Layers own
//! slices of canonical state behind scoped facades and coordinate only
//! through the queued event bus and the intent router; unlock state is
//! monotone and projected into a read-only UI tree each tick.
//!
//! Single-threaded by design: a tick is atomic from the caller's
//! perspective and every suspension point sits at a phase boundary.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::cognitive_complexity,
    clippy::option_if_let_else,
    clippy::significant_drop_tightening,
    clippy::doc_markdown,
    clippy::too_many_lines,
    clippy::too_long_first_doc_paragraph,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::similar_names,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::manual_let_else,
    clippy::needless_pass_by_value,
    clippy::multiple_crate_versions
)]

pub mod bus;
pub mod catalog;
pub mod demo;
pub mod engine;
pub mod event;
pub mod intent;
pub mod layer;
pub mod modifier;
pub mod paths;
pub mod phase;
pub mod reset;
pub mod softcap;
pub mod store;
pub mod telemetry;
pub mod time;
pub mod ui;
pub mod unlock;

pub use bus::{BusConfig, BusError, DispatchReport, EventBus, EventPublisher, SubscriptionToken};
pub use catalog::{EventCatalog, EventSpec, IntentCatalog, IntentSpec, LockPolicy};
pub use engine::{Engine, EngineError, EngineOptions, RoutedIntent, TickSummary};
pub use event::{Event, EventDraft, Intent};
pub use intent::{IntentRouter, RouteDisposition, RouterError};
pub use layer::{Layer, LayerContext, LayerError, LayerRegistry, ScopedState};
pub use modifier::ModifierResolver;
pub use phase::Phase;
pub use reset::{LayerResetService, ResetError, ResetPreview};
pub use store::{StateSnapshot, StateStore, StoreError};
pub use telemetry::{NullTelemetrySink, TelemetrySink};
pub use time::{FixedTimestep, ManualClock, ManualClockHandle, TimeSource};
pub use ui::UiTree;
pub use unlock::{UnlockEvaluator, UnlockError, UnlockSummary};
