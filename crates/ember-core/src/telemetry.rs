// SPDX-License-Identifier: Apache-2.0
//! Telemetry sink for engine observability.
//!
//! The engine reports structured progress through an `Arc<dyn
//! TelemetrySink>` instead of printing; hosts plug in their own sink and
//! the default [`NullTelemetrySink`] drops everything. All methods have
//! no-op defaults so sinks implement only what they care about.

use crate::bus::DispatchReport;
use crate::engine::TickSummary;
use crate::phase::Phase;

/// Observer over engine progress.
pub trait TelemetrySink {
    /// A tick began.
    fn on_tick_start(&self, _tick: u64) {}

    /// A phase was entered.
    fn on_phase(&self, _tick: u64, _phase: Phase) {}

    /// The dispatch phase finished with this report.
    fn on_dispatch_report(&self, _tick: u64, _report: &DispatchReport) {}

    /// A node transitioned to unlocked.
    fn on_unlock_transition(&self, _tick: u64, _target_ref: &str) {}

    /// A tick completed with this summary.
    fn on_tick_end(&self, _tick: u64, _summary: &TickSummary) {}
}

/// Sink that drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {}
