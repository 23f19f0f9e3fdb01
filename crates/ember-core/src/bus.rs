// SPDX-License-Identifier: Apache-2.0
//! Queued event bus.
//!
//! Publishing never runs a handler: events are validated, normalized, and
//! appended to a pending queue. [`EventBus::dispatch_queued`] drains that
//! queue in cycles: each cycle detaches the current queue, delivers every
//! event to the subscribers present at cycle start, and leaves anything
//! published meanwhile for the next cycle. Two guardrails bound the work:
//! `max_events_per_tick` is fatal (it only trips on recursive publish
//! storms) and `max_dispatch_cycles_per_tick` defers the remaining queue to
//! the next dispatch call.
//!
//! # Sharing model
//!
//! Bus state lives behind a single-threaded [`Rc`] cell shared between the
//! engine-owned [`EventBus`] and any number of cheap [`EventPublisher`]
//! handles held by layers, services, and intent handlers. Handlers invoked
//! during dispatch publish onto the live queue and may subscribe or
//! unsubscribe through their own handles; subscription changes made while
//! a dispatch is running are applied between cycles, which is exactly the
//! per-cycle snapshot contract: a subscriber added inside a handler never
//! fires in the cycle that added it, and one removed inside a handler
//! still fires for events already snapshotted.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::EventCatalog;
use crate::event::{Event, EventDraft};
use crate::phase::Phase;

/// Boxed event handler.
pub type HandlerFn = Box<dyn FnMut(&Event)>;

/// Opaque handle for one subscription, unique per bus instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// Errors produced by the bus. All of these are programmer/content errors
/// in the fatal bucket; deferral is reported, not raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Publish with an empty event type.
    #[error("event type is empty")]
    EmptyEventType,
    /// Strict publish of a type absent from the event catalog.
    #[error("event type `{ty}` is not in the event catalog")]
    UnknownEventType {
        /// Offending type.
        ty: String,
    },
    /// Strict publish with a payload the catalog validator rejected.
    #[error("event `{ty}` payload invalid: {reason}")]
    PayloadInvalid {
        /// Offending type.
        ty: String,
        /// Validator message.
        reason: String,
    },
    /// Strict publish outside the phases the catalog allows for the type.
    #[error("event `{ty}` may not be published in phase `{phase}`")]
    PhaseNotAllowed {
        /// Offending type.
        ty: String,
        /// Phase the publish happened in (`none` outside a tick).
        phase: String,
    },
    /// Recursive-publish storm: more events than `maxEventsPerTick` in one
    /// dispatch call.
    #[error("maxEventsPerTick exceeded: more than {max} events in one dispatch")]
    EventBudgetExceeded {
        /// Configured budget.
        max: usize,
    },
    /// `dispatch_queued` called from within a running dispatch.
    #[error("dispatch re-entered")]
    ReentrantDispatch,
}

/// What one `dispatch_queued` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    /// Cycles run before the queue drained or the cycle budget hit.
    pub cycles_processed: usize,
    /// Events taken off the queue across all cycles.
    pub events_processed: usize,
    /// Handler invocations performed.
    pub delivered_handlers: usize,
    /// Events left on the queue when dispatch returned.
    pub deferred_events: usize,
    /// Whether the cycle budget (not an empty queue) ended dispatch.
    pub deferred_due_to_cycle_limit: bool,
}

/// Bus guardrail and validation configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Validate publishes against the event catalog.
    pub strict: bool,
    /// Fatal budget on events processed per dispatch call.
    pub max_events_per_tick: usize,
    /// Soft budget on dispatch cycles per call; the remainder defers.
    pub max_dispatch_cycles_per_tick: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            strict: true,
            max_events_per_tick: 1000,
            max_dispatch_cycles_per_tick: 8,
        }
    }
}

struct Subscription {
    token: SubscriptionToken,
    handler: RefCell<HandlerFn>,
}

/// Shared single-threaded bus state.
struct BusShared {
    catalog: EventCatalog,
    config: BusConfig,
    queue: RefCell<VecDeque<Event>>,
    subs: RefCell<FxHashMap<String, Vec<Subscription>>>,
    pending_subs: RefCell<Vec<(String, Subscription)>>,
    pending_unsubs: RefCell<Vec<SubscriptionToken>>,
    next_token: Cell<u64>,
    allowed_phase: Cell<Option<Phase>>,
    current_tick: Cell<u64>,
    dispatching: Cell<bool>,
    last_report: RefCell<DispatchReport>,
}

impl BusShared {
    fn publish(&self, draft: EventDraft) -> Result<(), BusError> {
        if draft.ty().trim().is_empty() {
            return Err(BusError::EmptyEventType);
        }
        let event = draft.finalize(self.current_tick.get(), self.allowed_phase.get());
        if self.config.strict {
            let Some(spec) = self.catalog.spec(&event.ty) else {
                return Err(BusError::UnknownEventType { ty: event.ty });
            };
            if let Err(reason) = (spec.validate)(&event.payload) {
                return Err(BusError::PayloadInvalid {
                    ty: event.ty,
                    reason,
                });
            }
            let phase_ok = event.phase.is_some_and(|phase| spec.phases.contains(&phase));
            if !phase_ok {
                return Err(BusError::PhaseNotAllowed {
                    phase: event.phase.map_or("none", Phase::name).to_owned(),
                    ty: event.ty,
                });
            }
        }
        self.queue.borrow_mut().push_back(event);
        Ok(())
    }

    fn subscribe(&self, ty: &str, handler: HandlerFn) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token.get());
        self.next_token.set(token.0 + 1);
        let subscription = Subscription {
            token,
            handler: RefCell::new(handler),
        };
        if self.dispatching.get() {
            self.pending_subs
                .borrow_mut()
                .push((ty.to_owned(), subscription));
        } else {
            self.subs
                .borrow_mut()
                .entry(ty.to_owned())
                .or_default()
                .push(subscription);
        }
        token
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        if self.dispatching.get() {
            if self.pending_unsubs.borrow().contains(&token) {
                return false;
            }
            let live = self
                .subs
                .borrow()
                .values()
                .any(|list| list.iter().any(|sub| sub.token == token));
            let pending = self
                .pending_subs
                .borrow()
                .iter()
                .any(|(_, sub)| sub.token == token);
            if live || pending {
                self.pending_unsubs.borrow_mut().push(token);
                return true;
            }
            return false;
        }
        Self::remove_token(&mut self.subs.borrow_mut(), token)
    }

    fn remove_token(
        subs: &mut FxHashMap<String, Vec<Subscription>>,
        token: SubscriptionToken,
    ) -> bool {
        for list in subs.values_mut() {
            if let Some(position) = list.iter().position(|sub| sub.token == token) {
                list.remove(position);
                return true;
            }
        }
        false
    }

    /// Applies subscription changes issued during the cycle that just ran.
    fn apply_pending_ops(&self) {
        let added: Vec<(String, Subscription)> = self.pending_subs.borrow_mut().drain(..).collect();
        let removed: Vec<SubscriptionToken> = self.pending_unsubs.borrow_mut().drain(..).collect();
        let mut subs = self.subs.borrow_mut();
        for (ty, subscription) in added {
            subs.entry(ty).or_default().push(subscription);
        }
        for token in removed {
            Self::remove_token(&mut subs, token);
        }
    }

    fn process_batch(
        &self,
        batch: &[Event],
        events_processed: &mut usize,
        delivered_handlers: &mut usize,
    ) -> Result<(), BusError> {
        for event in batch {
            *events_processed += 1;
            if *events_processed > self.config.max_events_per_tick {
                return Err(BusError::EventBudgetExceeded {
                    max: self.config.max_events_per_tick,
                });
            }
            let subs = self.subs.borrow();
            if let Some(list) = subs.get(event.ty.as_str()) {
                for subscription in list {
                    (subscription.handler.borrow_mut())(event);
                    *delivered_handlers += 1;
                }
            }
        }
        Ok(())
    }

    fn run_cycles(&self) -> Result<usize, BusError> {
        let mut cycles_processed = 0usize;
        let mut events_processed = 0usize;
        let mut delivered_handlers = 0usize;

        while cycles_processed < self.config.max_dispatch_cycles_per_tick
            && !self.queue.borrow().is_empty()
        {
            cycles_processed += 1;
            let batch: Vec<Event> = self.queue.borrow_mut().drain(..).collect();
            let outcome =
                self.process_batch(&batch, &mut events_processed, &mut delivered_handlers);
            // Deferred subscription changes land between cycles even when
            // the cycle itself failed, so state stays coherent.
            self.apply_pending_ops();
            outcome?;
        }

        let deferred_events = self.queue.borrow().len();
        let report = DispatchReport {
            cycles_processed,
            events_processed,
            delivered_handlers,
            deferred_events,
            deferred_due_to_cycle_limit: deferred_events > 0,
        };
        *self.last_report.borrow_mut() = report;
        Ok(delivered_handlers)
    }
}

/// Engine-owned bus handle. See the module docs for the sharing model.
pub struct EventBus {
    shared: Rc<BusShared>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("queued", &self.shared.queue.borrow().len())
            .field("dispatching", &self.shared.dispatching.get())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Builds a bus over an event catalog.
    #[must_use]
    pub fn new(catalog: EventCatalog, config: BusConfig) -> Self {
        Self {
            shared: Rc::new(BusShared {
                catalog,
                config,
                queue: RefCell::new(VecDeque::new()),
                subs: RefCell::new(FxHashMap::default()),
                pending_subs: RefCell::new(Vec::new()),
                pending_unsubs: RefCell::new(Vec::new()),
                next_token: Cell::new(1),
                allowed_phase: Cell::new(None),
                current_tick: Cell::new(0),
                dispatching: Cell::new(false),
                last_report: RefCell::new(DispatchReport::default()),
            }),
        }
    }

    /// Cheap clone handle for layers, services, and intent handlers.
    #[must_use]
    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Validates, normalizes, and queues an event. No handler runs here.
    pub fn publish(&self, draft: EventDraft) -> Result<(), BusError> {
        self.shared.publish(draft)
    }

    /// Registers `handler` for `ty`; the token is unique to this bus.
    pub fn subscribe(&self, ty: &str, handler: HandlerFn) -> SubscriptionToken {
        self.shared.subscribe(ty, handler)
    }

    /// Removes at most one subscription; returns whether it existed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.shared.unsubscribe(token)
    }

    /// Drains the queue in snapshot cycles; returns delivered handler count.
    pub fn dispatch_queued(&mut self) -> Result<usize, BusError> {
        if self.shared.dispatching.replace(true) {
            return Err(BusError::ReentrantDispatch);
        }
        let result = self.shared.run_cycles();
        self.shared.dispatching.set(false);
        result
    }

    /// Copy of the report from the most recent dispatch call.
    #[must_use]
    pub fn last_dispatch_report(&self) -> DispatchReport {
        self.shared.last_report.borrow().clone()
    }

    /// Sets the phase strict publishes are checked against.
    pub fn set_allowed_phase(&self, phase: Option<Phase>) {
        self.shared.allowed_phase.set(phase);
    }

    /// Sets the tick index stamped onto published events.
    pub fn set_tick(&self, tick: u64) {
        self.shared.current_tick.set(tick);
    }

    /// Number of events currently queued.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.shared.queue.borrow().len()
    }
}

/// Cheap clone handle over the shared bus: publish and manage
/// subscriptions, nothing else.
#[derive(Clone)]
pub struct EventPublisher {
    shared: Rc<BusShared>,
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher").finish_non_exhaustive()
    }
}

impl EventPublisher {
    /// Validates, normalizes, and queues an event. No handler runs here.
    pub fn publish(&self, draft: EventDraft) -> Result<(), BusError> {
        self.shared.publish(draft)
    }

    /// Registers `handler` for `ty`.
    pub fn subscribe(&self, ty: &str, handler: HandlerFn) -> SubscriptionToken {
        self.shared.subscribe(ty, handler)
    }

    /// Removes at most one subscription; returns whether it existed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.shared.unsubscribe(token)
    }
}
