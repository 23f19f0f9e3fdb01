// SPDX-License-Identifier: Apache-2.0
//! Game engine: tick orchestration and runtime wiring.
//!
//! [`Engine::initialize`] runs the validation gate, seeds the state store
//! from the definition, constructs the bus/router/evaluator/reset/modifier
//! subsystems, creates layer instances in definition order, and wires the
//! standing subscriptions: the `REQUEST_LAYER_RESET` intent handler, the
//! reset service's `LAYER_RESET_REQUESTED` subscription, and each layer's
//! `on_event` for every catalog event type naming the layer's kind as a
//! consumer. No partial runtime ever escapes a failed initialize.
//!
//! [`Engine::tick`] advances one frame through the fixed phase sequence
//! `input, time, layer-update, event-dispatch, unlock-evaluation, render`,
//! gated by a per-tick cursor; any out-of-order entry is fatal. The bus's
//! allowed phase follows the cursor so strict publishes are constrained to
//! each event type's permitted phases.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use ember_defs::condition::ConditionError;
use ember_defs::{DefinitionDigest, GameDefinition, ValidationReport, validate};

use crate::bus::{BusConfig, BusError, DispatchReport, EventBus, EventPublisher, SubscriptionToken};
use crate::catalog::{
    EventCatalog, IntentCatalog, LAYER_RESET_REQUESTED_EVENT, REQUEST_LAYER_RESET_INTENT,
};
use crate::event::{EventDraft, Intent};
use crate::intent::{IntentHandlerFn, IntentRouter, LockPredicate, RouteDisposition, RouterError};
use crate::layer::{Layer, LayerContext, LayerError, LayerRegistry, ScopedState};
use crate::modifier::ModifierResolver;
use crate::phase::{Phase, PhaseCursor};
use crate::reset::LayerResetService;
use crate::store::{StateSnapshot, StateStore, StoreError};
use crate::telemetry::{NullTelemetrySink, TelemetrySink};
use crate::time::{FixedTimestep, TimeSource};
use crate::ui::{self, UiTree};
use crate::unlock::{UnlockError, UnlockEvaluator, UnlockSummary};

/// Default fixed timestep when the host supplies no time source.
const DEFAULT_FIXED_DT: f64 = 1.0 / 60.0;

/// Derived-state key the unlock summary lives under.
const UNLOCKS_DERIVED_PATH: &str = "unlocks";

/// Errors raised by engine lifecycle and ticking.
///
/// Everything here is fatal for the operation that raised it; recoverable
/// intent outcomes travel inside [`TickSummary::intents_routed`] instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The pack failed the validation gate; no runtime was built.
    #[error("definition rejected:\n{0}")]
    Rejected(ValidationReport),
    /// A phase was entered out of order.
    #[error("phase order violation: expected `{expected}`, entered `{found}`")]
    PhaseOrder {
        /// Phase the cursor expected next.
        expected: &'static str,
        /// Phase actually entered.
        found: &'static str,
    },
    /// The time source produced a non-finite or negative delta.
    #[error("invalid delta time: {dt}")]
    InvalidDelta {
        /// Offending delta.
        dt: f64,
    },
    /// `tick` called from within a running tick.
    #[error("tick re-entered")]
    ReentrantTick,
    /// The engine was already destroyed.
    #[error("engine already destroyed")]
    Destroyed,
    /// Event bus failure (strict publish, event budget).
    #[error(transparent)]
    Bus(#[from] BusError),
    /// State store failure (derived-namespace or cross-layer write).
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Layer construction or lifecycle failure.
    #[error(transparent)]
    Layer(#[from] LayerError),
    /// Intent handler registration failure.
    #[error(transparent)]
    Router(#[from] RouterError),
    /// Unlock evaluation failure.
    #[error(transparent)]
    Unlock(#[from] UnlockError),
    /// A condition failed to parse after the gate (tampered definition).
    #[error(transparent)]
    Condition(#[from] ConditionError),
}

/// One routed intent and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedIntent {
    /// Intent type.
    pub ty: String,
    /// Routing outcome.
    pub disposition: RouteDisposition,
}

/// What one tick did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    /// Tick index, starting at 1.
    pub tick: u64,
    /// Intents routed during the input phase, in enqueue order.
    pub intents_routed: Vec<RoutedIntent>,
    /// Validated delta time.
    pub dt: f64,
    /// Layer ids updated, always in definition order.
    pub updated_layers: Vec<String>,
    /// Handler deliveries performed by the dispatch phase.
    pub dispatched_handlers: usize,
    /// Dispatch phase report.
    pub dispatch: DispatchReport,
    /// Unlock summary as of this tick's evaluation.
    pub unlocks: UnlockSummary,
    /// UI projection as of this tick's unlock state.
    pub ui: UiTree,
}

/// Engine construction options.
pub struct EngineOptions {
    strict_events: bool,
    strict_intents: bool,
    max_events_per_tick: usize,
    max_dispatch_cycles_per_tick: usize,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    time_source: Option<Box<dyn TimeSource>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        let bus_defaults = BusConfig::default();
        Self {
            strict_events: true,
            strict_intents: true,
            max_events_per_tick: bus_defaults.max_events_per_tick,
            max_dispatch_cycles_per_tick: bus_defaults.max_dispatch_cycles_per_tick,
            telemetry: None,
            time_source: None,
        }
    }
}

impl std::fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineOptions")
            .field("strict_events", &self.strict_events)
            .field("strict_intents", &self.strict_intents)
            .field("max_events_per_tick", &self.max_events_per_tick)
            .field(
                "max_dispatch_cycles_per_tick",
                &self.max_dispatch_cycles_per_tick,
            )
            .finish_non_exhaustive()
    }
}

impl EngineOptions {
    /// Disables strict event catalog validation.
    #[must_use]
    pub fn lenient_events(mut self) -> Self {
        self.strict_events = false;
        self
    }

    /// Disables strict intent payload validation.
    #[must_use]
    pub fn lenient_intents(mut self) -> Self {
        self.strict_intents = false;
        self
    }

    /// Overrides the fatal per-dispatch event budget.
    #[must_use]
    pub fn with_max_events_per_tick(mut self, max: usize) -> Self {
        self.max_events_per_tick = max;
        self
    }

    /// Overrides the soft dispatch cycle budget.
    #[must_use]
    pub fn with_max_dispatch_cycles_per_tick(mut self, max: usize) -> Self {
        self.max_dispatch_cycles_per_tick = max;
        self
    }

    /// Plugs in a telemetry sink.
    #[must_use]
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// Plugs in a time source.
    #[must_use]
    pub fn with_time_source(mut self, source: Box<dyn TimeSource>) -> Self {
        self.time_source = Some(source);
        self
    }
}

struct LayerSlot {
    id: String,
    instance: Rc<RefCell<Box<dyn Layer>>>,
    ctx: LayerContext,
}

/// The deterministic tick runtime.
pub struct Engine {
    definition: Rc<GameDefinition>,
    digest: DefinitionDigest,
    store: Rc<RefCell<StateStore>>,
    bus: EventBus,
    publisher: EventPublisher,
    router: IntentRouter,
    evaluator: UnlockEvaluator,
    reset: Rc<LayerResetService>,
    layers: Vec<LayerSlot>,
    time: Box<dyn TimeSource>,
    pending_intents: VecDeque<Intent>,
    tokens: Vec<SubscriptionToken>,
    telemetry: Arc<dyn TelemetrySink>,
    tick_index: u64,
    in_tick: bool,
    destroyed: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("game_id", &self.definition.meta.game_id)
            .field("digest", &self.digest)
            .field("tick_index", &self.tick_index)
            .field("layers", &self.layers.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Validates a raw pack and builds the full runtime. Fails fast: any
    /// validation issue aborts with the aggregate report and no partial
    /// runtime is created.
    pub fn initialize(
        raw: &Value,
        registry: &LayerRegistry,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let definition = GameDefinition::from_value(raw)
            .map_err(|error| EngineError::Rejected(ValidationReport::from_parse_error(&error)))?;
        let validated = validate(definition).map_err(EngineError::Rejected)?;
        let (definition, digest) = validated.into_parts();
        let definition = Rc::new(definition);

        let store = Rc::new(RefCell::new(StateStore::new(definition.state.clone())));
        let event_catalog = EventCatalog::seeded();
        let bus = EventBus::new(
            event_catalog.clone(),
            BusConfig {
                strict: options.strict_events,
                max_events_per_tick: options.max_events_per_tick,
                max_dispatch_cycles_per_tick: options.max_dispatch_cycles_per_tick,
            },
        );
        let publisher = bus.publisher();

        let modifiers = Rc::new(ModifierResolver::new(&definition));
        let reset = Rc::new(LayerResetService::new(
            &definition,
            Rc::clone(&store),
            publisher.clone(),
        ));
        let evaluator = UnlockEvaluator::new(&definition)?;

        let mut router = IntentRouter::new(
            IntentCatalog::seeded(),
            options.strict_intents,
            Self::lock_predicate(&store),
        );
        router.register(
            REQUEST_LAYER_RESET_INTENT,
            Self::reset_intent_handler(&reset, &publisher),
        )?;

        let mut engine = Self {
            layers: Vec::with_capacity(definition.layers.len()),
            definition: Rc::clone(&definition),
            digest,
            store: Rc::clone(&store),
            bus,
            publisher,
            router,
            evaluator,
            reset: Rc::clone(&reset),
            time: options
                .time_source
                .unwrap_or_else(|| Box::new(FixedTimestep::new(DEFAULT_FIXED_DT))),
            pending_intents: VecDeque::new(),
            tokens: Vec::new(),
            telemetry: options
                .telemetry
                .unwrap_or_else(|| Arc::new(NullTelemetrySink)),
            tick_index: 0,
            in_tick: false,
            destroyed: false,
        };

        engine.create_layers(registry, &modifiers)?;
        engine.wire_subscriptions(&event_catalog);
        Ok(engine)
    }

    fn create_layers(
        &mut self,
        registry: &LayerRegistry,
        modifiers: &Rc<ModifierResolver>,
    ) -> Result<(), EngineError> {
        for layer_def in &self.definition.layers {
            let instance = registry.create(layer_def)?;
            let instance = Rc::new(RefCell::new(instance));
            let ctx = LayerContext {
                events: self.publisher.clone(),
                state: ScopedState::new(Rc::clone(&self.store), layer_def.id.clone()),
                modifiers: Rc::clone(modifiers),
                reset: Rc::clone(&self.reset),
            };
            instance.borrow_mut().init(&ctx)?;
            self.layers.push(LayerSlot {
                id: layer_def.id.clone(),
                instance,
                ctx,
            });
        }
        Ok(())
    }

    fn wire_subscriptions(&mut self, event_catalog: &EventCatalog) {
        // (ii) The reset service acts on reset requests during dispatch.
        // Requests naming unknown layers are dropped, not fatal.
        let reset = Rc::clone(&self.reset);
        let token = self.bus.subscribe(
            LAYER_RESET_REQUESTED_EVENT,
            Box::new(move |event| {
                if let Some(layer_id) = event.payload.get("layerId").and_then(Value::as_str) {
                    let reason = event.payload.get("reason").and_then(Value::as_str);
                    let _ = reset.execute(layer_id, reason);
                }
            }),
        );
        self.tokens.push(token);

        // (iii) Each layer's on_event, for every event type whose
        // consumers list names the layer's kind.
        for slot in &self.layers {
            let Some(layer_def) = self.definition.layer(&slot.id) else {
                continue;
            };
            for spec in event_catalog.specs() {
                if !spec.consumers.contains(&layer_def.kind.as_str()) {
                    continue;
                }
                let instance = Rc::clone(&slot.instance);
                let ctx = slot.ctx.clone();
                let token = self.bus.subscribe(
                    spec.ty,
                    Box::new(move |event| {
                        instance.borrow_mut().on_event(event, &ctx);
                    }),
                );
                self.tokens.push(token);
            }
        }
    }

    fn lock_predicate(store: &Rc<RefCell<StateStore>>) -> LockPredicate {
        let store = Rc::clone(store);
        Rc::new(move |target_ref: &str| {
            let store = store.borrow();
            // Before the first unlock evaluation there is no summary and
            // everything counts as unlocked; unknown refs likewise.
            match store.get("derived.unlocks") {
                Some(summary) => matches!(
                    summary.get("unlocked").and_then(|map| map.get(target_ref)),
                    Some(Value::Bool(false))
                ),
                None => false,
            }
        })
    }

    fn reset_intent_handler(
        reset: &Rc<LayerResetService>,
        publisher: &EventPublisher,
    ) -> IntentHandlerFn {
        let reset = Rc::clone(reset);
        let publisher = publisher.clone();
        Box::new(move |intent| {
            let layer_id = intent
                .payload
                .get("layerId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let mut payload = json!({
                "layerId": layer_id,
                "sourceIntent": REQUEST_LAYER_RESET_INTENT,
            });
            if let Some(reason) = intent.payload.get("reason").and_then(Value::as_str) {
                payload["reason"] = json!(reason);
            }
            if let Err(error) = publisher.publish(
                EventDraft::new(LAYER_RESET_REQUESTED_EVENT)
                    .source("GameEngine")
                    .payload(payload),
            ) {
                return json!({ "error": error.to_string() });
            }
            match reset.preview(&layer_id) {
                Ok(preview) => serde_json::to_value(preview).unwrap_or(Value::Null),
                Err(error) => json!({ "error": error.to_string() }),
            }
        })
    }

    /// Appends an intent to the next tick's input queue.
    pub fn enqueue_intent(&mut self, intent: Intent) -> Result<(), EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        self.pending_intents.push_back(intent);
        Ok(())
    }

    /// Registers a gameplay intent handler (host wiring).
    pub fn register_intent_handler(
        &mut self,
        ty: &str,
        handler: IntentHandlerFn,
    ) -> Result<(), EngineError> {
        self.router.register(ty, handler)?;
        Ok(())
    }

    /// Advances one frame through the six-phase pipeline.
    pub fn tick(&mut self) -> Result<TickSummary, EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        if self.in_tick {
            return Err(EngineError::ReentrantTick);
        }
        self.in_tick = true;
        let result = self.run_tick();
        self.in_tick = false;
        result
    }

    fn run_tick(&mut self) -> Result<TickSummary, EngineError> {
        self.tick_index += 1;
        self.bus.set_tick(self.tick_index);
        self.telemetry.on_tick_start(self.tick_index);
        let mut cursor = PhaseCursor::new();

        // input
        self.enter_phase(&mut cursor, Phase::Input)?;
        let pending: Vec<Intent> = self.pending_intents.drain(..).collect();
        let mut intents_routed = Vec::with_capacity(pending.len());
        for intent in pending {
            let disposition = self.router.route(&intent);
            intents_routed.push(RoutedIntent {
                ty: intent.ty,
                disposition,
            });
        }

        // time
        self.enter_phase(&mut cursor, Phase::Time)?;
        let dt = self.time.delta_seconds();
        if !dt.is_finite() || dt < 0.0 {
            return Err(EngineError::InvalidDelta { dt });
        }

        // layer-update, definition order, never sorted
        self.enter_phase(&mut cursor, Phase::LayerUpdate)?;
        let mut updated_layers = Vec::with_capacity(self.layers.len());
        for slot in &self.layers {
            slot.instance.borrow_mut().update(dt, &slot.ctx)?;
            updated_layers.push(slot.id.clone());
        }
        // Host hook: publish each layer's view model into derived state.
        for slot in &self.layers {
            let view_model = slot.instance.borrow().view_model();
            self.store
                .borrow_mut()
                .set_derived(&format!("layerViews.{}", slot.id), view_model)?;
        }

        // event-dispatch
        self.enter_phase(&mut cursor, Phase::EventDispatch)?;
        let dispatched_handlers = self.bus.dispatch_queued()?;
        let dispatch = self.bus.last_dispatch_report();
        self.telemetry.on_dispatch_report(self.tick_index, &dispatch);

        // unlock-evaluation; UNLOCKED events published here sit queued
        // until the next tick's dispatch phase.
        self.enter_phase(&mut cursor, Phase::UnlockEvaluation)?;
        let unlocks = {
            let store = self.store.borrow();
            self.evaluator.evaluate_all(
                Phase::UnlockEvaluation,
                store.canonical_root(),
                &self.publisher,
            )?
        };
        for target_ref in &unlocks.transitions {
            self.telemetry
                .on_unlock_transition(self.tick_index, target_ref);
        }
        let summary_value = serde_json::to_value(&unlocks).unwrap_or(Value::Null);
        self.store
            .borrow_mut()
            .set_derived(UNLOCKS_DERIVED_PATH, summary_value)?;

        // render
        self.enter_phase(&mut cursor, Phase::Render)?;
        let ui = ui::compose(&self.definition, &unlocks.unlocked);

        self.bus.set_allowed_phase(None);
        let summary = TickSummary {
            tick: self.tick_index,
            intents_routed,
            dt,
            updated_layers,
            dispatched_handlers,
            dispatch,
            unlocks,
            ui,
        };
        self.telemetry.on_tick_end(self.tick_index, &summary);
        Ok(summary)
    }

    fn enter_phase(&self, cursor: &mut PhaseCursor, phase: Phase) -> Result<(), EngineError> {
        cursor.enter(phase)?;
        self.bus.set_allowed_phase(Some(phase));
        self.telemetry.on_phase(self.tick_index, phase);
        Ok(())
    }

    /// Releases subscriptions and destroys layers in reverse creation
    /// order. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        for token in self.tokens.drain(..) {
            self.bus.unsubscribe(token);
        }
        for slot in self.layers.iter().rev() {
            slot.instance.borrow_mut().destroy(&slot.ctx);
        }
        self.destroyed = true;
    }

    /// The validated definition this runtime was built from.
    #[must_use]
    pub fn definition(&self) -> &GameDefinition {
        &self.definition
    }

    /// Content digest of the validated definition.
    #[must_use]
    pub fn digest(&self) -> DefinitionDigest {
        self.digest
    }

    /// Owned snapshot of both state namespaces, for savers and tests.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.store.borrow().snapshot()
    }

    /// Writes canonical state from the host, outside of ticks.
    pub fn write_state(&mut self, path: &str, value: Value) -> Result<(), EngineError> {
        self.store.borrow_mut().set(path, value)?;
        Ok(())
    }

    /// Shared state-store handle for host wiring (intent handlers).
    #[must_use]
    pub fn state_handle(&self) -> Rc<RefCell<StateStore>> {
        Rc::clone(&self.store)
    }

    /// Bus handle for host wiring (UI listeners, custom publishers).
    #[must_use]
    pub fn event_publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    /// Unlock progress estimate for every node reference.
    #[must_use]
    pub fn unlock_progress(&self) -> std::collections::BTreeMap<String, f64> {
        let store = self.store.borrow();
        self.evaluator.progress_all(store.canonical_root())
    }
}
