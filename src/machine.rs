// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! Machine implementation: state registry, dispatch pipeline and transition execution

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::builder::{MachineBuilder, StateConfig};
use crate::dispatch::{
    Command, DeferredTransition, Dispatch, EventRequest, HandlerContext, Pending,
    PrivateDispatcher, Queue, WorkerLink,
};
use crate::error::{FsmError, FsmResult};
use crate::notify::Listeners;
use crate::state::State;
use crate::store::ActiveStateStore;
use crate::types::{
    DispatchOutcome, DispatchStatus, EventName, HandleMeta, Payload, StateName, TransitionMeta,
    TransitionReport,
};

/// Reserved name of the state the machine sits in between `init` and its first transition.
pub const BOOTSTRAP_STATE: &str = "__bootstrap__";

const BOOTSTRAP_EVENT: &str = "__bootstrap__";

/// Handle to a running state machine.
///
/// Cloning is cheap; every clone talks to the same worker. The worker stops once the last
/// handle is dropped and the queue has drained.
///
/// ```rust
/// use queued_fsm::{Machine, StateConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), queued_fsm::FsmError> {
/// let light = Machine::new();
/// light.add_state("red", StateConfig::new().on("go", |ctx| ctx.change_state("green")))?;
/// light.add_state("green", StateConfig::new())?;
///
/// light.init("red")?.await?;
/// let outcome = light.handle("go").await?;
///
/// assert!(outcome.transitioned());
/// assert_eq!(light.active_state_name().as_deref(), Some("green"));
/// assert_eq!(light.previous_state_name().as_deref(), Some("red"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Machine {
    shared: Arc<Shared>,
    queue: Queue,
}

impl Machine {
    /// Create a machine with in-memory storage.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        MachineBuilder::new().build()
    }

    pub fn builder() -> MachineBuilder {
        MachineBuilder::new()
    }

    pub(crate) fn from_builder(builder: MachineBuilder) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Queue::new(tx);
        let shared = Arc::new(Shared {
            label: builder.label,
            states: RwLock::new(IndexMap::new()),
            store: builder.store,
            gate: Mutex::new(Gate::default()),
            initialized: AtomicBool::new(false),
            listeners: Listeners::default(),
        });

        tokio::spawn(run_worker(shared.clone(), rx, queue.link()));
        Self { shared, queue }
    }

    /// Register a state.
    ///
    /// Fails on an empty, reserved or already registered name, and when the configuration
    /// registers more than one handler for an event.
    pub fn add_state(&self, name: impl StateName, config: StateConfig) -> FsmResult<()> {
        let name = name.as_state_name();
        if name.is_empty() {
            return Err(FsmError::EmptyStateName);
        }
        if name == BOOTSTRAP_STATE {
            return Err(FsmError::ReservedStateName {
                state: name.to_string(),
            });
        }

        let state = State::new(name, config)?;
        let mut states = self.shared.states.write();
        if states.contains_key(name) {
            return Err(FsmError::DuplicateState {
                state: name.to_string(),
            });
        }
        states.insert(name.to_string(), Arc::new(state));
        debug!(machine = %self.shared.label, "Added state {}", name);
        Ok(())
    }

    /// Start the machine in `start`.
    ///
    /// The machine parks in the reserved bootstrap state and queues a private bootstrap event
    /// whose handler transitions into `start`, so the first entry runs through the regular
    /// pipeline. The returned future resolves with that bootstrap dispatch; a bad `start` is
    /// reported through the error listeners like any other failed transition.
    pub fn init(&self, start: impl StateName) -> FsmResult<Dispatch> {
        if self
            .shared
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FsmError::AlreadyInitialized);
        }

        let start = start.as_state_name().to_string();
        let bootstrap = StateConfig::new().on_private(BOOTSTRAP_EVENT, move |ctx| {
            ctx.change_state(start.as_str())
        });
        let bootstrap = State::new(BOOTSTRAP_STATE, bootstrap)?;
        self.shared
            .states
            .write()
            .insert(BOOTSTRAP_STATE.to_string(), Arc::new(bootstrap));

        let version = {
            let gate = self.shared.gate.lock();
            if let Err(err) = self.shared.write_active(BOOTSTRAP_STATE) {
                drop(gate);
                self.shared.states.write().shift_remove(BOOTSTRAP_STATE);
                self.shared.initialized.store(false, Ordering::SeqCst);
                return Err(err);
            }
            gate.version
        };

        debug!(machine = %self.shared.label, "Initializing");
        Ok(self.queue.dispatch(EventRequest {
            state: Some(BOOTSTRAP_STATE.to_string()),
            event: BOOTSTRAP_EVENT.to_string(),
            payload: Payload::Null,
            is_private: true,
            version,
        }))
    }

    /// Queue `event` for the active state.
    pub fn handle(&self, event: impl EventName) -> Dispatch {
        self.handle_with(event, Payload::Null)
    }

    /// Queue `event` with a payload for the active state.
    ///
    /// The active state and version counter are captured now; the handler runs once everything
    /// queued earlier has been resolved. Errors found at that point go to the error listeners
    /// and the outcome is marked [`DispatchStatus::Rejected`].
    pub fn handle_with(&self, event: impl EventName, payload: Payload) -> Dispatch {
        let (version, state) = self.shared.snapshot();
        let request = EventRequest {
            state,
            event: event.as_event_name().to_string(),
            payload,
            is_private: false,
            version,
        };
        debug!(
            machine = %self.shared.label,
            event = %request.event,
            state = ?request.state,
            version,
            "Queued event"
        );
        self.queue.dispatch(request)
    }

    pub fn active_state_name(&self) -> Option<String> {
        self.shared.store.read()
    }

    /// The state left by the most recent transition; `None` until the machine left its first
    /// real state.
    pub fn previous_state_name(&self) -> Option<String> {
        self.shared.gate.lock().previous.clone()
    }

    /// Number of completed transitions, the bootstrap transition included.
    pub fn version(&self) -> u64 {
        self.shared.gate.lock().version
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    pub fn has_state(&self, name: impl StateName) -> bool {
        let name = name.as_state_name();
        name != BOOTSTRAP_STATE && self.shared.states.read().contains_key(name)
    }

    /// Registered state names in registration order
    pub fn state_names(&self) -> Vec<String> {
        self.shared
            .states
            .read()
            .keys()
            .filter(|name| name.as_str() != BOOTSTRAP_STATE)
            .cloned()
            .collect()
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Subscribe to completed transitions.
    pub fn on_state_change<F>(&self, listener: F)
    where
        F: Fn(&DispatchOutcome) + Send + Sync + 'static,
    {
        self.shared.listeners.add_change(Arc::new(listener));
    }

    /// Subscribe to dispatch-time errors.
    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&FsmError) + Send + Sync + 'static,
    {
        self.shared.listeners.add_error(Arc::new(listener));
    }

    /// Resolves once the queue is empty, including work queued while draining it.
    pub fn settled(&self) -> Pending<()> {
        self.queue.settle()
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("label", &self.shared.label)
            .field("active", &self.active_state_name())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

/// Version counter and previous-state name, guarded together with the active-state write so a
/// submission never observes one without the other.
#[derive(Default)]
struct Gate {
    version: u64,
    previous: Option<String>,
}

pub(crate) struct Shared {
    label: String,
    states: RwLock<IndexMap<String, Arc<State>>>,
    store: Box<dyn ActiveStateStore>,
    gate: Mutex<Gate>,
    initialized: AtomicBool,
    listeners: Listeners,
}

/// Inputs of a transition request.
pub(crate) struct TransitionRequest<'a> {
    pub from: &'a str,
    pub to: &'a str,
    /// Version the requesting handler's dispatch was resolved against.
    pub version: u64,
    pub event_payload: &'a Payload,
    pub transition_payload: Payload,
}

impl Shared {
    fn state(&self, name: &str) -> Option<Arc<State>> {
        self.states.read().get(name).cloned()
    }

    /// Version first, then the active state, under the gate.
    fn snapshot(&self) -> (u64, Option<String>) {
        let gate = self.gate.lock();
        (gate.version, self.store.read())
    }

    fn report(&self, error: &FsmError) {
        warn!(machine = %self.label, kind = ?error.kind(), "{}", error);
        self.listeners.emit_error(error);
    }

    /// Write through the store and insist on reading the same name back.
    ///
    /// Callers hold the gate.
    fn write_active(&self, name: &str) -> FsmResult<()> {
        self.store.write(name);
        let actual = self.store.read();
        if actual.as_deref() == Some(name) {
            Ok(())
        } else {
            Err(FsmError::StorageInconsistency {
                expected: name.to_string(),
                actual,
            })
        }
    }

    fn resolve(&self, request: EventRequest, link: &WorkerLink) -> DispatchOutcome {
        let mut outcome =
            DispatchOutcome::new(request.event.clone(), request.state.clone(), request.is_private);
        if let Err(err) = self.run_handler(&request, link, &mut outcome) {
            self.report(&err);
            outcome.status = DispatchStatus::Rejected(err.kind());
        }
        outcome
    }

    fn run_handler(
        &self,
        request: &EventRequest,
        link: &WorkerLink,
        outcome: &mut DispatchOutcome,
    ) -> FsmResult<()> {
        let state_name = match request.state.as_deref() {
            Some(name) if self.initialized.load(Ordering::SeqCst) => name,
            _ => {
                return Err(FsmError::NotInitialized {
                    event: request.event.clone(),
                })
            }
        };
        let state = self
            .state(state_name)
            .ok_or_else(|| FsmError::UnknownState {
                state: state_name.to_string(),
                event: request.event.clone(),
            })?;

        let Some(descriptor) = state.handler(&request.event) else {
            debug!(
                machine = %self.label,
                "No handler for {} in {}", request.event, state_name
            );
            outcome.status = DispatchStatus::Unhandled;
            return Ok(());
        };
        outcome.handler_is_private = Some(descriptor.is_private);

        if descriptor.is_private && !request.is_private {
            return Err(FsmError::VisibilityViolation {
                state: state_name.to_string(),
                event: request.event.clone(),
            });
        }

        let (version, active) = self.snapshot();
        if version != request.version {
            return Err(FsmError::StaleDispatch {
                state: state_name.to_string(),
                event: request.event.clone(),
                missed: version.saturating_sub(request.version),
            });
        }
        if active.as_deref() != Some(state_name) {
            // Same version but a different state: the store was changed behind our back.
            return Err(FsmError::FromStateMismatch {
                from: state_name.to_string(),
                to: state_name.to_string(),
                active: active.unwrap_or_default(),
            });
        }

        let meta = HandleMeta {
            state: state_name,
            event: &request.event,
            payload: &request.payload,
            is_private: request.is_private,
            handler_is_private: descriptor.is_private,
            handler_output: None,
            transition: None,
        };
        if let Some(verdict) = state.before_handle(&meta) {
            let vetoed = verdict == Payload::Bool(false);
            outcome.before_handle = Some(verdict);
            if vetoed {
                debug!(
                    machine = %self.label,
                    "before_handle vetoed {} in {}", request.event, state_name
                );
                outcome.status = DispatchStatus::Vetoed;
                return Ok(());
            }
        }

        let mut ctx = HandlerContext::new(
            self,
            link,
            request,
            state_name,
            descriptor.is_private,
            version,
        );
        let output = (descriptor.handler)(&mut ctx);
        let transition = ctx.into_transition();

        let meta = HandleMeta {
            handler_output: Some(&output),
            transition: transition.as_ref(),
            ..meta
        };
        outcome.after_handle = state.after_handle(&meta);
        outcome.handler_output = Some(output);
        outcome.transition = transition;
        outcome.status = DispatchStatus::Handled;
        Ok(())
    }

    /// Validate and perform a transition, reporting any failure.
    pub(crate) fn transition(
        &self,
        request: TransitionRequest<'_>,
        link: &WorkerLink,
    ) -> FsmResult<TransitionReport> {
        self.try_transition(request, link).map_err(|err| {
            self.report(&err);
            err
        })
    }

    fn try_transition(
        &self,
        request: TransitionRequest<'_>,
        link: &WorkerLink,
    ) -> FsmResult<TransitionReport> {
        let TransitionRequest {
            from,
            to,
            version,
            event_payload,
            transition_payload,
        } = request;

        if to == BOOTSTRAP_STATE {
            return Err(FsmError::ReservedTarget {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let (current_version, active) = self.snapshot();
        if current_version != version {
            return Err(FsmError::StaleTransition {
                from: from.to_string(),
                to: to.to_string(),
                missed: current_version.saturating_sub(version),
            });
        }
        let active = match active {
            Some(active) if active == from => active,
            other => {
                return Err(FsmError::FromStateMismatch {
                    from: from.to_string(),
                    to: to.to_string(),
                    active: other.unwrap_or_default(),
                })
            }
        };
        let next = self.state(to).ok_or_else(|| FsmError::UnknownTarget {
            from: from.to_string(),
            to: to.to_string(),
        })?;

        let meta = TransitionMeta {
            from: from.to_string(),
            to: to.to_string(),
            event_payload: event_payload.clone(),
            transition_payload,
        };

        trace!(machine = %self.label, "Exiting {} to {}", from, to);
        let exit = self
            .state(&active)
            .map(|current| current.exit(&meta))
            .unwrap_or_default();

        let version = {
            let mut gate = self.gate.lock();
            if let Err(err) = self.write_active(to) {
                // Put the old name back so the store never points at an unregistered state.
                self.store.write(&active);
                return Err(err);
            }
            gate.version += 1;
            if active != BOOTSTRAP_STATE {
                gate.previous = Some(active);
            }
            gate.version
        };

        let dispatcher = PrivateDispatcher::new(link.clone(), to.to_string(), version);
        trace!(machine = %self.label, "Entering {} from {}", to, from);
        let enter = next.enter(&meta, &dispatcher);

        debug!(
            machine = %self.label,
            version,
            "Transitioned from {} to {}", from, to
        );
        Ok(TransitionReport {
            from: meta.from,
            to: meta.to,
            version,
            exit,
            enter,
        })
    }

    fn deferred_transition(
        &self,
        request: DeferredTransition,
        link: &WorkerLink,
    ) -> FsmResult<TransitionReport> {
        let report = self.transition(
            TransitionRequest {
                from: &request.from,
                to: &request.to,
                version: request.version,
                event_payload: &request.event_payload,
                transition_payload: request.transition_payload.clone(),
            },
            link,
        )?;

        let mut outcome =
            DispatchOutcome::new(request.event, Some(request.from), request.is_private);
        outcome.handler_is_private = Some(request.handler_is_private);
        outcome.transition = Some(report.clone());
        self.listeners.emit_change(&outcome);
        Ok(report)
    }
}

/// Resolve queued commands one at a time until every [`Machine`] handle is gone.
async fn run_worker(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    link: WorkerLink,
) {
    debug!(machine = %shared.label, "Worker started");
    while let Some(command) = rx.recv().await {
        match command {
            Command::Dispatch { request, reply } => {
                let outcome = shared.resolve(request, &link);
                if outcome.transitioned() {
                    shared.listeners.emit_change(&outcome);
                }
                link.done();
                let _ = reply.send(Ok(outcome));
            }
            Command::Transition { request, reply } => {
                let result = shared.deferred_transition(request, &link);
                link.done();
                let _ = reply.send(result);
            }
            Command::Settle { reply } => {
                if link.queued() == 0 {
                    let _ = reply.send(Ok(()));
                } else {
                    link.requeue_settle(reply);
                    tokio::task::yield_now().await;
                }
            }
        }
    }
    debug!(machine = %shared.label, "Worker stopped");
}
