// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! Fluent builders for state configurations and machines

use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatch::{HandlerContext, PrivateDispatcher};
use crate::handlers::{EnterHook, EventHandler, ExitHook, Middleware};
use crate::machine::Machine;
use crate::store::{ActiveStateStore, MemoryStore};
use crate::types::{EventName, HandleMeta, IntoHookOutput, StateName, TransitionMeta};

/// Configuration handed to [`Machine::add_state`].
///
/// Every hook is optional; a missing hook behaves as a no-op returning `Null`.
///
/// ```rust
/// use queued_fsm::StateConfig;
///
/// let red = StateConfig::new()
///     .on_enter(|meta, _| println!("entered red from {}", meta.from))
///     .on("go", |ctx| ctx.change_state("green"));
/// ```
#[derive(Default)]
pub struct StateConfig {
    pub(crate) on_enter: Option<EnterHook>,
    pub(crate) on_exit: Option<ExitHook>,
    pub(crate) on_enter_from: HashMap<String, EnterHook>,
    pub(crate) on_exit_to: HashMap<String, ExitHook>,
    pub(crate) handlers: Vec<(String, EventHandler)>,
    pub(crate) private_handlers: Vec<(String, EventHandler)>,
    pub(crate) before_handle: Option<Middleware>,
    pub(crate) after_handle: Option<Middleware>,
}

impl StateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the unconditional entry hook
    pub fn on_enter<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&TransitionMeta, &PrivateDispatcher) -> R + Send + Sync + 'static,
        R: IntoHookOutput,
    {
        self.on_enter = Some(Arc::new(move |meta, dispatcher| {
            hook(meta, dispatcher).into_output()
        }));
        self
    }

    /// Define the unconditional exit hook
    pub fn on_exit<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&TransitionMeta) -> R + Send + Sync + 'static,
        R: IntoHookOutput,
    {
        self.on_exit = Some(Arc::new(move |meta| hook(meta).into_output()));
        self
    }

    /// Define an entry hook that only runs when arriving from `from`.
    ///
    /// It runs before the unconditional entry hook.
    pub fn on_enter_from<F, R>(mut self, from: impl StateName, hook: F) -> Self
    where
        F: Fn(&TransitionMeta, &PrivateDispatcher) -> R + Send + Sync + 'static,
        R: IntoHookOutput,
    {
        self.on_enter_from.insert(
            from.as_state_name().to_string(),
            Arc::new(move |meta, dispatcher| hook(meta, dispatcher).into_output()),
        );
        self
    }

    /// Define an exit hook that only runs when leaving to `to`.
    ///
    /// It runs before the unconditional exit hook.
    pub fn on_exit_to<F, R>(mut self, to: impl StateName, hook: F) -> Self
    where
        F: Fn(&TransitionMeta) -> R + Send + Sync + 'static,
        R: IntoHookOutput,
    {
        self.on_exit_to.insert(
            to.as_state_name().to_string(),
            Arc::new(move |meta| hook(meta).into_output()),
        );
        self
    }

    /// Define a public handler for an event
    pub fn on<F, R>(mut self, event: impl EventName, handler: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>) -> R + Send + Sync + 'static,
        R: IntoHookOutput,
    {
        self.handlers.push((
            event.as_event_name().to_string(),
            Arc::new(move |ctx| handler(ctx).into_output()),
        ));
        self
    }

    /// Define a private handler, reachable only through `handle_private`
    pub fn on_private<F, R>(mut self, event: impl EventName, handler: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>) -> R + Send + Sync + 'static,
        R: IntoHookOutput,
    {
        self.private_handlers.push((
            event.as_event_name().to_string(),
            Arc::new(move |ctx| handler(ctx).into_output()),
        ));
        self
    }

    /// Middleware run before a matched handler. Returning `false` vetoes the handler.
    pub fn before_handle<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&HandleMeta<'_>) -> R + Send + Sync + 'static,
        R: IntoHookOutput,
    {
        self.before_handle = Some(Arc::new(move |meta| hook(meta).into_output()));
        self
    }

    /// Middleware run after a matched handler
    pub fn after_handle<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&HandleMeta<'_>) -> R + Send + Sync + 'static,
        R: IntoHookOutput,
    {
        self.after_handle = Some(Arc::new(move |meta| hook(meta).into_output()));
        self
    }
}

/// Builder for [`Machine`].
pub struct MachineBuilder {
    pub(crate) label: String,
    pub(crate) store: Box<dyn ActiveStateStore>,
}

impl Default for MachineBuilder {
    fn default() -> Self {
        Self {
            label: "fsm".to_string(),
            store: Box::new(MemoryStore::default()),
        }
    }
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name attached to every log record emitted by the machine
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Back the active-state name with an external store
    pub fn store(mut self, store: impl ActiveStateStore) -> Self {
        self.store = Box::new(store);
        self
    }

    /// Build the machine and spawn its worker.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn build(self) -> Machine {
        Machine::from_builder(self)
    }
}
