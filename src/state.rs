// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! A single state: its lifecycle hooks, handler middleware and handler table.
//!
//! A `State` never sees its siblings or the machine. The machine hands it whatever capabilities
//! the hooks need (a [`PrivateDispatcher`] for entry hooks, a
//! [`HandlerContext`](crate::HandlerContext) for handlers).

use std::collections::HashMap;

use crate::builder::StateConfig;
use crate::dispatch::PrivateDispatcher;
use crate::error::{FsmError, FsmResult};
use crate::handlers::{EnterHook, EventHandler, ExitHook, HandlerDescriptor, Middleware};
use crate::types::{EnterReport, ExitReport, HandleMeta, HookReport, Payload, TransitionMeta};

pub struct State {
    name: String,
    on_enter: Option<EnterHook>,
    on_exit: Option<ExitHook>,
    on_enter_from: HashMap<String, EnterHook>,
    on_exit_to: HashMap<String, ExitHook>,
    handlers: HashMap<String, HandlerDescriptor>,
    before_handle: Option<Middleware>,
    after_handle: Option<Middleware>,
}

impl State {
    pub(crate) fn new(name: impl Into<String>, config: StateConfig) -> FsmResult<Self> {
        let name = name.into();
        let handlers = register_handlers(&name, config.handlers, config.private_handlers)?;
        Ok(Self {
            name,
            on_enter: config.on_enter,
            on_exit: config.on_exit,
            on_enter_from: config.on_enter_from,
            on_exit_to: config.on_exit_to,
            handlers,
            before_handle: config.before_handle,
            after_handle: config.after_handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the entry hooks: the one keyed by `meta.from` first, then the unconditional one.
    pub fn enter(&self, meta: &TransitionMeta, dispatcher: &PrivateDispatcher) -> EnterReport {
        let enter_from = self.on_enter_from.get(&meta.from).map(|hook| HookReport {
            state: meta.from.clone(),
            output: hook(meta, dispatcher),
        });
        let on_enter = self
            .on_enter
            .as_ref()
            .map_or(Payload::Null, |hook| hook(meta, dispatcher));
        EnterReport {
            enter_from,
            on_enter,
        }
    }

    /// Run the exit hooks: the one keyed by `meta.to` first, then the unconditional one.
    pub fn exit(&self, meta: &TransitionMeta) -> ExitReport {
        let exit_to = self.on_exit_to.get(&meta.to).map(|hook| HookReport {
            state: meta.to.clone(),
            output: hook(meta),
        });
        let on_exit = self.on_exit.as_ref().map_or(Payload::Null, |hook| hook(meta));
        ExitReport { exit_to, on_exit }
    }

    /// `None` when no `before_handle` middleware is configured.
    pub fn before_handle(&self, meta: &HandleMeta<'_>) -> Option<Payload> {
        self.before_handle.as_ref().map(|hook| hook(meta))
    }

    pub fn after_handle(&self, meta: &HandleMeta<'_>) -> Option<Payload> {
        self.after_handle.as_ref().map(|hook| hook(meta))
    }

    pub fn handler(&self, event: &str) -> Option<&HandlerDescriptor> {
        self.handlers.get(event)
    }

    /// Registered event names, in no particular order
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

/// Merge public and private handlers into one table, refusing any event registered twice.
fn register_handlers(
    state: &str,
    public: Vec<(String, EventHandler)>,
    private: Vec<(String, EventHandler)>,
) -> FsmResult<HashMap<String, HandlerDescriptor>> {
    let mut table = HashMap::with_capacity(public.len() + private.len());
    let tagged = public
        .into_iter()
        .map(|entry| (entry, false))
        .chain(private.into_iter().map(|entry| (entry, true)));

    for ((event, handler), is_private) in tagged {
        if table.contains_key(&event) {
            return Err(FsmError::DuplicateHandler {
                state: state.to_string(),
                event,
            });
        }
        table.insert(event, HandlerDescriptor { handler, is_private });
    }
    Ok(table)
}
