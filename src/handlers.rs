// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! Handler type aliases for FSM callbacks

use std::sync::Arc;

use crate::dispatch::{HandlerContext, PrivateDispatcher};
use crate::error::FsmError;
use crate::types::{DispatchOutcome, HandleMeta, Payload, TransitionMeta};

/// Type alias for event handlers
///
/// The handler is invoked on the machine's worker with a [`HandlerContext`] through which it may
/// request a transition or queue private events. Its return value is recorded in the outcome.
pub type EventHandler = Arc<dyn Fn(&mut HandlerContext<'_>) -> Payload + Send + Sync>;

/// Type alias for entry hooks (`on_enter`, `on_enter_from`)
///
/// Entry hooks run after the active-state pointer moved and may queue private events against
/// the state being entered.
pub type EnterHook = Arc<dyn Fn(&TransitionMeta, &PrivateDispatcher) -> Payload + Send + Sync>;

/// Type alias for exit hooks (`on_exit`, `on_exit_to`)
pub type ExitHook = Arc<dyn Fn(&TransitionMeta) -> Payload + Send + Sync>;

/// Type alias for `before_handle` / `after_handle` middleware
pub type Middleware = Arc<dyn Fn(&HandleMeta<'_>) -> Payload + Send + Sync>;

/// Listener notified after every completed transition.
pub type StateChangeListener = Arc<dyn Fn(&DispatchOutcome) + Send + Sync>;

/// Listener notified of every dispatch-time error.
pub type ErrorListener = Arc<dyn Fn(&FsmError) + Send + Sync>;

/// A handler registered on a state together with its visibility.
#[derive(Clone)]
pub struct HandlerDescriptor {
    pub handler: EventHandler,
    pub is_private: bool,
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("is_private", &self.is_private)
            .finish_non_exhaustive()
    }
}
