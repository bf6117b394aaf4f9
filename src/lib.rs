// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! Versioned, queue-serialized finite state machine runtime.
//!
//! A [`Machine`] owns a set of named states. Each state carries optional lifecycle hooks
//! (`on_enter`, `on_exit` and their keyed `on_enter_from` / `on_exit_to` variants), optional
//! `before_handle` / `after_handle` middleware and a table of event handlers that are either
//! public or private.
//!
//! Every event submitted with [`Machine::handle`] is snapshotted on submission (active state and
//! version counter) and resolved later on the machine's worker task, strictly one at a time and in
//! submission order. A handler that asks to transition is checked against that snapshot: if any
//! transition happened in between, the request is stale and refused. Private events can only be
//! queued through the capabilities handed to entry hooks and handlers, so a state can drive its
//! own internal steps without exposing them to callers.
//!
//! ## Quick start
//!
//! ```rust
//! use queued_fsm::{Machine, StateConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), queued_fsm::FsmError> {
//! let door = Machine::builder().label("door").build();
//!
//! door.add_state(
//!     "closed",
//!     StateConfig::new().on("open", |ctx| ctx.change_state("opening")),
//! )?;
//! door.add_state(
//!     "opening",
//!     StateConfig::new()
//!         // Finish opening on our own, without a caller-visible event.
//!         .on_enter(|_meta, dispatcher| {
//!             dispatcher.handle_private("opened");
//!         })
//!         .on_private("opened", |ctx| ctx.change_state("open")),
//! )?;
//! door.add_state(
//!     "open",
//!     StateConfig::new().on("close", |ctx| ctx.change_state("closed")),
//! )?;
//!
//! door.init("closed")?.await?;
//! door.handle("open").await?;
//! door.settled().await?;
//!
//! assert_eq!(door.active_state_name().as_deref(), Some("open"));
//! assert_eq!(door.version(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Registration mistakes (`add_state`, a second `init`) are returned directly. Everything found
//! while resolving a dispatch (stale snapshots, visibility violations, invalid targets, storage
//! inconsistencies) is logged, handed to every [`Machine::on_error`] listener and recorded in the
//! outcome as [`DispatchStatus::Rejected`].

// Allow this crate to refer to itself via `queued_fsm` so that
// derive expansions using `::queued_fsm::...` also work in
// the crate's own tests.
extern crate self as queued_fsm;

pub mod builder;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod machine;
mod notify;
pub mod state;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use builder::{MachineBuilder, StateConfig};
pub use dispatch::{Dispatch, HandlerContext, Pending, PrivateDispatcher, Transitioner};
pub use error::{ErrorKind, FsmError, FsmResult};
pub use machine::{Machine, BOOTSTRAP_STATE};
pub use store::{ActiveStateStore, FnStore, MemoryStore};
pub use types::{
    DispatchOutcome, DispatchStatus, EnterReport, EventName, ExitReport, HandleMeta, HookReport,
    IntoHookOutput, Payload, StateName, TransitionMeta, TransitionReport,
};

// Re-export handler types for advanced usage
pub use handlers::{
    EnterHook, ErrorListener, EventHandler, ExitHook, Middleware, StateChangeListener,
};

// Re-export the naming derives.
// This allows users to write:
//   #[derive(queued_fsm::StateName)]
//   enum Light { Red, Green }
pub use queued_fsm_macros::{EventName, StateName};
