// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! Error types for FSM operations.

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of an [`FsmError`].
///
/// Listeners and dispatch outcomes carry the kind so callers can branch without matching on
/// every variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Invalid `add_state` input, raised synchronously at registration time.
    Configuration,
    /// Dispatch machinery used before `init`.
    NotInitialized,
    /// `init` called a second time.
    AlreadyInitialized,
    /// A public dispatch matched a private handler.
    Visibility,
    /// A transition happened between submission and resolution.
    Stale,
    /// The requested transition is not legal.
    InvalidTransition,
    /// The external active-state store did not read back what was written.
    StorageInconsistency,
    /// The machine's worker is gone.
    Closed,
}

/// Errors returned by registration, initialization, dispatch and transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsmError {
    #[error("Cannot add state, no state name provided")]
    EmptyStateName,

    #[error("Cannot add state '{state}', a state with that name already exists")]
    DuplicateState { state: String },

    #[error("Cannot add state '{state}', the name is reserved")]
    ReservedStateName { state: String },

    /// More than one handler (public or private) registered for the same event.
    #[error("Duplicate handler for state '{state}' and event '{event}'")]
    DuplicateHandler { state: String, event: String },

    #[error("Unable to handle '{event}', the state machine has not been initialized")]
    NotInitialized { event: String },

    #[error("Unable to initialize state machine, it has already been initialized")]
    AlreadyInitialized,

    /// The handler for `event` in `state` is private and the dispatch came from outside.
    #[error(
        "Unable to handle '{event}', the handler defined for it in '{state}' is private and can \
         only be reached through a private dispatch"
    )]
    VisibilityViolation { state: String, event: String },

    #[error(
        "Unable to handle '{event}' in '{state}', {missed} state change(s) occurred since it was \
         dispatched"
    )]
    StaleDispatch {
        state: String,
        event: String,
        missed: u64,
    },

    #[error(
        "Unable to change state from '{from}' to '{to}', {missed} state change(s) occurred since \
         the enclosing handler was dispatched"
    )]
    StaleTransition { from: String, to: String, missed: u64 },

    #[error("Cannot change state from '{from}' to '{to}', '{to}' is a reserved state name")]
    ReservedTarget { from: String, to: String },

    /// The state captured by a queued request is not registered.
    #[error("Unable to handle '{event}', state '{state}' is not defined")]
    UnknownState { state: String, event: String },

    #[error("Cannot change state from '{from}' to '{to}', '{to}' is not a defined state")]
    UnknownTarget { from: String, to: String },

    #[error("Cannot change state from '{from}' to '{to}', currently in '{active}'")]
    FromStateMismatch {
        from: String,
        to: String,
        active: String,
    },

    #[error(
        "Active state store is inconsistent: wrote '{expected}' but read back {}",
        read_back(.actual)
    )]
    StorageInconsistency {
        expected: String,
        actual: Option<String>,
    },

    #[error("The state machine worker has stopped")]
    Closed,
}

impl FsmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsmError::EmptyStateName
            | FsmError::DuplicateState { .. }
            | FsmError::ReservedStateName { .. }
            | FsmError::DuplicateHandler { .. } => ErrorKind::Configuration,
            FsmError::NotInitialized { .. } => ErrorKind::NotInitialized,
            FsmError::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            FsmError::VisibilityViolation { .. } => ErrorKind::Visibility,
            FsmError::StaleDispatch { .. } | FsmError::StaleTransition { .. } => ErrorKind::Stale,
            FsmError::ReservedTarget { .. }
            | FsmError::UnknownState { .. }
            | FsmError::UnknownTarget { .. }
            | FsmError::FromStateMismatch { .. } => ErrorKind::InvalidTransition,
            FsmError::StorageInconsistency { .. } => ErrorKind::StorageInconsistency,
            FsmError::Closed => ErrorKind::Closed,
        }
    }
}

fn read_back(actual: &Option<String>) -> String {
    match actual {
        Some(name) => format!("'{name}'"),
        None => "nothing".to_string(),
    }
}

/// Result type for FSM operations
pub type FsmResult<T> = Result<T, FsmError>;
