// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! Core types for the FSM library

use serde::Serialize;

use crate::error::{ErrorKind, FsmResult};

/// Dynamic payload carried by events and transitions.
pub type Payload = serde_json::Value;

/// Anything that names a state.
///
/// Implemented for `str`, `String` and references to either; enums can derive it with
/// `#[derive(queued_fsm::StateName)]`.
pub trait StateName {
    fn as_state_name(&self) -> &str;
}

/// Anything that names an event.
///
/// Implemented for `str`, `String` and references to either; enums can derive it with
/// `#[derive(queued_fsm::EventName)]`.
pub trait EventName {
    fn as_event_name(&self) -> &str;
}

impl StateName for str {
    fn as_state_name(&self) -> &str {
        self
    }
}

impl StateName for String {
    fn as_state_name(&self) -> &str {
        self
    }
}

impl<T: StateName + ?Sized> StateName for &T {
    fn as_state_name(&self) -> &str {
        (**self).as_state_name()
    }
}

impl EventName for str {
    fn as_event_name(&self) -> &str {
        self
    }
}

impl EventName for String {
    fn as_event_name(&self) -> &str {
        self
    }
}

impl<T: EventName + ?Sized> EventName for &T {
    fn as_event_name(&self) -> &str {
        (**self).as_event_name()
    }
}

/// Conversion of a hook, handler or middleware return value into the [`Payload`] recorded in
/// the dispatch outcome.
pub trait IntoHookOutput {
    fn into_output(self) -> Payload;
}

impl IntoHookOutput for () {
    fn into_output(self) -> Payload {
        Payload::Null
    }
}

impl IntoHookOutput for bool {
    fn into_output(self) -> Payload {
        Payload::Bool(self)
    }
}

impl IntoHookOutput for Payload {
    fn into_output(self) -> Payload {
        self
    }
}

impl IntoHookOutput for String {
    fn into_output(self) -> Payload {
        Payload::String(self)
    }
}

impl IntoHookOutput for &'static str {
    fn into_output(self) -> Payload {
        Payload::String(self.to_string())
    }
}

impl<T: IntoHookOutput> IntoHookOutput for Option<T> {
    fn into_output(self) -> Payload {
        self.map_or(Payload::Null, IntoHookOutput::into_output)
    }
}

impl<T: IntoHookOutput> IntoHookOutput for FsmResult<T> {
    fn into_output(self) -> Payload {
        match self {
            Ok(value) => value.into_output(),
            Err(err) => serde_json::json!({ "error": err.to_string() }),
        }
    }
}

/// What entry and exit hooks see about the transition they take part in.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransitionMeta {
    pub from: String,
    pub to: String,
    /// Payload of the event whose handler requested the transition.
    pub event_payload: Payload,
    /// Payload handed to `change_state_with`, `Null` otherwise.
    pub transition_payload: Payload,
}

/// Output of a keyed (`on_enter_from` / `on_exit_to`) hook.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HookReport {
    /// The key the hook was registered under.
    pub state: String,
    pub output: Payload,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EnterReport {
    pub enter_from: Option<HookReport>,
    pub on_enter: Payload,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExitReport {
    pub exit_to: Option<HookReport>,
    pub on_exit: Payload,
}

/// A completed transition.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransitionReport {
    pub from: String,
    pub to: String,
    /// Version counter after the transition.
    pub version: u64,
    pub exit: ExitReport,
    pub enter: EnterReport,
}

/// How a dispatch ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DispatchStatus {
    /// A handler ran (it may or may not have transitioned).
    Handled,
    /// The active state has no handler for the event.
    Unhandled,
    /// `before_handle` returned `false`.
    Vetoed,
    /// The dispatch was refused; the error went to the error listeners.
    Rejected(ErrorKind),
}

/// The result of resolving one queued event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub event: String,
    /// State captured when the event was submitted.
    pub state: Option<String>,
    /// Whether the dispatch itself was private.
    pub is_private: bool,
    /// Whether the matched handler is private, `None` without a match.
    pub handler_is_private: Option<bool>,
    pub status: DispatchStatus,
    pub before_handle: Option<Payload>,
    pub handler_output: Option<Payload>,
    pub after_handle: Option<Payload>,
    pub transition: Option<TransitionReport>,
}

impl DispatchOutcome {
    pub(crate) fn new(event: String, state: Option<String>, is_private: bool) -> Self {
        Self {
            event,
            state,
            is_private,
            handler_is_private: None,
            status: DispatchStatus::Handled,
            before_handle: None,
            handler_output: None,
            after_handle: None,
            transition: None,
        }
    }

    pub fn has_handler(&self) -> bool {
        self.handler_is_private.is_some()
    }

    pub fn transitioned(&self) -> bool {
        self.transition.is_some()
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.status, DispatchStatus::Rejected(_))
    }
}

/// Metadata handed to `before_handle` / `after_handle` middleware.
///
/// `handler_output` and `transition` are only populated for `after_handle`.
#[derive(Clone, Copy, Debug)]
pub struct HandleMeta<'a> {
    pub state: &'a str,
    pub event: &'a str,
    pub payload: &'a Payload,
    pub is_private: bool,
    pub handler_is_private: bool,
    pub handler_output: Option<&'a Payload>,
    pub transition: Option<&'a TransitionReport>,
}
