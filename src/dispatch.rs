// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! Queue plumbing between [`Machine`](crate::Machine) handles and the worker, plus the
//! capabilities handed to handlers and entry hooks.
//!
//! Nothing in here executes a dispatch. Submitting an event only snapshots it and pushes it onto
//! the queue; the worker resolves it once everything already queued ahead of it has finished.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};

use crate::error::{FsmError, FsmResult};
use crate::machine::{Shared, TransitionRequest};
use crate::types::{DispatchOutcome, EventName, Payload, StateName, TransitionReport};

/// Snapshot of one submitted event.
#[derive(Clone, Debug)]
pub(crate) struct EventRequest {
    /// Active state when the event was submitted, `None` before `init`.
    pub state: Option<String>,
    pub event: String,
    pub payload: Payload,
    pub is_private: bool,
    /// Version counter observed at submission.
    pub version: u64,
}

/// A transition requested through a [`Transitioner`] after its handler returned.
#[derive(Clone, Debug)]
pub(crate) struct DeferredTransition {
    pub from: String,
    pub to: String,
    pub version: u64,
    pub event: String,
    pub event_payload: Payload,
    pub transition_payload: Payload,
    pub is_private: bool,
    pub handler_is_private: bool,
}

pub(crate) enum Command {
    Dispatch {
        request: EventRequest,
        reply: oneshot::Sender<FsmResult<DispatchOutcome>>,
    },
    Transition {
        request: DeferredTransition,
        reply: oneshot::Sender<FsmResult<TransitionReport>>,
    },
    /// Resolves once no counted command is left in the queue.
    Settle { reply: oneshot::Sender<FsmResult<()>> },
}

/// Owning end of the queue, held by every [`Machine`](crate::Machine) handle.
#[derive(Clone)]
pub(crate) struct Queue {
    tx: mpsc::UnboundedSender<Command>,
    depth: Arc<AtomicUsize>,
}

impl Queue {
    pub fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            tx,
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn link(&self) -> WorkerLink {
        WorkerLink {
            tx: self.tx.downgrade(),
            depth: self.depth.clone(),
        }
    }

    pub fn dispatch(&self, request: EventRequest) -> Dispatch {
        let (reply, rx) = oneshot::channel();
        send_counted(&self.tx, &self.depth, Command::Dispatch { request, reply });
        Pending::new(rx)
    }

    pub fn settle(&self) -> Pending<()> {
        let (reply, rx) = oneshot::channel();
        // A failed send drops `reply`, which resolves the future to `Closed`.
        let _ = self.tx.send(Command::Settle { reply });
        Pending::new(rx)
    }
}

/// Non-owning end of the queue used from the worker side.
///
/// Holding one never keeps the worker alive; once every [`Machine`](crate::Machine) handle is
/// gone, sends through a link fail and their futures resolve to [`FsmError::Closed`].
#[derive(Clone)]
pub(crate) struct WorkerLink {
    tx: mpsc::WeakUnboundedSender<Command>,
    depth: Arc<AtomicUsize>,
}

impl WorkerLink {
    pub fn dispatch(&self, request: EventRequest) -> Dispatch {
        let (reply, rx) = oneshot::channel();
        if let Some(tx) = self.tx.upgrade() {
            send_counted(&tx, &self.depth, Command::Dispatch { request, reply });
        }
        Pending::new(rx)
    }

    pub fn transition(&self, request: DeferredTransition) -> Pending<TransitionReport> {
        let (reply, rx) = oneshot::channel();
        if let Some(tx) = self.tx.upgrade() {
            send_counted(&tx, &self.depth, Command::Transition { request, reply });
        }
        Pending::new(rx)
    }

    /// Put a settle request back at the end of the queue.
    pub fn requeue_settle(&self, reply: oneshot::Sender<FsmResult<()>>) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(Command::Settle { reply });
        }
    }

    pub fn queued(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Mark one counted command as finished.
    pub fn done(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

fn send_counted(tx: &mpsc::UnboundedSender<Command>, depth: &AtomicUsize, command: Command) {
    depth.fetch_add(1, Ordering::SeqCst);
    if tx.send(command).is_err() {
        depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Future for work queued on a machine.
///
/// Resolves once the worker has processed the request. Dropping it does not cancel the request.
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<FsmResult<T>>,
}

/// Future returned by [`Machine::handle`](crate::Machine::handle) and the private dispatch
/// capabilities.
pub type Dispatch = Pending<DispatchOutcome>;

impl<T> Pending<T> {
    fn new(rx: oneshot::Receiver<FsmResult<T>>) -> Self {
        Self { rx }
    }
}

impl<T> Future for Pending<T> {
    type Output = FsmResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(FsmError::Closed)))
    }
}

/// Capability to queue private events against one state, handed to entry hooks.
///
/// The dispatcher remembers the state and version it was created for. Events it submits after
/// the machine moved on resolve as stale.
#[derive(Clone)]
pub struct PrivateDispatcher {
    link: WorkerLink,
    state: String,
    version: u64,
}

impl PrivateDispatcher {
    pub(crate) fn new(link: WorkerLink, state: String, version: u64) -> Self {
        Self {
            link,
            state,
            version,
        }
    }

    /// The state private events are scoped to
    pub fn state_name(&self) -> &str {
        &self.state
    }

    pub fn handle_private(&self, event: impl EventName) -> Dispatch {
        self.handle_private_with(event, Payload::Null)
    }

    pub fn handle_private_with(&self, event: impl EventName, payload: Payload) -> Dispatch {
        self.link.dispatch(EventRequest {
            state: Some(self.state.clone()),
            event: event.as_event_name().to_string(),
            payload,
            is_private: true,
            version: self.version,
        })
    }
}

impl std::fmt::Debug for PrivateDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateDispatcher")
            .field("state", &self.state)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// What a handler gets to work with while it runs.
pub struct HandlerContext<'a> {
    machine: &'a Shared,
    link: &'a WorkerLink,
    request: &'a EventRequest,
    state: &'a str,
    handler_is_private: bool,
    /// Version observed when the dispatch started resolving.
    version: u64,
    transition: Option<TransitionReport>,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(
        machine: &'a Shared,
        link: &'a WorkerLink,
        request: &'a EventRequest,
        state: &'a str,
        handler_is_private: bool,
        version: u64,
    ) -> Self {
        Self {
            machine,
            link,
            request,
            state,
            handler_is_private,
            version,
            transition: None,
        }
    }

    /// The state this handler belongs to
    pub fn state_name(&self) -> &str {
        self.state
    }

    pub fn event_name(&self) -> &str {
        &self.request.event
    }

    pub fn payload(&self) -> &Payload {
        &self.request.payload
    }

    /// Whether this dispatch came through a private channel
    pub fn is_private(&self) -> bool {
        self.request.is_private
    }

    /// Leave this state for `to`.
    ///
    /// The transition runs synchronously: exit hooks, the state pointer update and entry hooks
    /// have all finished when this returns. Failures are also reported to the error listeners.
    pub fn change_state(&mut self, to: impl StateName) -> FsmResult<()> {
        self.change_state_with(to, Payload::Null)
    }

    /// Like [`change_state`](Self::change_state), handing `payload` to the exit and entry hooks.
    pub fn change_state_with(&mut self, to: impl StateName, payload: Payload) -> FsmResult<()> {
        let report = self.machine.transition(
            TransitionRequest {
                from: self.state,
                to: to.as_state_name(),
                version: self.version,
                event_payload: &self.request.payload,
                transition_payload: payload,
            },
            self.link,
        )?;
        // Any later request in this handler is stale, so the first report is the only one.
        self.transition.get_or_insert(report);
        Ok(())
    }

    /// Queue a private event for this state.
    pub fn handle_private(&self, event: impl EventName) -> Dispatch {
        self.handle_private_with(event, Payload::Null)
    }

    pub fn handle_private_with(&self, event: impl EventName, payload: Payload) -> Dispatch {
        self.private_dispatcher().handle_private_with(event, payload)
    }

    /// A dispatcher bound to this handler's state and version, usable after the handler returns.
    pub fn private_dispatcher(&self) -> PrivateDispatcher {
        PrivateDispatcher::new(self.link.clone(), self.state.to_string(), self.version)
    }

    /// A transition request capability usable after the handler returns.
    pub fn transitioner(&self) -> Transitioner {
        Transitioner {
            link: self.link.clone(),
            from: self.state.to_string(),
            version: self.version,
            event: self.request.event.clone(),
            event_payload: self.request.payload.clone(),
            is_private: self.request.is_private,
            handler_is_private: self.handler_is_private,
        }
    }

    pub(crate) fn into_transition(self) -> Option<TransitionReport> {
        self.transition
    }
}

/// A handler's transition request capability, detached from the handler invocation.
///
/// Requests made through it are queued and validated exactly like
/// [`HandlerContext::change_state`]: they fail as stale once any transition happened since the
/// originating dispatch started resolving.
#[derive(Clone)]
pub struct Transitioner {
    link: WorkerLink,
    from: String,
    version: u64,
    event: String,
    event_payload: Payload,
    is_private: bool,
    handler_is_private: bool,
}

impl Transitioner {
    pub fn from_state(&self) -> &str {
        &self.from
    }

    pub fn change_state(&self, to: impl StateName) -> Pending<TransitionReport> {
        self.change_state_with(to, Payload::Null)
    }

    pub fn change_state_with(
        &self,
        to: impl StateName,
        payload: Payload,
    ) -> Pending<TransitionReport> {
        self.link.transition(DeferredTransition {
            from: self.from.clone(),
            to: to.as_state_name().to_string(),
            version: self.version,
            event: self.event.clone(),
            event_payload: self.event_payload.clone(),
            transition_payload: payload,
            is_private: self.is_private,
            handler_is_private: self.handler_is_private,
        })
    }
}

impl std::fmt::Debug for Transitioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transitioner")
            .field("from", &self.from)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn detached_dispatcher(state: &str, version: u64) -> PrivateDispatcher {
    let (tx, _rx) = mpsc::unbounded_channel();
    let link = Queue::new(tx).link();
    PrivateDispatcher::new(link, state.to_string(), version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detached_dispatch_resolves_closed() {
        let dispatcher = detached_dispatcher("red", 3);
        assert_eq!(dispatcher.state_name(), "red");
        let err = dispatcher.handle_private("tick").await.unwrap_err();
        assert_eq!(err, FsmError::Closed);
    }

    #[tokio::test]
    async fn queued_requests_are_counted_until_done() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = Queue::new(tx);
        let link = queue.link();

        let _pending = queue.dispatch(EventRequest {
            state: Some("red".into()),
            event: "go".into(),
            payload: Payload::Null,
            is_private: false,
            version: 0,
        });
        assert_eq!(link.queued(), 1);

        match rx.recv().await {
            Some(Command::Dispatch { request, .. }) => assert_eq!(request.event, "go"),
            _ => panic!("expected a dispatch command"),
        }
        link.done();
        assert_eq!(link.queued(), 0);
    }
}
