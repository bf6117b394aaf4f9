// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! Coordination tests: private dispatch from hooks, hook ordering, deferred transitions and
//! notification listeners.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use queued_fsm::{
    DispatchOutcome, DispatchStatus, ErrorKind, FsmError, Machine, Payload, PrivateDispatcher,
    StateConfig, Transitioner,
};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::timeout;

type Log = Arc<Mutex<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.lock().push(entry.into());
}

#[tokio::test]
async fn test_entry_hook_drives_private_steps() {
    let log: Log = Arc::default();
    let machine = Machine::builder().label("loader").build();

    let l = log.clone();
    machine
        .add_state(
            "loading",
            StateConfig::new()
                .on_enter(move |_, dispatcher: &PrivateDispatcher| {
                    push(&l, "loading:enter");
                    dispatcher.handle_private_with("loaded", json!({ "rows": 3 }));
                })
                .on_private("loaded", |ctx| {
                    let rows = ctx.payload()["rows"].clone();
                    ctx.change_state_with("ready", rows)
                }),
        )
        .unwrap();
    let l = log.clone();
    machine
        .add_state(
            "ready",
            StateConfig::new().on_enter(move |meta, _| {
                push(&l, format!("ready:enter rows={}", meta.transition_payload));
            }),
        )
        .unwrap();

    machine.init("loading").unwrap().await.unwrap();
    machine.settled().await.unwrap();

    assert_eq!(machine.active_state_name().as_deref(), Some("ready"));
    assert_eq!(
        *log.lock(),
        vec!["loading:enter".to_string(), "ready:enter rows=3".to_string()]
    );
}

#[tokio::test]
async fn test_handler_can_queue_private_event_for_its_state() {
    let machine = Machine::new();
    machine
        .add_state(
            "armed",
            StateConfig::new()
                .on("trigger", |ctx| {
                    ctx.handle_private("fire");
                    "queued"
                })
                .on_private("fire", |ctx| ctx.change_state("fired")),
        )
        .unwrap();
    machine.add_state("fired", StateConfig::new()).unwrap();
    machine.init("armed").unwrap().await.unwrap();

    let outcome = machine.handle("trigger").await.unwrap();
    // The private event resolves after the dispatch that queued it.
    assert!(!outcome.transitioned());
    assert_eq!(outcome.handler_output, Some(Payload::String("queued".into())));

    machine.settled().await.unwrap();
    assert_eq!(machine.active_state_name().as_deref(), Some("fired"));
}

#[tokio::test]
async fn test_private_dispatch_result_is_awaitable_from_outside() {
    let (tx, rx) = oneshot::channel::<PrivateDispatcher>();
    let tx = Mutex::new(Some(tx));

    let machine = Machine::new();
    machine
        .add_state(
            "waiting",
            StateConfig::new()
                .on_enter(move |_, dispatcher: &PrivateDispatcher| {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(dispatcher.clone());
                    }
                })
                .on_private("poke", |ctx| format!("poked in {}", ctx.state_name())),
        )
        .unwrap();
    machine.init("waiting").unwrap().await.unwrap();

    let dispatcher = rx.await.unwrap();
    let outcome = dispatcher.handle_private("poke").await.unwrap();

    assert!(outcome.is_private);
    assert_eq!(outcome.handler_is_private, Some(true));
    assert_eq!(
        outcome.handler_output,
        Some(Payload::String("poked in waiting".into()))
    );
}

#[tokio::test]
async fn test_enter_from_runs_before_enter_only_for_its_source() {
    let log: Log = Arc::default();
    let machine = Machine::new();

    machine
        .add_state("red", StateConfig::new().on("go", |ctx| ctx.change_state("green")))
        .unwrap();
    machine
        .add_state(
            "yellow",
            StateConfig::new().on("go", |ctx| ctx.change_state("green")),
        )
        .unwrap();
    let (a, b) = (log.clone(), log.clone());
    machine
        .add_state(
            "green",
            StateConfig::new()
                .on_enter_from("red", move |_, _| push(&a, "hookA"))
                .on_enter(move |meta, _| push(&b, format!("green:enter from {}", meta.from)))
                .on("stop", |ctx| ctx.change_state("yellow")),
        )
        .unwrap();

    machine.init("red").unwrap().await.unwrap();
    let outcome = machine.handle("go").await.unwrap();
    let enter = outcome.transition.unwrap().enter;
    assert_eq!(enter.enter_from.unwrap().state, "red");

    machine.handle("stop").await.unwrap();
    let outcome = machine.handle("go").await.unwrap();
    assert!(outcome.transition.unwrap().enter.enter_from.is_none());

    assert_eq!(
        *log.lock(),
        vec![
            "hookA".to_string(),
            "green:enter from red".to_string(),
            "green:enter from yellow".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_exit_hooks_run_before_entry_hooks() {
    let log: Log = Arc::default();
    let machine = Machine::new();

    let (a, b) = (log.clone(), log.clone());
    machine
        .add_state(
            "green",
            StateConfig::new()
                .on_exit_to("yellow", move |_| push(&a, "green:exit_to yellow"))
                .on_exit(move |meta| push(&b, format!("green:exit to {}", meta.to)))
                .on("slow", |ctx| ctx.change_state("yellow")),
        )
        .unwrap();
    let c = log.clone();
    machine
        .add_state(
            "yellow",
            StateConfig::new().on_enter(move |_, _| push(&c, "yellow:enter")),
        )
        .unwrap();

    machine.init("green").unwrap().await.unwrap();
    let outcome = machine.handle("slow").await.unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "green:exit_to yellow".to_string(),
            "green:exit to yellow".to_string(),
            "yellow:enter".to_string(),
        ]
    );
    let exit = outcome.transition.unwrap().exit;
    assert_eq!(exit.exit_to.unwrap().state, "yellow");
}

#[tokio::test]
async fn test_after_handle_sees_handler_output_and_transition() {
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    let machine = Machine::new();
    machine
        .add_state(
            "draft",
            StateConfig::new()
                .after_handle(move |meta| {
                    *slot.lock() = Some((
                        meta.handler_output.cloned(),
                        meta.transition.map(|report| report.to.clone()),
                    ));
                    "audited"
                })
                .on("publish", |ctx| {
                    ctx.change_state("published")?;
                    Ok::<_, FsmError>("done")
                }),
        )
        .unwrap();
    machine.add_state("published", StateConfig::new()).unwrap();
    machine.init("draft").unwrap().await.unwrap();

    let outcome = machine.handle("publish").await.unwrap();

    assert_eq!(outcome.after_handle, Some(Payload::String("audited".into())));
    assert_eq!(
        *seen.lock(),
        Some((
            Some(Payload::String("done".into())),
            Some("published".to_string())
        ))
    );
}

#[tokio::test]
async fn test_transition_payloads_reach_hooks() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (exit_seen, enter_seen) = (seen.clone(), seen.clone());
    let machine = Machine::new();
    machine
        .add_state(
            "cart",
            StateConfig::new()
                .on_exit(move |meta| exit_seen.lock().push(meta.event_payload.clone()))
                .on("checkout", |ctx| {
                    ctx.change_state_with("paid", json!({ "receipt": "r-1" }))
                }),
        )
        .unwrap();
    machine
        .add_state(
            "paid",
            StateConfig::new()
                .on_enter(move |meta, _| enter_seen.lock().push(meta.transition_payload.clone())),
        )
        .unwrap();
    machine.init("cart").unwrap().await.unwrap();

    machine
        .handle_with("checkout", json!({ "total": 42 }))
        .await
        .unwrap();

    assert_eq!(
        *seen.lock(),
        vec![json!({ "total": 42 }), json!({ "receipt": "r-1" })]
    );
}

#[tokio::test]
async fn test_deferred_transition_after_handler_returned() {
    let kept: Arc<Mutex<Option<Transitioner>>> = Arc::default();
    let slot = kept.clone();
    let machine = Machine::new();
    machine
        .add_state(
            "greenLight",
            StateConfig::new().on("slowDown", move |ctx| {
                *slot.lock() = Some(ctx.transitioner());
            }),
        )
        .unwrap();
    machine.add_state("yellowLight", StateConfig::new()).unwrap();

    let changes = Arc::new(Mutex::new(Vec::<DispatchOutcome>::new()));
    let sink = changes.clone();
    machine.on_state_change(move |outcome| sink.lock().push(outcome.clone()));

    machine.init("greenLight").unwrap().await.unwrap();
    let outcome = machine.handle("slowDown").await.unwrap();
    assert!(!outcome.transitioned());

    let transitioner = kept.lock().take().unwrap();
    assert_eq!(transitioner.from_state(), "greenLight");
    let report = transitioner.change_state("yellowLight").await.unwrap();
    assert_eq!(report.version, 2);
    assert_eq!(machine.active_state_name().as_deref(), Some("yellowLight"));

    let changes = changes.lock();
    let last = changes.last().unwrap();
    assert_eq!(last.event, "slowDown");
    assert_eq!(last.transition.as_ref().unwrap().to, "yellowLight");
}

#[tokio::test]
async fn test_repeat_request_for_same_target_is_deterministic() {
    let kept: Arc<Mutex<Option<Transitioner>>> = Arc::default();
    let slot = kept.clone();
    let machine = Machine::new();
    machine
        .add_state(
            "greenLight",
            StateConfig::new().on("yellowLight", move |ctx| {
                *slot.lock() = Some(ctx.transitioner());
                ctx.change_state("yellowLight")
            }),
        )
        .unwrap();
    machine
        .add_state(
            "yellowLight",
            StateConfig::new().on("redLight", |ctx| ctx.change_state("redLight")),
        )
        .unwrap();
    machine.add_state("redLight", StateConfig::new()).unwrap();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    machine.on_error(move |err| sink.lock().push(err.clone()));

    machine.init("greenLight").unwrap().await.unwrap();
    let first = machine.handle("yellowLight").await.unwrap();
    assert!(first.transitioned());

    // Asking again through the handler's own capability: the version moved, so it is stale.
    let transitioner = kept.lock().take().unwrap();
    let err = transitioner.change_state("yellowLight").await.unwrap_err();
    assert_eq!(
        err,
        FsmError::StaleTransition {
            from: "greenLight".into(),
            to: "yellowLight".into(),
            missed: 1,
        }
    );

    // Asking again through `handle`: it validates against the current state and has no handler.
    let again = machine.handle("yellowLight").await.unwrap();
    assert_eq!(again.status, DispatchStatus::Unhandled);

    assert_eq!(machine.active_state_name().as_deref(), Some("yellowLight"));
    assert_eq!(machine.version(), 2);
    assert_eq!(errors.lock().len(), 1);
    assert_eq!(errors.lock()[0].kind(), ErrorKind::Stale);
}

#[tokio::test]
async fn test_state_change_listeners_see_every_transition() {
    let machine = Machine::new();
    machine
        .add_state("a", StateConfig::new().on("next", |ctx| ctx.change_state("b")))
        .unwrap();
    machine
        .add_state(
            "b",
            StateConfig::new()
                .on("next", |ctx| ctx.change_state("a"))
                .on("noop", |_ctx| ()),
        )
        .unwrap();

    let transitions = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second"] {
        let sink = transitions.clone();
        machine.on_state_change(move |outcome| {
            let report = outcome.transition.as_ref().unwrap();
            sink.lock()
                .push(format!("{tag}:{}->{}@{}", report.from, report.to, report.version));
        });
    }

    machine.init("a").unwrap().await.unwrap();
    machine.handle("next").await.unwrap();
    machine.handle("noop").await.unwrap();
    machine.handle("next").await.unwrap();

    assert_eq!(
        *transitions.lock(),
        vec![
            "first:__bootstrap__->a@1",
            "second:__bootstrap__->a@1",
            "first:a->b@2",
            "second:a->b@2",
            "first:b->a@3",
            "second:b->a@3",
        ]
    );
}

#[tokio::test]
async fn test_queue_keeps_submission_order() {
    let order: Log = Arc::default();
    let events = ["one", "two", "three", "four"];

    let mut config = StateConfig::new();
    for event in events {
        let l = order.clone();
        config = config.on(event, move |ctx| push(&l, ctx.event_name()));
    }
    let machine = Machine::new();
    machine.add_state("log", config).unwrap();
    machine.init("log").unwrap().await.unwrap();

    let pending: Vec<_> = events.iter().map(|event| machine.handle(event)).collect();
    for outcome in futures::future::join_all(pending).await {
        assert_eq!(outcome.unwrap().status, DispatchStatus::Handled);
    }

    assert_eq!(*order.lock(), events);
}

#[tokio::test]
async fn test_settled_returns_when_idle() {
    let machine = Machine::new();
    machine.add_state("idle", StateConfig::new()).unwrap();
    timeout(Duration::from_secs(1), machine.settled())
        .await
        .expect("an idle machine settles immediately")
        .unwrap();
}
