//! Integration tests for the session lifecycle over the in-memory engine.
//!
//! The memory engine emits the same deltas a CRDT would, and lets the tests
//! play a remote peer by injecting changes into the shared log.

use std::sync::{Arc, Mutex};

use parley_collab::{
    ConnectionState, MemoryEngine, ReplicatedSequence, SequenceError, SequenceRequest, Session,
    SessionConfig, SessionError,
};
use parley_core::{Delta, Event, ProtocolError, ViewMutation, ViewObserver};
use tokio::time::{Duration, Instant};

#[derive(Clone, Default)]
struct Recorder {
    mutations: Arc<Mutex<Vec<ViewMutation>>>,
}

impl ViewObserver for Recorder {
    fn on_view_mutated(&mut self, mutation: &ViewMutation) {
        self.mutations.lock().unwrap().push(mutation.clone());
    }
}

fn connected(engine: &MemoryEngine, user: &str) -> Session<MemoryEngine> {
    let mut session = Session::new(engine.clone(), SessionConfig::default());
    session.connect(user, "hello-there", "secret").unwrap();
    let deadline = session.ready_deadline().unwrap();
    assert!(session.poll_ready(deadline).unwrap());
    session
}

// ---------------------------------------------------------------
// Lifecycle guards
// ---------------------------------------------------------------

#[test]
fn test_double_connect_leaves_view_untouched() {
    let engine = MemoryEngine::new();
    let mut session = connected(&engine, "Ben");
    session.send_message("hi").unwrap();
    let before = session.units();

    assert_eq!(
        session.connect("Ana", "elsewhere", "x"),
        Err(SessionError::AlreadyConnected)
    );

    assert_eq!(session.units(), before);
    assert_eq!(session.user(), Some("Ben"));
    assert_eq!(engine.opened().len(), 1);
}

#[test]
fn test_disconnect_without_connect_fails() {
    let mut session = Session::new(MemoryEngine::new(), SessionConfig::default());
    assert_eq!(session.disconnect(), Err(SessionError::NotConnected));
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(session.transcript(), None);
}

#[test]
fn test_disconnect_keeps_final_transcript() {
    let engine = MemoryEngine::new();
    let mut session = connected(&engine, "Ben");
    session.send_message("bye soon").unwrap();

    session.disconnect().unwrap();

    assert_eq!(
        session.transcript(),
        Some(vec![
            Event::join("Ben"),
            Event::message("Ben", "bye soon"),
            Event::leave("Ben"),
        ])
    );
    let sequence = engine.last_opened().unwrap();
    assert!(sequence.is_closed());
    assert_eq!(sequence.subscriber_count(), 0);
}

#[test]
fn test_reconnect_starts_from_empty_view() {
    let engine = MemoryEngine::new();
    let mut session = connected(&engine, "Ben");
    session.disconnect().unwrap();

    session.connect("Ben", "hello-there", "secret").unwrap();

    assert_eq!(session.transcript(), Some(vec![]));
    assert_eq!(engine.opened().len(), 2);
}

#[test]
fn test_failed_subscribe_keeps_previous_transcript() {
    let engine = MemoryEngine::new();
    let mut session = connected(&engine, "Ben");
    session.send_message("still here").unwrap();
    session.disconnect().unwrap();
    let before = session.transcript();

    engine.reject_subscriptions(true);
    assert!(matches!(
        session.connect("Ben", "hello-there", "secret"),
        Err(SessionError::Sequence(SequenceError::Update(_)))
    ));

    assert_eq!(session.transcript(), before);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(engine.last_opened().unwrap().is_closed());

    // The generation was not consumed: the next session still reconciles.
    engine.reject_subscriptions(false);
    session.connect("Ben", "hello-there", "secret").unwrap();
    session.send_message("back").unwrap();
    assert_eq!(
        session.transcript(),
        Some(vec![Event::message("Ben", "back")])
    );
}

// ---------------------------------------------------------------
// Join announcement
// ---------------------------------------------------------------

#[test]
fn test_disconnect_while_connecting_cancels_join() {
    let engine = MemoryEngine::new();
    let mut session = Session::new(engine.clone(), SessionConfig::default());
    session.connect("Ben", "hello-there", "secret").unwrap();
    let deadline = session.ready_deadline().unwrap();

    session.disconnect().unwrap();

    assert!(session.ready_deadline().is_none());
    assert!(!session.poll_ready(deadline + Duration::from_secs(5)).unwrap());
    let sequence = engine.last_opened().unwrap();
    assert_eq!(
        sequence.requests(),
        vec![SequenceRequest::Append(vec![Event::leave("Ben")])]
    );
}

#[test]
fn test_closed_sequence_rejects_late_join() {
    let engine = MemoryEngine::new();
    let mut session = Session::new(engine.clone(), SessionConfig::default());
    session.connect("Ben", "hello-there", "secret").unwrap();
    session.disconnect().unwrap();

    let sequence = engine.last_opened().unwrap();
    assert_eq!(
        sequence.append(&[Event::join("Ben")]),
        Err(SequenceError::Closed)
    );
    assert_eq!(sequence.events(), vec![Event::leave("Ben")]);
}

#[tokio::test(start_paused = true)]
async fn test_ready_fires_after_join_delay() {
    let config = SessionConfig::default().with_join_delay(Duration::from_millis(1000));
    let mut session = Session::new(MemoryEngine::new(), config);
    let started = Instant::now();
    session.connect("Ben", "hello-there", "secret").unwrap();

    assert!(session.ready().await.unwrap());

    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(session.connection_state(), ConnectionState::Connected);
    assert_eq!(session.transcript(), Some(vec![Event::join("Ben")]));
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_ready_keeps_join_pending() {
    let mut session = Session::new(MemoryEngine::new(), SessionConfig::default());
    session.connect("Ben", "hello-there", "secret").unwrap();

    let waited = tokio::time::timeout(Duration::from_millis(10), session.ready()).await;
    assert!(waited.is_err());
    assert!(session.ready_deadline().is_some());
    assert_eq!(session.connection_state(), ConnectionState::Connecting);

    assert!(session.ready().await.unwrap());
    assert_eq!(session.transcript(), Some(vec![Event::join("Ben")]));
}

#[tokio::test(start_paused = true)]
async fn test_ready_without_pending_join() {
    let mut session = Session::new(MemoryEngine::new(), SessionConfig::default());
    assert!(!session.ready().await.unwrap());
}

// ---------------------------------------------------------------
// Deltas reaching the view
// ---------------------------------------------------------------

#[test]
fn test_tail_append_is_one_insert_batch() {
    let engine = MemoryEngine::new();
    let recorder = Recorder::default();
    let mut session = Session::new(engine.clone(), SessionConfig::default());
    session.mount(Box::new(recorder.clone())).unwrap();
    session.connect("Ben", "hello-there", "secret").unwrap();

    let remote = vec![
        Event::join("Ana"),
        Event::message("Ana", "one"),
        Event::message("Ana", "two"),
    ];
    engine
        .last_opened()
        .unwrap()
        .inject_remote(Delta::new().insert(remote.clone()))
        .unwrap();

    let mutations = recorder.mutations.lock().unwrap();
    assert_eq!(mutations.len(), 1);
    assert!(matches!(
        &mutations[0],
        ViewMutation::Inserted { position: 0, units } if units.len() == 3
    ));
    assert_eq!(session.transcript(), Some(remote));
}

#[test]
fn test_remote_insert_shifts_retraction_target() {
    let engine = MemoryEngine::new();
    let mut session = Session::new(engine.clone(), SessionConfig::default());
    session.connect("Ben", "hello-there", "secret").unwrap();
    session.send_message("mine").unwrap();

    let handle = session.units()[0].handle();
    assert!(session.pointer_enter(handle));

    // A peer's message lands ahead of ours before the click is confirmed.
    engine
        .last_opened()
        .unwrap()
        .inject_remote(Delta::new().insert([Event::message("Ana", "first")]))
        .unwrap();

    assert_eq!(session.confirm_retract(handle).unwrap(), Some(1));
    assert_eq!(
        session.transcript(),
        Some(vec![Event::message("Ana", "first")])
    );
    assert_eq!(
        engine.last_opened().unwrap().requests().last(),
        Some(&SequenceRequest::DeleteAt { index: 1, count: 1 })
    );
}

#[test]
fn test_only_armed_own_messages_are_retractable() {
    let engine = MemoryEngine::new();
    let mut session = connected(&engine, "Ben");
    engine
        .last_opened()
        .unwrap()
        .inject_remote(Delta::new().retain(1).insert([Event::message("Ana", "hers")]))
        .unwrap();
    session.send_message("mine").unwrap();

    let units = session.units();
    let (join, hers, mine) = (units[0].handle(), units[1].handle(), units[2].handle());

    assert!(!session.pointer_enter(join));
    assert!(!session.pointer_enter(hers));
    assert_eq!(session.confirm_retract(hers).unwrap(), None);
    // Idle until hovered.
    assert_eq!(session.confirm_retract(mine).unwrap(), None);

    assert!(session.pointer_enter(mine));
    assert!(session.pointer_leave(mine));
    assert_eq!(session.confirm_retract(mine).unwrap(), None);
    assert_eq!(session.transcript().unwrap().len(), 3);
}

// ---------------------------------------------------------------
// Protocol violations
// ---------------------------------------------------------------

#[test]
fn test_unknown_event_kind_halts_without_rendering() {
    let engine = MemoryEngine::new();
    let recorder = Recorder::default();
    let mut session = Session::new(engine.clone(), SessionConfig::default());
    session.mount(Box::new(recorder.clone())).unwrap();
    session.connect("Ben", "hello-there", "secret").unwrap();

    engine
        .last_opened()
        .unwrap()
        .inject_raw_json(r#"[{"insert": [{"type": "poke", "user": "Ana"}]}]"#);

    assert_eq!(
        session.fault(),
        Some(ProtocolError::UnknownEventKind("poke".into()))
    );
    assert!(session.units().is_empty());
    assert!(recorder.mutations.lock().unwrap().is_empty());
    assert!(matches!(
        session.send_message("hello?"),
        Err(SessionError::Protocol(_))
    ));
}

#[test]
fn test_faulted_view_ignores_later_deltas() {
    let engine = MemoryEngine::new();
    let mut session = connected(&engine, "Ben");
    let sequence = engine.last_opened().unwrap();

    sequence.deliver_raw(Ok(Delta::new().retain(7).delete(1)));
    assert!(matches!(
        session.fault(),
        Some(ProtocolError::CursorOverrun { op: "retain", .. })
    ));

    sequence
        .inject_remote(Delta::new().retain(1).insert([Event::join("Ana")]))
        .unwrap();
    assert_eq!(session.transcript(), Some(vec![Event::join("Ben")]));

    // Teardown still works and the next session starts clean.
    session.disconnect().unwrap();
    session.connect("Ben", "hello-there", "secret").unwrap();
    assert!(session.fault().is_none());
}

#[test]
fn test_malformed_json_tag_is_fatal() {
    let engine = MemoryEngine::new();
    let session = connected(&engine, "Ben");

    engine
        .last_opened()
        .unwrap()
        .inject_raw_json(r#"[{"format": 3}]"#);

    assert!(matches!(
        session.fault(),
        Some(ProtocolError::MalformedDelta(_))
    ));
    assert_eq!(session.transcript(), Some(vec![Event::join("Ben")]));
}
