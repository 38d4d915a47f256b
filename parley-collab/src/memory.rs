//! In-memory replicated sequence.
//!
//! A plain `Vec<Event>` behind a mutex. Every local append or delete emits
//! the exact delta a CRDT would, and remote activity can be injected as
//! typed deltas or as raw Yjs-style JSON. Every mutation is also recorded
//! so callers can assert on the requests a session made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use parley_core::{Delta, DeltaOp, Event, ProtocolError};

use crate::sequence::{
    DeltaCallback, ReplicatedSequence, RoomId, SequenceEngine, SequenceError, Subscription,
};

type SharedCallback = Arc<dyn Fn(Result<Delta, ProtocolError>) + Send + Sync + 'static>;

/// A mutation requested through [`ReplicatedSequence`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceRequest {
    Append(Vec<Event>),
    DeleteAt { index: usize, count: usize },
}

#[derive(Default)]
struct MemoryState {
    events: Vec<Event>,
    subscribers: HashMap<u64, SharedCallback>,
    next_subscriber: u64,
    reject_subscriptions: bool,
    closed: bool,
    requests: Vec<SequenceRequest>,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Engine handing out [`MemorySequence`]s. Clones share the registry of
/// opened sequences.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    opened: Arc<Mutex<Vec<MemorySequence>>>,
    reject_subscriptions: Arc<AtomicBool>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sequence opened so far, oldest first.
    pub fn opened(&self) -> Vec<MemorySequence> {
        self.opened.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make sequences opened from now on refuse every `subscribe`.
    pub fn reject_subscriptions(&self, reject: bool) {
        self.reject_subscriptions.store(reject, Ordering::SeqCst);
    }

    pub fn last_opened(&self) -> Option<MemorySequence> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl SequenceEngine for MemoryEngine {
    type Sequence = MemorySequence;

    fn open(&self, room: &RoomId, secret: &str) -> Result<MemorySequence, SequenceError> {
        let sequence = MemorySequence {
            room: room.clone(),
            secret: secret.to_string(),
            state: Arc::new(Mutex::new(MemoryState {
                reject_subscriptions: self.reject_subscriptions.load(Ordering::SeqCst),
                ..MemoryState::default()
            })),
        };
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sequence.clone());
        Ok(sequence)
    }
}

/// Handle to one in-memory sequence. Clones observe the same log.
#[derive(Clone)]
pub struct MemorySequence {
    room: RoomId,
    secret: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySequence {
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.state).events.clone()
    }

    pub fn requests(&self) -> Vec<SequenceRequest> {
        lock(&self.state).requests.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    /// Apply a change made by a remote peer and deliver it.
    ///
    /// A delta that does not fit the current log is rejected without
    /// touching it.
    pub fn inject_remote(&self, delta: Delta) -> Result<(), ProtocolError> {
        {
            let mut state = lock(&self.state);
            let events = splice(&state.events, &delta)?;
            state.events = events;
        }
        self.deliver(Ok(delta));
        Ok(())
    }

    /// Decode a Yjs-style JSON delta and deliver the outcome as is.
    ///
    /// The log is only updated when the delta decodes and fits; a decode
    /// failure reaches subscribers as a protocol error.
    pub fn inject_raw_json(&self, raw: &str) {
        match Delta::from_json_str(raw) {
            Ok(delta) => {
                if let Err(e) = self.inject_remote(delta) {
                    self.deliver(Err(e));
                }
            }
            Err(e) => self.deliver(Err(e)),
        }
    }

    /// Deliver a change-stream item without touching the log.
    pub fn deliver_raw(&self, delta: Result<Delta, ProtocolError>) {
        self.deliver(delta);
    }

    fn deliver(&self, delta: Result<Delta, ProtocolError>) {
        // Subscribers may re-enter the sequence, so the lock is released first.
        let subscribers: Vec<SharedCallback> = {
            let state = lock(&self.state);
            let mut ids: Vec<_> = state.subscribers.keys().copied().collect();
            ids.sort_unstable();
            ids.iter().map(|id| state.subscribers[id].clone()).collect()
        };
        for subscriber in subscribers {
            subscriber(delta.clone());
        }
    }
}

impl ReplicatedSequence for MemorySequence {
    fn room(&self) -> &RoomId {
        &self.room
    }

    fn len(&self) -> usize {
        lock(&self.state).events.len()
    }

    fn append(&self, events: &[Event]) -> Result<(), SequenceError> {
        let delta = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(SequenceError::Closed);
            }
            state.requests.push(SequenceRequest::Append(events.to_vec()));
            if events.is_empty() {
                return Ok(());
            }
            let at = state.events.len();
            state.events.extend_from_slice(events);
            leading_retain(at).insert(events.iter().cloned())
        };
        self.deliver(Ok(delta));
        Ok(())
    }

    fn delete_at(&self, index: usize, count: usize) -> Result<(), SequenceError> {
        let delta = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(SequenceError::Closed);
            }
            let len = state.events.len();
            if index.checked_add(count).map_or(true, |end| end > len) {
                return Err(SequenceError::OutOfRange { index, count, len });
            }
            state.requests.push(SequenceRequest::DeleteAt { index, count });
            if count == 0 {
                return Ok(());
            }
            state.events.drain(index..index + count);
            leading_retain(index).delete(count)
        };
        self.deliver(Ok(delta));
        Ok(())
    }

    fn subscribe(&self, on_delta: DeltaCallback) -> Result<Subscription, SequenceError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(SequenceError::Closed);
        }
        if state.reject_subscriptions {
            return Err(SequenceError::Update("subscription rejected".into()));
        }
        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state.subscribers.insert(id, Arc::from(on_delta));
        Ok(Subscription::new(Unsubscribe {
            state: Arc::downgrade(&self.state),
            id,
        }))
    }

    fn close(&mut self) {
        lock(&self.state).closed = true;
    }

    fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

impl std::fmt::Debug for MemorySequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MemorySequence")
            .field("room", &self.room)
            .field("len", &state.events.len())
            .field("subscribers", &state.subscribers.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// Deltas skip the retain when the change starts at the head.
fn leading_retain(n: usize) -> Delta {
    if n == 0 {
        Delta::new()
    } else {
        Delta::new().retain(n)
    }
}

struct Unsubscribe {
    state: Weak<Mutex<MemoryState>>,
    id: u64,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            lock(&state).subscribers.remove(&self.id);
        }
    }
}

/// Apply `delta` to a copy of `events`.
fn splice(events: &[Event], delta: &Delta) -> Result<Vec<Event>, ProtocolError> {
    let mut out = Vec::with_capacity(events.len() + delta.inserted_len());
    let mut rest = events.iter();
    let mut curr = 0usize;

    for op in delta.ops() {
        match op {
            DeltaOp::Retain(n) | DeltaOp::Delete(n) => {
                let remaining = events.len() - curr;
                if *n > remaining {
                    return Err(ProtocolError::CursorOverrun {
                        op: op.name(),
                        cursor: out.len(),
                        count: *n,
                        len: out.len() + remaining,
                    });
                }
                let taken = rest.by_ref().take(*n);
                if matches!(op, DeltaOp::Retain(_)) {
                    out.extend(taken.cloned());
                } else {
                    let _ = taken.count();
                }
                curr += n;
            }
            DeltaOp::Insert(inserted) => out.extend(inserted.iter().cloned()),
        }
    }
    out.extend(rest.cloned());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> MemorySequence {
        MemoryEngine::new().open(&RoomId::new("r"), "pw").unwrap()
    }

    fn recording(seq: &MemorySequence) -> (Subscription, Arc<Mutex<Vec<Result<Delta, ProtocolError>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = seq
            .subscribe(Box::new(move |delta| sink.lock().unwrap().push(delta)))
            .unwrap();
        (sub, seen)
    }

    #[test]
    fn test_append_and_delete_emit_exact_deltas() {
        let seq = open();
        let (_sub, seen) = recording(&seq);

        seq.append(&[Event::join("a"), Event::join("b")]).unwrap();
        seq.delete_at(0, 1).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                Ok(Delta::new().insert([Event::join("a"), Event::join("b")])),
                Ok(Delta::new().delete(1)),
            ]
        );
        assert_eq!(seq.events(), vec![Event::join("b")]);
    }

    #[test]
    fn test_inject_remote_updates_log() {
        let seq = open();
        seq.append(&[Event::join("a"), Event::join("c")]).unwrap();

        seq.inject_remote(Delta::new().retain(1).insert([Event::join("b")]))
            .unwrap();
        assert_eq!(
            seq.events(),
            vec![Event::join("a"), Event::join("b"), Event::join("c")]
        );

        let err = seq.inject_remote(Delta::new().retain(4)).unwrap_err();
        assert!(matches!(err, ProtocolError::CursorOverrun { op: "retain", .. }));
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn test_inject_raw_json_delivers_decode_errors() {
        let seq = open();
        let (_sub, seen) = recording(&seq);

        seq.inject_raw_json(r#"[{"insert": [{"type": "poke", "user": "x"}]}]"#);

        assert_eq!(
            seen.lock().unwrap()[0],
            Err(ProtocolError::UnknownEventKind("poke".into()))
        );
        assert!(seq.is_empty());
    }

    #[test]
    fn test_delete_range_checked() {
        let seq = open();
        seq.append(&[Event::join("a"), Event::join("b")]).unwrap();

        assert_eq!(
            seq.delete_at(1, usize::MAX),
            Err(SequenceError::OutOfRange {
                index: 1,
                count: usize::MAX,
                len: 2
            })
        );
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn test_close_and_unsubscribe() {
        let mut seq = open();
        let (sub, _seen) = recording(&seq);
        assert_eq!(seq.subscriber_count(), 1);
        drop(sub);
        assert_eq!(seq.subscriber_count(), 0);

        seq.close();
        assert_eq!(seq.append(&[Event::join("a")]), Err(SequenceError::Closed));
        assert!(seq.requests().is_empty());
    }

    #[test]
    fn test_engine_tracks_opened() {
        let engine = MemoryEngine::new();
        engine.open(&RoomId::new("one"), "a").unwrap();
        engine.open(&RoomId::new("two"), "b").unwrap();
        assert_eq!(engine.opened().len(), 2);
        assert_eq!(engine.last_opened().unwrap().room().as_str(), "two");
    }
}
