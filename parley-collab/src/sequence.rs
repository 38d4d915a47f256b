//! Capability surface of the replicated-sequence engine.
//!
//! The session only ever talks to an engine through these traits, so a
//! real CRDT ([`crate::yrs_engine`]) and the in-memory double
//! ([`crate::memory`]) are interchangeable.

use parley_core::{Delta, Event, ProtocolError};
use thiserror::Error;

/// Change-stream callback. Receives one item per committed change,
/// local or remote, in delivery order.
pub type DeltaCallback = Box<dyn Fn(Result<Delta, ProtocolError>) + Send + Sync + 'static>;

/// Engine-side failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("Sequence is closed")]
    Closed,

    #[error("Range {index}..{index}+{count} out of bounds for sequence of length {len}")]
    OutOfRange {
        index: usize,
        count: usize,
        len: usize,
    },

    #[error("Update error: {0}")]
    Update(String),
}

/// Name of a chat room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// RAII guard for a change-stream callback. Dropping it detaches the
/// callback.
pub struct Subscription {
    _guard: Box<dyn std::any::Any>,
}

impl Subscription {
    pub fn new<G: 'static>(guard: G) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Subscription")
    }
}

/// One open replicated sequence of events.
pub trait ReplicatedSequence {
    fn room(&self) -> &RoomId;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `events` at the end, in order, as a single change.
    fn append(&self, events: &[Event]) -> Result<(), SequenceError>;

    /// Remove `count` events starting at `index`.
    fn delete_at(&self, index: usize, count: usize) -> Result<(), SequenceError>;

    fn subscribe(&self, on_delta: DeltaCallback) -> Result<Subscription, SequenceError>;

    /// Close the sequence. Later mutations fail with [`SequenceError::Closed`].
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Opens sequences bound to a room and its shared secret.
pub trait SequenceEngine {
    type Sequence: ReplicatedSequence;

    fn open(&self, room: &RoomId, secret: &str) -> Result<Self::Sequence, SequenceError>;
}
