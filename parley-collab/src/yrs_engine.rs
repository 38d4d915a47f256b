//! Yrs-backed replicated sequence.
//!
//! Each opened room gets its own `yrs::Doc` holding one shared array.
//! Events are stored as maps (`{type, user, content}`) and array observer
//! deltas are translated into [`Delta`] values for the reconciler.
//!
//! Replication between peers is left to the transport: a sequence hands
//! out its state vector, encodes the diff a peer is missing, and applies
//! updates received from peers.

use std::collections::HashMap;
use std::sync::Arc;

use parley_core::{Delta, DeltaOp, Event, ProtocolError};
use yrs::types::Change;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Any, Array, ArrayRef, Doc, Observable, Out, ReadTxn, StateVector, Transact, Update};

use crate::sequence::{
    DeltaCallback, ReplicatedSequence, RoomId, SequenceEngine, SequenceError, Subscription,
};

/// Name of the shared array holding the room's event log.
pub const DEFAULT_ARRAY_NAME: &str = "chat";

/// Opens one `yrs` document per room.
#[derive(Debug, Clone)]
pub struct YrsEngine {
    array_name: String,
}

impl Default for YrsEngine {
    fn default() -> Self {
        Self::with_array_name(DEFAULT_ARRAY_NAME)
    }
}

impl YrsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_array_name(array_name: impl Into<String>) -> Self {
        Self {
            array_name: array_name.into(),
        }
    }

    pub fn array_name(&self) -> &str {
        &self.array_name
    }
}

impl SequenceEngine for YrsEngine {
    type Sequence = YrsSequence;

    fn open(&self, room: &RoomId, secret: &str) -> Result<YrsSequence, SequenceError> {
        let doc = Doc::new();
        let array = doc.get_or_insert_array(self.array_name.as_str());
        log::debug!(
            "Opened yrs doc {} for room '{room}' (array '{}')",
            doc.client_id(),
            self.array_name
        );
        Ok(YrsSequence {
            room: room.clone(),
            secret: secret.to_string(),
            doc,
            array,
            closed: false,
        })
    }
}

pub struct YrsSequence {
    room: RoomId,
    secret: String,
    doc: Doc,
    array: ArrayRef,
    closed: bool,
}

impl YrsSequence {
    /// Shared secret the room was opened with, for the transport.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    /// Encoded state vector of the local document.
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Encode everything the peer with `remote_state_vector` is missing.
    pub fn encode_diff(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>, SequenceError> {
        let remote_sv = StateVector::decode_v1(remote_state_vector)
            .map_err(|e| SequenceError::Update(e.to_string()))?;
        let txn = self.doc.transact();
        Ok(txn.encode_diff_v1(&remote_sv))
    }

    /// Integrate an update produced by a peer. Observers see the
    /// resulting delta like any local change.
    pub fn apply_update(&self, update: &[u8]) -> Result<(), SequenceError> {
        self.ensure_open()?;
        let update =
            Update::decode_v1(update).map_err(|e| SequenceError::Update(e.to_string()))?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| SequenceError::Update(e.to_string()))
    }

    /// Current contents, decoded.
    pub fn events(&self) -> Result<Vec<Event>, ProtocolError> {
        let txn = self.doc.transact();
        self.array.iter(&txn).map(|value| event_from_out(&value)).collect()
    }

    fn ensure_open(&self) -> Result<(), SequenceError> {
        if self.closed {
            Err(SequenceError::Closed)
        } else {
            Ok(())
        }
    }
}

impl ReplicatedSequence for YrsSequence {
    fn room(&self) -> &RoomId {
        &self.room
    }

    fn len(&self) -> usize {
        let txn = self.doc.transact();
        self.array.len(&txn) as usize
    }

    fn append(&self, events: &[Event]) -> Result<(), SequenceError> {
        self.ensure_open()?;
        if events.is_empty() {
            return Ok(());
        }
        let mut txn = self.doc.transact_mut();
        let len = self.array.len(&txn);
        self.array
            .insert_range(&mut txn, len, events.iter().map(event_to_any));
        Ok(())
    }

    fn delete_at(&self, index: usize, count: usize) -> Result<(), SequenceError> {
        self.ensure_open()?;
        let mut txn = self.doc.transact_mut();
        let len = self.array.len(&txn) as usize;
        if index.checked_add(count).map_or(true, |end| end > len) {
            return Err(SequenceError::OutOfRange { index, count, len });
        }
        if count > 0 {
            self.array.remove_range(&mut txn, index as u32, count as u32);
        }
        Ok(())
    }

    fn subscribe(&self, on_delta: DeltaCallback) -> Result<Subscription, SequenceError> {
        self.ensure_open()?;
        let sub = self.array.observe(move |txn, event| {
            on_delta(delta_from_changes(event.delta(txn)));
        });
        Ok(Subscription::new(sub))
    }

    fn close(&mut self) {
        if !self.closed {
            log::debug!("Closing yrs sequence for room '{}'", self.room);
        }
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl std::fmt::Debug for YrsSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YrsSequence")
            .field("room", &self.room)
            .field("client_id", &self.doc.client_id())
            .field("closed", &self.closed)
            .finish()
    }
}

// ---------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------

fn event_to_any(event: &Event) -> Any {
    let mut fields = HashMap::new();
    fields.insert("type".to_string(), Any::from(event.kind().as_str().to_string()));
    fields.insert("user".to_string(), Any::from(event.user().to_string()));
    if let Some(content) = event.content() {
        fields.insert("content".to_string(), Any::from(content.to_string()));
    }
    Any::Map(Arc::new(fields))
}

fn delta_from_changes(changes: &[Change]) -> Result<Delta, ProtocolError> {
    changes
        .iter()
        .map(|change| match change {
            Change::Retain(n) => Ok(DeltaOp::Retain(*n as usize)),
            Change::Removed(n) => Ok(DeltaOp::Delete(*n as usize)),
            Change::Added(values) => values
                .iter()
                .map(event_from_out)
                .collect::<Result<Vec<_>, _>>()
                .map(DeltaOp::Insert),
        })
        .collect()
}

fn event_from_out(value: &Out) -> Result<Event, ProtocolError> {
    match value {
        Out::Any(any) => event_from_any(any),
        _ => Err(ProtocolError::InvalidEvent(
            "expected a stored map, got a shared type".into(),
        )),
    }
}

fn event_from_any(value: &Any) -> Result<Event, ProtocolError> {
    let Any::Map(fields) = value else {
        return Err(ProtocolError::InvalidEvent(format!(
            "expected a stored map, got {value}"
        )));
    };
    Event::from_fields(
        text_field(fields, "type")?,
        text_field(fields, "user")?,
        text_field(fields, "content")?,
    )
}

fn text_field<'a>(
    fields: &'a HashMap<String, Any>,
    key: &str,
) -> Result<Option<&'a str>, ProtocolError> {
    match fields.get(key) {
        None | Some(Any::Null) | Some(Any::Undefined) => Ok(None),
        Some(Any::String(s)) => Ok(Some(s.as_ref())),
        Some(other) => Err(ProtocolError::InvalidEvent(format!(
            "field '{key}' must be a string, got {other}"
        ))),
    }
}
