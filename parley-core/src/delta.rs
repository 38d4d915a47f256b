//! Change descriptions emitted by the replicated sequence.
//!
//! A [`Delta`] is read left to right against a cursor starting at 0:
//! `Retain` and `Delete` consume existing elements, `Insert` produces new
//! ones. Engines that speak the Yjs JSON delta shape can be decoded with
//! [`Delta::from_json`]:
//!
//! ```text
//! [ { "retain": 1 }, { "insert": [ {"type": "join", "user": "ana"} ] }, { "delete": 2 } ]
//! ```

use serde_json::Value;

use crate::error::ProtocolError;
use crate::event::Event;

/// One operation of a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOp {
    /// Skip `n` elements unchanged.
    Retain(usize),
    /// Place new events at the cursor, in order.
    Insert(Vec<Event>),
    /// Remove `n` consecutive elements at the cursor.
    Delete(usize),
}

impl DeltaOp {
    pub fn name(&self) -> &'static str {
        match self {
            DeltaOp::Retain(_) => "retain",
            DeltaOp::Insert(_) => "insert",
            DeltaOp::Delete(_) => "delete",
        }
    }

    /// Decode one element of a Yjs JSON delta.
    pub fn from_json(value: &Value) -> Result<Self, ProtocolError> {
        let fields = value.as_object().ok_or_else(|| {
            ProtocolError::MalformedDelta(format!("operation must be an object, got {value}"))
        })?;

        let mut entries = fields.iter();
        let (tag, body) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(ProtocolError::MalformedDelta(format!(
                    "operation must carry exactly one tag, got {value}"
                )))
            }
        };

        match tag.as_str() {
            "retain" => Ok(DeltaOp::Retain(count(tag, body)?)),
            "delete" => Ok(DeltaOp::Delete(count(tag, body)?)),
            "insert" => {
                let items = body.as_array().ok_or_else(|| {
                    ProtocolError::MalformedDelta(format!("insert payload must be an array, got {body}"))
                })?;
                let events = items
                    .iter()
                    .map(Event::from_json)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DeltaOp::Insert(events))
            }
            other => Err(ProtocolError::MalformedDelta(format!("unknown operation tag '{other}'"))),
        }
    }
}

fn count(tag: &str, body: &Value) -> Result<usize, ProtocolError> {
    body.as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            ProtocolError::MalformedDelta(format!("{tag} expects a non-negative integer, got {body}"))
        })
}

/// Ordered operations transforming the previous contents into the new ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    ops: Vec<DeltaOp>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ops(ops: Vec<DeltaOp>) -> Self {
        Self { ops }
    }

    pub fn retain(mut self, n: usize) -> Self {
        self.ops.push(DeltaOp::Retain(n));
        self
    }

    pub fn insert(mut self, events: impl IntoIterator<Item = Event>) -> Self {
        self.ops.push(DeltaOp::Insert(events.into_iter().collect()));
        self
    }

    pub fn delete(mut self, n: usize) -> Self {
        self.ops.push(DeltaOp::Delete(n));
        self
    }

    pub fn ops(&self) -> &[DeltaOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of elements this delta produces.
    pub fn inserted_len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::Insert(events) => events.len(),
                _ => 0,
            })
            .sum()
    }

    /// Number of elements this delta removes.
    pub fn deleted_len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::Delete(n) => *n,
                _ => 0,
            })
            .sum()
    }

    /// Decode a Yjs JSON delta (an array of single-tag objects).
    pub fn from_json(value: &Value) -> Result<Self, ProtocolError> {
        let items = value.as_array().ok_or_else(|| {
            ProtocolError::MalformedDelta(format!("delta must be an array, got {value}"))
        })?;
        items.iter().map(DeltaOp::from_json).collect()
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ProtocolError::MalformedDelta(format!("invalid JSON: {e}")))?;
        Self::from_json(&value)
    }
}

impl FromIterator<DeltaOp> for Delta {
    fn from_iter<T: IntoIterator<Item = DeltaOp>>(iter: T) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Delta {
    type Item = DeltaOp;
    type IntoIter = std::vec::IntoIter<DeltaOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_and_sizes() {
        let delta = Delta::new()
            .retain(2)
            .insert([Event::join("a"), Event::join("b")])
            .delete(1);
        assert_eq!(delta.ops().len(), 3);
        assert_eq!(delta.inserted_len(), 2);
        assert_eq!(delta.deleted_len(), 1);
    }

    #[test]
    fn test_from_json_yjs_shape() {
        let delta = Delta::from_json(&json!([
            {"retain": 1},
            {"insert": [{"type": "message", "user": "ana", "content": "hi"}]},
            {"delete": 2}
        ]))
        .unwrap();

        assert_eq!(
            delta.ops(),
            &[
                DeltaOp::Retain(1),
                DeltaOp::Insert(vec![Event::message("ana", "hi")]),
                DeltaOp::Delete(2),
            ]
        );
    }

    #[test]
    fn test_unknown_tag_is_malformed() {
        let err = Delta::from_json(&json!([{"format": 3}])).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedDelta(_)));
    }

    #[test]
    fn test_multi_tag_and_empty_op_are_malformed() {
        assert!(matches!(
            Delta::from_json(&json!([{"retain": 1, "delete": 1}])),
            Err(ProtocolError::MalformedDelta(_))
        ));
        assert!(matches!(
            Delta::from_json(&json!([{}])),
            Err(ProtocolError::MalformedDelta(_))
        ));
    }

    #[test]
    fn test_bad_counts_are_malformed() {
        assert!(Delta::from_json(&json!([{"retain": -1}])).is_err());
        assert!(Delta::from_json(&json!([{"delete": "2"}])).is_err());
        assert!(Delta::from_json(&json!([{"insert": {"type": "join"}}])).is_err());
        assert!(Delta::from_json(&json!({"retain": 1})).is_err());
    }

    #[test]
    fn test_insert_with_unknown_event_kind() {
        let err = Delta::from_json(&json!([{"insert": [{"type": "poke", "user": "x"}]}]))
            .unwrap_err();
        assert_eq!(err, ProtocolError::UnknownEventKind("poke".into()));
    }

    #[test]
    fn test_from_json_str_rejects_garbage() {
        assert!(matches!(
            Delta::from_json_str("not json"),
            Err(ProtocolError::MalformedDelta(_))
        ));
        assert!(Delta::from_json_str("[]").unwrap().is_empty());
    }
}
