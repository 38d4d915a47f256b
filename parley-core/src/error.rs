use thiserror::Error;

/// Contract violations from the replicated-sequence engine.
///
/// Every variant is fatal for the view it was raised against: once a
/// delta cannot be interpreted, the local projection can no longer be
/// trusted to mirror the shared log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed delta: {0}")]
    MalformedDelta(String),

    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Cursor overrun: {op} of {count} at position {cursor} exceeds view length {len}")]
    CursorOverrun {
        op: &'static str,
        cursor: usize,
        count: usize,
        len: usize,
    },
}
