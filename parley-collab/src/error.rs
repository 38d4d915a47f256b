use parley_core::ProtocolError;
use thiserror::Error;

use crate::sequence::SequenceError;

/// Errors returned by [`crate::Session`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session is already connected")]
    AlreadyConnected,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Presentation is already mounted")]
    AlreadyMounted,

    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Sequence error: {0}")]
    Sequence(#[from] SequenceError),
}
