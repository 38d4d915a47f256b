//! # parley-collab — Room sessions over a replicated sequence
//!
//! Binds the `parley-core` reconciler to a replicated-sequence engine and
//! drives the room lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   append / delete_at   ┌────────────────────┐
//! │   Session   │ ─────────────────────▸ │ ReplicatedSequence │
//! │ (per user)  │                        │ (yrs or in-memory) │
//! └──────┬──────┘                        └─────────┬──────────┘
//!        │ owns                                    │ change stream
//!        ▼                                         ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          Arc<Mutex<Reconciler>>  (view + fault)         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`sequence`] — Engine capability traits
//! - [`yrs_engine`] — `yrs`-backed engine with update exchange
//! - [`memory`] — In-memory engine with remote injection
//! - [`session`] — Connect / ready / disconnect state machine
//! - [`config`] — Session configuration

pub mod config;
pub mod error;
pub mod memory;
pub mod sequence;
pub mod session;
pub mod yrs_engine;

pub use config::SessionConfig;
pub use error::SessionError;
pub use memory::{MemoryEngine, MemorySequence, SequenceRequest};
pub use sequence::{
    DeltaCallback, ReplicatedSequence, RoomId, SequenceEngine, SequenceError, Subscription,
};
pub use session::{Banner, ConnectionState, InputState, Session};
pub use yrs_engine::{YrsEngine, YrsSequence, DEFAULT_ARRAY_NAME};
