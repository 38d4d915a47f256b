//! # parley-core — Delta reconciliation for replicated room chat
//!
//! Keeps a locally rendered, order-sensitive list of chat events in exact
//! correspondence with a replicated sequence owned by a CRDT engine.
//!
//! ## Architecture
//!
//! ```text
//!  engine change stream
//!        │  Delta (retain / insert / delete)
//!        ▼
//!  ┌─────────────┐     ┌──────────────────┐     ┌────────────┐
//!  │ Reconciler  │ ──▸ │ DeltaInterpreter │ ──▸ │  ViewList  │
//!  │ (fault latch│     │ (cursor, 2-phase)│     │ (handles)  │
//!  └──────┬──────┘     └──────────────────┘     └────────────┘
//!         │ ViewMutation batches
//!         ▼
//!   ViewObserver (presentation)
//! ```
//!
//! ## Modules
//!
//! - [`event`] — join / leave / message records and their stored map shape
//! - [`delta`] — delta operations and Yjs JSON delta decoding
//! - [`view`] — view list, handles, rendered units, retraction affordance
//! - [`interpreter`] — cursor-driven delta interpreter
//! - [`reconciler`] — change-stream sink with observer and fault latch

pub mod delta;
pub mod error;
pub mod event;
pub mod interpreter;
pub mod reconciler;
pub mod view;

pub use delta::{Delta, DeltaOp};
pub use error::ProtocolError;
pub use event::{Event, EventKind};
pub use interpreter::{Applied, ApplyReport, DeltaInterpreter};
pub use reconciler::{Generation, Reconciler};
pub use view::{
    HandleId, InteractionState, RenderedUnit, UnitKind, ViewList, ViewMutation, ViewObserver,
};
