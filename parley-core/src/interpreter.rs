//! Delta → View List interpreter
//!
//! Walks a [`Delta`] left to right with a cursor and turns it into
//! [`ViewList`] mutations.
//!
//! ```text
//!  ReplicatedSequence ──Delta──▸ DeltaInterpreter ──▸ ViewList
//!                                      │
//!                                 ViewMutation batches ──▸ ViewObserver
//! ```
//!
//! Application is two-phase: the whole delta is checked against the
//! current length first, then committed. A contract violation therefore
//! leaves the view exactly as it was before the offending delta.

use crate::delta::{Delta, DeltaOp};
use crate::error::ProtocolError;
use crate::event::Event;
use crate::view::{ViewList, ViewMutation};

/// Summary of one applied delta.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// Units added.
    pub inserted: usize,
    /// Units released.
    pub removed: usize,
    /// Positions skipped by retains.
    pub retained: usize,
    /// Mutation batches emitted.
    pub batches: usize,
}

/// Result of [`DeltaInterpreter::apply`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Applied {
    pub report: ApplyReport,
    /// One entry per insertion/removal batch, in application order.
    pub mutations: Vec<ViewMutation>,
}

enum Step<'a> {
    Insert { position: usize, events: &'a [Event] },
    Delete { position: usize, count: usize },
}

/// Cursor-driven, single-pass delta interpreter.
#[derive(Debug, Default)]
pub struct DeltaInterpreter {
    deltas_applied: u64,
    ops_processed: u64,
}

impl DeltaInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deltas successfully applied over the interpreter's lifetime.
    pub fn deltas_applied(&self) -> u64 {
        self.deltas_applied
    }

    /// Operations processed over the interpreter's lifetime.
    pub fn ops_processed(&self) -> u64 {
        self.ops_processed
    }

    /// Apply `delta` to `view`.
    ///
    /// Fails without touching `view` if an insert is empty or a retain or
    /// delete reaches past the end of the list.
    pub fn apply(&mut self, view: &mut ViewList, delta: &Delta) -> Result<Applied, ProtocolError> {
        let (steps, retained) = plan(view.len(), delta)?;

        let mut applied = Applied {
            report: ApplyReport {
                retained,
                ..ApplyReport::default()
            },
            mutations: Vec::with_capacity(steps.len()),
        };

        for step in steps {
            match step {
                Step::Insert { position, events } => {
                    let units: Vec<_> = events.iter().map(|e| view.mint(e.clone())).collect();
                    applied.report.inserted += units.len();
                    if position == view.len() {
                        view.append(units.clone());
                    } else {
                        view.splice_before(position, units.clone());
                    }
                    applied.mutations.push(ViewMutation::Inserted { position, units });
                }
                Step::Delete { position, count } => {
                    let released = view.remove_range(position, count);
                    applied.report.removed += released.len();
                    applied.mutations.push(ViewMutation::Removed {
                        position,
                        handles: released.iter().map(|u| u.handle()).collect(),
                    });
                }
            }
        }

        applied.report.batches = applied.mutations.len();
        self.deltas_applied += 1;
        self.ops_processed += delta.ops().len() as u64;

        log::debug!(
            "Applied delta: +{} -{} ={} ({} batches, view len {})",
            applied.report.inserted,
            applied.report.removed,
            applied.report.retained,
            applied.report.batches,
            view.len()
        );
        Ok(applied)
    }
}

/// Validate `delta` against a list of `len` elements and resolve each
/// mutating op to an absolute position.
fn plan(mut len: usize, delta: &Delta) -> Result<(Vec<Step<'_>>, usize), ProtocolError> {
    let mut steps = Vec::new();
    let mut curr = 0usize;
    let mut retained = 0usize;

    for op in delta.ops() {
        match op {
            DeltaOp::Retain(n) => {
                let n = *n;
                if exceeds(curr, n, len) {
                    return Err(overrun(op, curr, n, len));
                }
                curr += n;
                retained += n;
            }
            DeltaOp::Insert(events) => {
                if events.is_empty() {
                    return Err(ProtocolError::MalformedDelta(format!(
                        "empty insert at position {curr}"
                    )));
                }
                steps.push(Step::Insert {
                    position: curr,
                    events,
                });
                curr += events.len();
                len += events.len();
            }
            DeltaOp::Delete(n) => {
                let n = *n;
                if exceeds(curr, n, len) {
                    return Err(overrun(op, curr, n, len));
                }
                if n > 0 {
                    steps.push(Step::Delete {
                        position: curr,
                        count: n,
                    });
                    len -= n;
                }
            }
        }
    }

    Ok((steps, retained))
}

/// Whether `count` elements from `cursor` reach past `len`. Counts come
/// from the engine and may be arbitrarily large.
fn exceeds(cursor: usize, count: usize, len: usize) -> bool {
    cursor.checked_add(count).map_or(true, |end| end > len)
}

fn overrun(op: &DeltaOp, cursor: usize, count: usize, len: usize) -> ProtocolError {
    ProtocolError::CursorOverrun {
        op: op.name(),
        cursor,
        count,
        len,
    }
}
