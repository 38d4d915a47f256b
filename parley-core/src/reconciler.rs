//! Change-stream sink that keeps one [`ViewList`] in step with the log.
//!
//! The reconciler is what an engine callback talks to. It owns the view,
//! the interpreter and the mounted observer, and latches the first
//! protocol violation: after a fault every later delta is dropped so the
//! view stays frozen at its last consistent contents.

use crate::delta::Delta;
use crate::error::ProtocolError;
use crate::event::Event;
use crate::interpreter::{ApplyReport, DeltaInterpreter};
use crate::view::{HandleId, InteractionState, RenderedUnit, ViewList, ViewMutation, ViewObserver};

/// Identifies which session a callback was registered for.
pub type Generation = u64;

#[derive(Default)]
pub struct Reconciler {
    view: ViewList,
    interpreter: DeltaInterpreter,
    observer: Option<Box<dyn ViewObserver>>,
    fault: Option<ProtocolError>,
    generation: Generation,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mounted(&self) -> bool {
        self.observer.is_some()
    }

    /// Attach the presentation observer. Returns `false` if one is
    /// already attached; the existing observer is kept.
    pub fn mount(&mut self, observer: Box<dyn ViewObserver>) -> bool {
        if self.observer.is_some() {
            return false;
        }
        self.observer = Some(observer);
        true
    }

    /// Start a new session: release every unit, adopt `local_user` and
    /// clear any latched fault.
    ///
    /// Returns the generation callbacks of the new session must carry.
    pub fn reset(&mut self, local_user: &str) -> Generation {
        let released = self.view.clear();
        if !released.is_empty() {
            self.notify(&ViewMutation::Removed {
                position: 0,
                handles: released,
            });
        }
        self.view.set_local_user(Some(local_user.to_string()));
        self.fault = None;
        self.generation += 1;
        self.generation
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Feed one change-stream item.
    ///
    /// Items from a previous generation, or arriving after a fault, are
    /// dropped and yield `Ok(None)`.
    pub fn receive(
        &mut self,
        generation: Generation,
        delta: Result<Delta, ProtocolError>,
    ) -> Result<Option<ApplyReport>, ProtocolError> {
        if generation != self.generation {
            log::debug!(
                "Dropping delta from stale generation {generation} (current {})",
                self.generation
            );
            return Ok(None);
        }
        if self.fault.is_some() {
            log::debug!("Dropping delta: view is faulted");
            return Ok(None);
        }

        match delta.and_then(|delta| self.interpreter.apply(&mut self.view, &delta)) {
            Ok(applied) => {
                for mutation in &applied.mutations {
                    self.notify(mutation);
                }
                Ok(Some(applied.report))
            }
            Err(e) => {
                log::error!("Protocol violation, halting view reconciliation: {e}");
                self.fault = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Apply a delta to the current generation.
    pub fn apply(&mut self, delta: Delta) -> Result<Option<ApplyReport>, ProtocolError> {
        self.receive(self.generation, Ok(delta))
    }

    /// First protocol violation seen by the current session.
    pub fn fault(&self) -> Option<&ProtocolError> {
        self.fault.as_ref()
    }

    pub fn view(&self) -> &ViewList {
        &self.view
    }

    pub fn interpreter(&self) -> &DeltaInterpreter {
        &self.interpreter
    }

    pub fn transcript(&self) -> Vec<Event> {
        self.view.events()
    }

    pub fn units(&self) -> Vec<RenderedUnit> {
        self.view.iter().cloned().collect()
    }

    pub fn arm(&mut self, handle: HandleId) -> bool {
        let changed = self.view.arm(handle);
        if changed {
            self.notify_state(handle, InteractionState::Armed);
        }
        changed
    }

    pub fn disarm(&mut self, handle: HandleId) -> bool {
        let changed = self.view.disarm(handle);
        if changed {
            self.notify_state(handle, InteractionState::Idle);
        }
        changed
    }

    pub fn retract_target(&self, handle: HandleId) -> Option<usize> {
        self.view.retract_target(handle)
    }

    fn notify(&mut self, mutation: &ViewMutation) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_view_mutated(mutation);
        }
    }

    fn notify_state(&mut self, handle: HandleId, state: InteractionState) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_unit_state(handle, state);
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("view", &self.view)
            .field("mounted", &self.observer.is_some())
            .field("fault", &self.fault)
            .field("generation", &self.generation)
            .finish()
    }
}
