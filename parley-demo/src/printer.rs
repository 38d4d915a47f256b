//! Prints view mutations to stdout as they happen.

use parley_core::{HandleId, InteractionState, UnitKind, ViewMutation, ViewObserver};

#[derive(Debug, Default)]
pub struct Printer;

impl ViewObserver for Printer {
    fn on_view_mutated(&mut self, mutation: &ViewMutation) {
        match mutation {
            ViewMutation::Inserted { position, units } => {
                for (offset, unit) in units.iter().enumerate() {
                    let marker = match (unit.kind(), unit.is_self_authored()) {
                        (UnitKind::Announcement, _) => '~',
                        (UnitKind::Message, true) => '*',
                        (UnitKind::Message, false) => ' ',
                    };
                    println!("+ {:>3} {marker} {}", position + offset, unit.text());
                }
            }
            ViewMutation::Removed { position, handles } => {
                println!("- {position:>3}   ({} removed)", handles.len());
            }
        }
    }

    fn on_unit_state(&mut self, handle: HandleId, state: InteractionState) {
        match state {
            InteractionState::Armed => println!("  {handle} armed: click to delete"),
            InteractionState::Idle => println!("  {handle} idle"),
        }
    }
}
