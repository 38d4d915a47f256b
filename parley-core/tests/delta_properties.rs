//! Property-based tests for the delta interpreter.
//!
//! A plain `Vec<Event>` plays the replicated sequence. Random well-formed
//! deltas are generated against its current length, applied to both, and
//! the view must match the model after every step.

use parley_core::{Delta, DeltaInterpreter, DeltaOp, Event, ViewList};
use proptest::prelude::*;

/// Abstract edit, resolved against the model's length when applied.
#[derive(Debug, Clone)]
enum Edit {
    Insert { at: usize, users: Vec<u8> },
    Delete { at: usize, len: usize },
    Replace { at: usize, user: u8 },
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (any::<usize>(), prop::collection::vec(any::<u8>(), 1..4))
            .prop_map(|(at, users)| Edit::Insert { at, users }),
        2 => (any::<usize>(), 1usize..4).prop_map(|(at, len)| Edit::Delete { at, len }),
        1 => (any::<usize>(), any::<u8>()).prop_map(|(at, user)| Edit::Replace { at, user }),
    ]
}

/// Turn an edit into a delta valid for `model`, and apply it to the model.
fn realize(edit: &Edit, model: &mut Vec<Event>, serial: &mut u32) -> Option<Delta> {
    let mut next_event = |user: u8| {
        *serial += 1;
        Event::message(format!("u{user}"), format!("m{serial}"))
    };

    match edit {
        Edit::Insert { at, users } => {
            let at = at % (model.len() + 1);
            let events: Vec<Event> = users.iter().map(|u| next_event(*u)).collect();
            model.splice(at..at, events.clone());
            Some(Delta::new().retain(at).insert(events))
        }
        Edit::Delete { at, len } => {
            if model.is_empty() {
                return None;
            }
            let at = at % model.len();
            let len = (*len).min(model.len() - at);
            model.drain(at..at + len);
            Some(Delta::new().retain(at).delete(len))
        }
        Edit::Replace { at, user } => {
            if model.is_empty() {
                return None;
            }
            let at = at % model.len();
            let event = next_event(*user);
            model[at] = event.clone();
            Some(Delta::new().retain(at).delete(1).insert([event]))
        }
    }
}

proptest! {
    #[test]
    fn prop_view_tracks_sequence(edits in prop::collection::vec(edit_strategy(), 0..60)) {
        let mut interpreter = DeltaInterpreter::new();
        let mut view = ViewList::for_user("u0");
        let mut model: Vec<Event> = Vec::new();
        let mut serial = 0u32;
        let (mut inserted, mut deleted) = (0usize, 0usize);

        for edit in &edits {
            let Some(delta) = realize(edit, &mut model, &mut serial) else { continue };
            inserted += delta.inserted_len();
            deleted += delta.deleted_len();

            interpreter.apply(&mut view, &delta).unwrap();

            prop_assert_eq!(view.len(), inserted - deleted);
            prop_assert_eq!(view.len(), model.len());
            prop_assert_eq!(view.events(), model.clone());
        }
    }

    #[test]
    fn prop_handles_stay_unique(edits in prop::collection::vec(edit_strategy(), 0..60)) {
        let mut interpreter = DeltaInterpreter::new();
        let mut view = ViewList::new();
        let mut model: Vec<Event> = Vec::new();
        let mut serial = 0u32;

        for edit in &edits {
            let Some(delta) = realize(edit, &mut model, &mut serial) else { continue };
            interpreter.apply(&mut view, &delta).unwrap();

            let mut handles = view.handles();
            handles.sort();
            handles.dedup();
            prop_assert_eq!(handles.len(), view.len());
        }
    }

    #[test]
    fn prop_overrun_never_mutates(len in 0usize..8, extra in 1usize..5, delete in any::<bool>()) {
        let mut interpreter = DeltaInterpreter::new();
        let mut view = ViewList::new();
        let seed: Vec<Event> = (0..len).map(|i| Event::join(format!("u{i}"))).collect();
        if !seed.is_empty() {
            interpreter.apply(&mut view, &Delta::new().insert(seed)).unwrap();
        }
        let before = view.handles();

        let op = if delete { DeltaOp::Delete(len + extra) } else { DeltaOp::Retain(len + extra) };
        let delta = Delta::from_ops(vec![DeltaOp::Insert(vec![Event::join("x")]), DeltaOp::Retain(len), op]);
        // One element inserted ahead of the cursor; retaining `len` lands at the end.
        prop_assert!(interpreter.apply(&mut view, &delta).is_err());
        prop_assert_eq!(view.handles(), before);
    }
}
