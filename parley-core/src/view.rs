//! Local projection of the replicated log.
//!
//! The [`ViewList`] holds one [`RenderedUnit`] per live event, index-aligned
//! with the shared sequence once a delta has been fully applied. Units are
//! addressed by [`HandleId`], an arena key that is never reused, so UI code
//! can keep a handle across remote edits and ask for its *current*
//! position when it needs one.

use crate::event::Event;

/// Stable identity of one rendered unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a unit looks like to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Neutral join/leave line.
    Announcement,
    /// A chat message.
    Message,
}

/// Retraction affordance state of a self-authored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Armed,
}

/// One rendered unit, owned by exactly one handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedUnit {
    handle: HandleId,
    event: Event,
    kind: UnitKind,
    text: String,
    self_authored: bool,
    state: InteractionState,
}

impl RenderedUnit {
    /// Convert an event into its unit.
    ///
    /// Messages whose author is `local_user` are tagged self-authored and
    /// become interactive.
    pub fn render(handle: HandleId, event: Event, local_user: Option<&str>) -> Self {
        let (kind, text, self_authored) = match &event {
            Event::Join { user } => (
                UnitKind::Announcement,
                format!("Welcome! {user} has joined the room."),
                false,
            ),
            Event::Leave { user } => (
                UnitKind::Announcement,
                format!("Bye bye! {user} has left the room."),
                false,
            ),
            Event::Message { user, content } => (
                UnitKind::Message,
                format!("{user}: {content}"),
                local_user == Some(user.as_str()),
            ),
        };

        Self {
            handle,
            event,
            kind,
            text,
            self_authored,
            state: InteractionState::Idle,
        }
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_self_authored(&self) -> bool {
        self.self_authored
    }

    /// Only self-authored messages react to pointer input.
    pub fn is_interactive(&self) -> bool {
        self.self_authored
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }
}

/// Notification fired once per insertion or removal batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewMutation {
    Inserted {
        position: usize,
        units: Vec<RenderedUnit>,
    },
    Removed {
        position: usize,
        handles: Vec<HandleId>,
    },
}

/// Presentation layer hook.
pub trait ViewObserver: Send {
    fn on_view_mutated(&mut self, mutation: &ViewMutation);

    /// Idle/armed transitions of a self-authored unit.
    fn on_unit_state(&mut self, _handle: HandleId, _state: InteractionState) {}
}

/// Ordered, index-addressable list of rendered units.
#[derive(Debug, Default)]
pub struct ViewList {
    units: Vec<RenderedUnit>,
    next_handle: u64,
    local_user: Option<String>,
}

impl ViewList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a view that tags `local_user`'s messages as self-authored.
    pub fn for_user(local_user: impl Into<String>) -> Self {
        Self {
            local_user: Some(local_user.into()),
            ..Self::default()
        }
    }

    pub fn local_user(&self) -> Option<&str> {
        self.local_user.as_deref()
    }

    pub fn set_local_user(&mut self, local_user: Option<String>) {
        self.local_user = local_user;
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&RenderedUnit> {
        self.units.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderedUnit> {
        self.units.iter()
    }

    pub fn handles(&self) -> Vec<HandleId> {
        self.units.iter().map(RenderedUnit::handle).collect()
    }

    /// Logical contents, in order.
    pub fn events(&self) -> Vec<Event> {
        self.units.iter().map(|u| u.event.clone()).collect()
    }

    /// Current position of `handle`, found by scanning the list.
    ///
    /// Positions shift under concurrent edits; never cache the result
    /// across a delta.
    pub fn position_of(&self, handle: HandleId) -> Option<usize> {
        self.units.iter().position(|u| u.handle == handle)
    }

    pub fn unit(&self, handle: HandleId) -> Option<&RenderedUnit> {
        self.units.iter().find(|u| u.handle == handle)
    }

    /// Mint a fresh handle and render `event` into it.
    pub fn mint(&mut self, event: Event) -> RenderedUnit {
        let handle = HandleId(self.next_handle);
        self.next_handle += 1;
        RenderedUnit::render(handle, event, self.local_user.as_deref())
    }

    /// Release every unit. Handles are not reused afterwards.
    pub fn clear(&mut self) -> Vec<HandleId> {
        self.units.drain(..).map(|u| u.handle).collect()
    }

    pub(crate) fn append(&mut self, units: Vec<RenderedUnit>) {
        self.units.extend(units);
    }

    /// Insert before the unit currently at `position`.
    pub(crate) fn splice_before(&mut self, position: usize, units: Vec<RenderedUnit>) {
        self.units.splice(position..position, units);
    }

    pub(crate) fn remove_range(&mut self, position: usize, count: usize) -> Vec<RenderedUnit> {
        self.units.drain(position..position + count).collect()
    }

    /// Pointer entered a unit: arm it if it is interactive.
    ///
    /// Returns `true` when the state actually changed.
    pub fn arm(&mut self, handle: HandleId) -> bool {
        self.transition(handle, InteractionState::Armed)
    }

    /// Pointer left a unit: back to idle, disarming the confirm action.
    pub fn disarm(&mut self, handle: HandleId) -> bool {
        self.transition(handle, InteractionState::Idle)
    }

    fn transition(&mut self, handle: HandleId, next: InteractionState) -> bool {
        match self.units.iter_mut().find(|u| u.handle == handle) {
            Some(unit) if unit.is_interactive() && unit.state != next => {
                unit.state = next;
                true
            }
            _ => false,
        }
    }

    /// Position to retract for a confirmed action on `handle`.
    ///
    /// `None` unless the unit exists, is self-authored and armed. The first
    /// match in current order wins.
    pub fn retract_target(&self, handle: HandleId) -> Option<usize> {
        self.units.iter().position(|u| {
            u.handle == handle && u.is_interactive() && u.state == InteractionState::Armed
        })
    }
}
