//! Room session lifecycle.
//!
//! ```text
//!                connect                 join delay elapsed
//! Disconnected ─────────▸ Connecting ───────────────────────▸ Connected
//!      ▴                      │                                   │
//!      └──────────────────────┴──────────── disconnect ◂──────────┘
//! ```
//!
//! A session owns the open sequence and its subscription. The view lives
//! behind a shared [`Reconciler`] so the engine callback can reach it; the
//! session never holds that lock while calling into the engine, because
//! engine calls deliver their own deltas synchronously.

use std::sync::{Arc, Mutex, MutexGuard};

use parley_core::{Event, HandleId, ProtocolError, Reconciler, RenderedUnit, ViewObserver};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::sequence::{ReplicatedSequence, RoomId, SequenceEngine, Subscription};

/// Session connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// State of the message input control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Disabled,
    Enabled,
}

impl InputState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, InputState::Enabled)
    }

    pub fn placeholder(&self) -> &'static str {
        match self {
            InputState::Disabled => "Connect to a room first!",
            InputState::Enabled => "Send a message...",
        }
    }
}

/// Header shown above the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    None,
    Connecting,
    Welcome { user: String, room: String },
}

impl std::fmt::Display for Banner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Banner::None => Ok(()),
            Banner::Connecting => f.write_str("Connecting..."),
            Banner::Welcome { user, room } => {
                write!(f, "Hello, {user}! You are in room {room}.")
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Identity {
    user: String,
    room: RoomId,
    session_id: Uuid,
}

/// Join announcement scheduled by `connect`.
#[derive(Debug, Clone, Copy)]
struct PendingJoin {
    deadline: Instant,
}

fn lock(reconciler: &Mutex<Reconciler>) -> MutexGuard<'_, Reconciler> {
    reconciler.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct Session<E: SequenceEngine> {
    engine: E,
    config: SessionConfig,
    state: ConnectionState,
    identity: Option<Identity>,
    sequence: Option<E::Sequence>,
    subscription: Option<Subscription>,
    pending_join: Option<PendingJoin>,
    reconciler: Arc<Mutex<Reconciler>>,
    ever_started: bool,
}

impl<E: SequenceEngine> Session<E> {
    pub fn new(engine: E, config: SessionConfig) -> Self {
        Self {
            engine,
            config,
            state: ConnectionState::Disconnected,
            identity: None,
            sequence: None,
            subscription: None,
            pending_join: None,
            reconciler: Arc::new(Mutex::new(Reconciler::new())),
            ever_started: false,
        }
    }

    /// Attach the presentation observer. Only one may ever be attached.
    pub fn mount(&mut self, observer: Box<dyn ViewObserver>) -> Result<(), SessionError> {
        if lock(&self.reconciler).mount(observer) {
            Ok(())
        } else {
            log::warn!("Rejected mount: presentation already attached");
            Err(SessionError::AlreadyMounted)
        }
    }

    /// Open `room` as `user` and start reconciling its log.
    ///
    /// The join announcement is scheduled `join_delay` later; see
    /// [`Session::poll_ready`] and [`Session::ready`].
    pub fn connect(&mut self, user: &str, room: &str, password: &str) -> Result<(), SessionError> {
        if self.state != ConnectionState::Disconnected {
            log::warn!("Rejected connect to '{room}': session is {:?}", self.state);
            return Err(SessionError::AlreadyConnected);
        }

        let room = RoomId::new(room);
        let mut sequence = self.engine.open(&room, password)?;

        // Subscribe before `reset`, under the generation it will hand out.
        let generation = lock(&self.reconciler).generation() + 1;
        let sink = Arc::clone(&self.reconciler);
        let subscription = match sequence.subscribe(Box::new(move |delta| {
            // Violations are latched and logged by the reconciler.
            let _ = lock(&sink).receive(generation, delta);
        })) {
            Ok(subscription) => subscription,
            Err(e) => {
                log::warn!("Subscribing to room '{room}' failed: {e}");
                sequence.close();
                return Err(e.into());
            }
        };
        lock(&self.reconciler).reset(user);

        let identity = Identity {
            user: user.to_string(),
            room,
            session_id: Uuid::new_v4(),
        };
        log::info!(
            "Connecting to room '{}' as '{}' (session {})",
            identity.room,
            identity.user,
            identity.session_id
        );

        self.sequence = Some(sequence);
        self.subscription = Some(subscription);
        self.identity = Some(identity);
        self.pending_join = Some(PendingJoin {
            deadline: Instant::now() + self.config.join_delay,
        });
        self.state = ConnectionState::Connecting;
        self.ever_started = true;
        Ok(())
    }

    /// When the pending join announcement is due, if one is scheduled.
    pub fn ready_deadline(&self) -> Option<Instant> {
        self.pending_join.map(|pending| pending.deadline)
    }

    /// Fire the join announcement if its deadline has passed at `now`.
    ///
    /// Returns `true` when the session transitioned to `Connected`.
    pub fn poll_ready(&mut self, now: Instant) -> Result<bool, SessionError> {
        let Some(pending) = self.pending_join else {
            return Ok(false);
        };
        if now < pending.deadline {
            return Ok(false);
        }
        self.pending_join = None;
        self.ensure_healthy()?;

        let (sequence, identity) = self.active()?;
        sequence.append(&[Event::join(identity.user.as_str())])?;
        log::info!(
            "Joined room '{}' as '{}'",
            identity.room,
            identity.user
        );
        self.state = ConnectionState::Connected;
        Ok(true)
    }

    /// Wait for the join delay, then announce the join.
    ///
    /// Dropping the future leaves the announcement pending.
    pub async fn ready(&mut self) -> Result<bool, SessionError> {
        let Some(deadline) = self.ready_deadline() else {
            return Ok(false);
        };
        tokio::time::sleep_until(deadline).await;
        self.poll_ready(Instant::now())
    }

    /// Announce the leave and tear the session down.
    ///
    /// The final transcript stays readable until the next `connect`.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.state == ConnectionState::Disconnected {
            log::warn!("Rejected disconnect: session is not connected");
            return Err(SessionError::NotConnected);
        }

        if self.pending_join.take().is_some() {
            log::debug!("Cancelled pending join announcement");
        }

        let identity = self.identity.take();
        if let (Some(sequence), Some(identity)) = (self.sequence.as_ref(), identity.as_ref()) {
            if let Err(e) = sequence.append(&[Event::leave(identity.user.as_str())]) {
                log::warn!("Failed to announce leave for '{}': {e}", identity.user);
            }
        }

        self.subscription = None;
        if let Some(mut sequence) = self.sequence.take() {
            sequence.close();
        }
        self.state = ConnectionState::Disconnected;

        if let Some(identity) = identity {
            log::info!(
                "Left room '{}' (session {})",
                identity.room,
                identity.session_id
            );
        }
        Ok(())
    }

    /// Submit the input box. Empty text is ignored and yields `false`.
    pub fn send_message(&mut self, text: &str) -> Result<bool, SessionError> {
        if self.state == ConnectionState::Disconnected {
            return Err(SessionError::NotConnected);
        }
        if text.is_empty() {
            return Ok(false);
        }
        self.ensure_healthy()?;

        let (sequence, identity) = self.active()?;
        sequence.append(&[Event::message(identity.user.as_str(), text)])?;
        Ok(true)
    }

    pub fn pointer_enter(&mut self, handle: HandleId) -> bool {
        let armed = lock(&self.reconciler).arm(handle);
        if !armed {
            log::debug!("Ignored pointer enter on {handle}");
        }
        armed
    }

    pub fn pointer_leave(&mut self, handle: HandleId) -> bool {
        lock(&self.reconciler).disarm(handle)
    }

    /// Retract the armed self-authored message behind `handle`.
    ///
    /// The position is resolved from the current view at the moment of
    /// the call. Returns the retracted index, or `None` when the handle is
    /// gone, idle, or not retractable.
    pub fn confirm_retract(&mut self, handle: HandleId) -> Result<Option<usize>, SessionError> {
        if self.state == ConnectionState::Disconnected {
            return Err(SessionError::NotConnected);
        }
        self.ensure_healthy()?;

        let target = lock(&self.reconciler).retract_target(handle);
        let Some(index) = target else {
            log::warn!("Ignored retraction of {handle}: not an armed message of ours");
            return Ok(None);
        };

        let (sequence, _) = self.active()?;
        sequence.delete_at(index, 1)?;
        log::debug!("Retracted {handle} at position {index}");
        Ok(Some(index))
    }

    /// Logical contents of the view, if a session was ever started.
    pub fn transcript(&self) -> Option<Vec<Event>> {
        self.ever_started
            .then(|| lock(&self.reconciler).transcript())
    }

    pub fn units(&self) -> Vec<RenderedUnit> {
        lock(&self.reconciler).units()
    }

    /// The protocol violation that halted the view, if any.
    pub fn fault(&self) -> Option<ProtocolError> {
        lock(&self.reconciler).fault().cloned()
    }

    /// Lifetime (deltas applied, operations processed) of the interpreter.
    pub fn interpreter_stats(&self) -> (u64, u64) {
        let reconciler = lock(&self.reconciler);
        (
            reconciler.interpreter().deltas_applied(),
            reconciler.interpreter().ops_processed(),
        )
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn input(&self) -> InputState {
        match self.state {
            ConnectionState::Disconnected => InputState::Disabled,
            ConnectionState::Connecting | ConnectionState::Connected => InputState::Enabled,
        }
    }

    pub fn banner(&self) -> Banner {
        match (&self.state, &self.identity) {
            (ConnectionState::Connected, Some(identity)) => Banner::Welcome {
                user: identity.user.clone(),
                room: identity.room.to_string(),
            },
            (ConnectionState::Connecting, _) => Banner::Connecting,
            _ => Banner::None,
        }
    }

    pub fn user(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.user.as_str())
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.identity.as_ref().map(|i| &i.room)
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.identity.as_ref().map(|i| i.session_id)
    }

    pub fn sequence(&self) -> Option<&E::Sequence> {
        self.sequence.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn ensure_healthy(&self) -> Result<(), SessionError> {
        match self.fault() {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }

    fn active(&self) -> Result<(&E::Sequence, &Identity), SessionError> {
        match (self.sequence.as_ref(), self.identity.as_ref()) {
            (Some(sequence), Some(identity)) => Ok((sequence, identity)),
            _ => Err(SessionError::NotConnected),
        }
    }
}
