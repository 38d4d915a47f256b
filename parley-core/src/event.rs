//! Room events exchanged through the replicated log.
//!
//! The stored shape is a flat map:
//!
//! ```text
//! { "type": "join" | "leave" | "message", "user": "<id>", "content": "<text>" }
//! ```
//!
//! `content` only exists on messages. Engines decode their stored values
//! through [`Event::from_fields`] so every adapter enforces the same rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Discriminant of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Join,
    Leave,
    Message,
}

impl EventKind {
    /// Tag used in the stored map.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Join => "join",
            EventKind::Leave => "leave",
            EventKind::Message => "message",
        }
    }

    /// Parse a stored tag. Anything but the three known tags is fatal.
    pub fn parse(tag: &str) -> Result<Self, ProtocolError> {
        match tag {
            "join" => Ok(EventKind::Join),
            "leave" => Ok(EventKind::Leave),
            "message" => Ok(EventKind::Message),
            other => Err(ProtocolError::UnknownEventKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable room event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Join { user: String },
    Leave { user: String },
    Message { user: String, content: String },
}

impl Event {
    pub fn join(user: impl Into<String>) -> Self {
        Event::Join { user: user.into() }
    }

    pub fn leave(user: impl Into<String>) -> Self {
        Event::Leave { user: user.into() }
    }

    pub fn message(user: impl Into<String>, content: impl Into<String>) -> Self {
        Event::Message {
            user: user.into(),
            content: content.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Join { .. } => EventKind::Join,
            Event::Leave { .. } => EventKind::Leave,
            Event::Message { .. } => EventKind::Message,
        }
    }

    /// Identifier of the originating participant.
    pub fn user(&self) -> &str {
        match self {
            Event::Join { user } | Event::Leave { user } | Event::Message { user, .. } => user,
        }
    }

    /// Message text; `None` for announcements.
    pub fn content(&self) -> Option<&str> {
        match self {
            Event::Message { content, .. } => Some(content),
            Event::Join { .. } | Event::Leave { .. } => None,
        }
    }

    /// Build an event from the raw fields of a stored map.
    ///
    /// `content` is required for messages and ignored for announcements.
    pub fn from_fields(
        kind: Option<&str>,
        user: Option<&str>,
        content: Option<&str>,
    ) -> Result<Self, ProtocolError> {
        let kind = kind.ok_or_else(|| ProtocolError::InvalidEvent("missing 'type'".into()))?;
        let kind = EventKind::parse(kind)?;
        let user = user
            .ok_or_else(|| ProtocolError::InvalidEvent(format!("{kind} event without 'user'")))?;

        match kind {
            EventKind::Join => Ok(Event::join(user)),
            EventKind::Leave => Ok(Event::leave(user)),
            EventKind::Message => {
                let content = content.ok_or_else(|| {
                    ProtocolError::InvalidEvent(format!("message from '{user}' without 'content'"))
                })?;
                Ok(Event::message(user, content))
            }
        }
    }

    /// Decode the JSON form of a stored event.
    pub fn from_json(value: &Value) -> Result<Self, ProtocolError> {
        let fields = value
            .as_object()
            .ok_or_else(|| ProtocolError::InvalidEvent(format!("expected an object, got {value}")))?;

        Event::from_fields(
            text_field(fields, "type")?,
            text_field(fields, "user")?,
            text_field(fields, "content")?,
        )
    }

}

fn text_field<'a>(
    fields: &'a serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<&'a str>, ProtocolError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(ProtocolError::InvalidEvent(format!(
            "field '{key}' must be a string, got {other}"
        ))),
    }
}
