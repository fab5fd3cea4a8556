use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Creates a new random message identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the raw message identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Message typed by the end user.
    User,
    /// Message produced by the text-generation service.
    Ai,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Ai => write!(f, "ai"),
        }
    }
}

impl std::str::FromStr for Sender {
    type Err = crate::error::ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "ai" => Ok(Sender::Ai),
            other => Err(crate::error::ProtoError::InvalidSender(other.to_string())),
        }
    }
}

/// A single entry of the conversation log.
///
/// `id`, `sender` and `timestamp` are fixed at creation. `text` is only
/// rewritten while the message is the target of an active stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id.
    pub id: MessageId,
    /// Message text; for AI messages, the accumulated answer so far.
    pub text: String,
    /// Who authored the message.
    pub sender: Sender,
    /// Creation timestamp in UTC.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Creates a message with a fresh id and the current timestamp.
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            sender,
            timestamp: Some(Utc::now()),
        }
    }

    /// Creates the echo of what the user submitted.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    /// Creates an AI message with fixed text (e.g. a failure notice).
    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(Sender::Ai, text)
    }

    /// Creates the empty AI message a stream fills in.
    pub fn ai_placeholder() -> Self {
        Self::new(Sender::Ai, String::new())
    }

    /// Returns `true` for an AI message that has not received any text yet.
    pub fn is_pending(&self) -> bool {
        self.sender == Sender::Ai && self.text.is_empty()
    }
}
