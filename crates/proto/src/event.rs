use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageId};

/// The closed set of mutations a conversation log accepts.
///
/// Every change to the log is expressed as one of these actions and applied
/// atomically, so a recorded sequence can be replayed into an identical log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreAction {
    /// Insert a message at the tail.
    AppendMessage(Message),
    /// Replace the whole text of the message with `id`.
    ReplaceText { id: MessageId, text: String },
    /// Empty the log.
    ClearLog,
}

/// Observable phase of the send workflow.
///
/// `Completed` and `Failed` are reported through the send outcome; the phase
/// itself always settles back to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SendPhase {
    /// Nothing in flight.
    #[default]
    Idle,
    /// User message appended, request being issued.
    Sending,
    /// Body obtained; fragments are being written to `message_id`.
    Streaming { message_id: MessageId },
}

impl SendPhase {
    /// Whether a send is in flight (the `loading` flag).
    pub fn is_loading(&self) -> bool {
        !matches!(self, SendPhase::Idle)
    }
}
