//! Shared protocol types for the streaming chat workspace.
//!
//! This crate defines the serializable conversation model, the closed set of
//! store actions, and strongly-typed error enums shared across the workspace.

pub mod error;
pub mod event;
pub mod message;

/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of store actions and workflow phase types.
pub use event::{SendPhase, StoreAction};
/// Re-export of conversation/message identity types.
pub use message::{Message, MessageId, Sender};

/// Notice text appended to the log when a send fails.
pub const DEFAULT_ERROR_NOTICE: &str = "Error: AI response failed.";

/// Text a renderer shows in place of an AI message that has no text yet.
pub const PENDING_PLACEHOLDER: &str = "…";
