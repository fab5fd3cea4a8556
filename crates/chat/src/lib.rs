//! Conversation store, streaming frame decoding, HTTP stream client, and the
//! send workflow that ties them together.

pub mod client;
pub mod frame;
pub mod store;
pub mod workflow;

/// Streaming HTTP client and the provider seam used by the workflow.
pub use client::{FragmentStream, StreamClient, StreamProvider};
/// Line-framed event decoding.
pub use frame::{FrameDecoder, FrameLine, parse_chunk, parse_line};
/// Reducer-backed conversation log and its shared handle.
pub use store::{MessageStore, SharedStore};
/// Send state machine.
pub use workflow::{SendOutcome, SendWorkflow};
