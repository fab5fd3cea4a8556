//! Send workflow: user input → store → stream → store.
//!
//! One send runs at a time. The phase moves `Idle → Sending → Streaming` and
//! always settles back to `Idle`, whether the stream completes, fails, or the
//! send future is dropped.

use std::sync::Arc;

use proto::{DEFAULT_ERROR_NOTICE, Message, MessageId, SendPhase, StreamError};
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, info, warn};

use crate::client::StreamProvider;
use crate::store::SharedStore;

/// How a send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Input was blank; nothing changed.
    Ignored,
    /// Another send was in flight; nothing changed.
    Busy,
    /// The stream ended normally; `text` is the final answer (possibly empty).
    Completed { message_id: MessageId, text: String },
    /// The send failed; `notice_id` is the AI message carrying the notice.
    Failed {
        error: StreamError,
        notice_id: MessageId,
    },
}

impl SendOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SendOutcome::Completed { .. })
    }
}

/// Holds the send slot and resets the phase to `Idle` when a send ends for
/// any reason.
struct PhaseGuard<'a> {
    phase: &'a watch::Sender<SendPhase>,
    slot: Option<MutexGuard<'a, ()>>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a watch::Sender<SendPhase>, slot: MutexGuard<'a, ()>) -> Self {
        phase.send_replace(SendPhase::Sending);
        Self {
            phase,
            slot: Some(slot),
        }
    }

    fn streaming(&self, message_id: MessageId) {
        self.phase.send_replace(SendPhase::Streaming { message_id });
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        // Free the slot first: whoever observes `Idle` may send right away.
        drop(self.slot.take());
        self.phase.send_replace(SendPhase::Idle);
    }
}

/// Drives one conversation: validates input, records it, streams the answer
/// into its own placeholder message, and reconciles failures.
pub struct SendWorkflow {
    store: SharedStore,
    provider: Arc<dyn StreamProvider>,
    error_notice: String,
    phase: watch::Sender<SendPhase>,
    slot: Mutex<()>,
}

impl SendWorkflow {
    /// Creates a workflow writing into `store` and reading from `provider`.
    pub fn new(store: SharedStore, provider: Arc<dyn StreamProvider>) -> Self {
        let (phase, _) = watch::channel(SendPhase::Idle);
        Self {
            store,
            provider,
            error_notice: DEFAULT_ERROR_NOTICE.to_string(),
            phase,
            slot: Mutex::new(()),
        }
    }

    /// Overrides the text of the failure notice.
    pub fn with_error_notice(mut self, notice: impl Into<String>) -> Self {
        self.error_notice = notice.into();
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn error_notice(&self) -> &str {
        &self.error_notice
    }

    /// Whether a send is in flight.
    pub fn loading(&self) -> bool {
        self.phase.borrow().is_loading()
    }

    pub fn phase(&self) -> SendPhase {
        self.phase.borrow().clone()
    }

    /// Receiver that observes every phase change.
    pub fn watch_phase(&self) -> watch::Receiver<SendPhase> {
        self.phase.subscribe()
    }

    /// Sends the draft and clears it. A blank draft, or a draft submitted
    /// while another send is in flight, is left untouched.
    pub async fn submit(&self, draft: &mut String) -> SendOutcome {
        if draft.trim().is_empty() {
            return SendOutcome::Ignored;
        }
        let Ok(slot) = self.slot.try_lock() else {
            debug!("Submit rejected: send already in flight");
            return SendOutcome::Busy;
        };
        let text = std::mem::take(draft);
        self.run(slot, text).await
    }

    /// Sends `text` as a user message and streams the answer.
    pub async fn send(&self, text: impl Into<String>) -> SendOutcome {
        let text = text.into();
        if text.trim().is_empty() {
            return SendOutcome::Ignored;
        }
        let Ok(slot) = self.slot.try_lock() else {
            debug!("Send rejected: send already in flight");
            return SendOutcome::Busy;
        };
        self.run(slot, text).await
    }

    async fn run(&self, slot: MutexGuard<'_, ()>, text: String) -> SendOutcome {
        let guard = PhaseGuard::enter(&self.phase, slot);
        self.store.append(Message::user(text.as_str()));
        debug!(input_len = text.len(), "User message recorded");

        let mut fragments = match self.provider.open(&text).await {
            Ok(fragments) => fragments,
            Err(error) => return self.fail(error, None),
        };

        let placeholder = Message::ai_placeholder();
        let message_id = placeholder.id.clone();
        self.store.append(placeholder);
        guard.streaming(message_id.clone());

        while let Some(next) = fragments.next_fragment().await {
            match next {
                Ok(_) => {
                    self.store.set_text(&message_id, fragments.accumulated());
                }
                Err(error) => return self.fail(error, Some(&message_id)),
            }
        }

        let text = fragments.accumulated().to_string();
        info!(
            message_id = %message_id,
            chunks = fragments.chunks_read(),
            fragments = fragments.fragments(),
            answer_len = text.len(),
            "Answer stream completed"
        );
        SendOutcome::Completed { message_id, text }
    }

    /// Records the failure notice.
    ///
    /// A placeholder that already shows partial text is kept as is and the
    /// notice is appended after it; a placeholder that is still empty becomes
    /// the notice.
    fn fail(&self, error: StreamError, placeholder: Option<&MessageId>) -> SendOutcome {
        warn!(error = %error, "Send failed");

        if let Some(id) = placeholder {
            let pending = self.store.get(id).is_some_and(|m| m.is_pending());
            if pending && self.store.set_text(id, self.error_notice.as_str()) {
                return SendOutcome::Failed {
                    error,
                    notice_id: id.clone(),
                };
            }
        }

        let notice = Message::ai(self.error_notice.as_str());
        let notice_id = notice.id.clone();
        self.store.append(notice);
        SendOutcome::Failed { error, notice_id }
    }
}
