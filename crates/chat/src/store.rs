//! Ordered conversation log driven by a closed set of [`StoreAction`]s.

use std::sync::Arc;

use parking_lot::Mutex;
use proto::{Message, MessageId, StoreAction};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Append-mostly conversation log.
///
/// All mutations go through [`MessageStore::apply`]. Messages are never
/// reordered or removed individually; only `ClearLog` empties the log.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    journal: Vec<StoreAction>,
}

impl MessageStore {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a log by applying `actions` in order.
    pub fn replay<'a>(actions: impl IntoIterator<Item = &'a StoreAction>) -> Self {
        let mut store = Self::new();
        for action in actions {
            store.apply(action.clone());
        }
        store
    }

    /// Applies one action. Returns `true` when the log changed.
    pub fn apply(&mut self, action: StoreAction) -> bool {
        let changed = match &action {
            StoreAction::AppendMessage(message) => {
                if self.position(&message.id).is_some() {
                    warn!(id = %message.id, "Duplicate message id rejected");
                    false
                } else {
                    self.messages.push(message.clone());
                    true
                }
            }
            StoreAction::ReplaceText { id, text } => match self.position(id) {
                Some(idx) => {
                    self.messages[idx].text.clone_from(text);
                    true
                }
                None => {
                    debug!(id = %id, "Text replace for unknown message ignored");
                    false
                }
            },
            StoreAction::ClearLog => {
                self.messages.clear();
                true
            }
        };
        if changed {
            trace!(len = self.messages.len(), "Store action applied");
            self.record(action);
        }
        changed
    }

    // Consecutive replacements of one message collapse into the latest, and a
    // clear drops everything before it. Replay still yields the same log.
    fn record(&mut self, action: StoreAction) {
        match &action {
            StoreAction::ReplaceText { id, .. } => {
                if let Some(StoreAction::ReplaceText { id: last_id, .. }) = self.journal.last() {
                    if last_id == id {
                        self.journal.pop();
                    }
                }
            }
            StoreAction::ClearLog => self.journal.clear(),
            StoreAction::AppendMessage(_) => {}
        }
        self.journal.push(action);
    }

    /// Inserts `message` at the tail.
    pub fn append(&mut self, message: Message) -> bool {
        self.apply(StoreAction::AppendMessage(message))
    }

    /// Replaces the full text of the message with `id`.
    pub fn set_text(&mut self, id: &MessageId, text: impl Into<String>) -> bool {
        self.apply(StoreAction::ReplaceText {
            id: id.clone(),
            text: text.into(),
        })
    }

    /// Replaces the full text of whichever message is currently last.
    /// No-op on an empty log.
    pub fn set_last_text(&mut self, text: impl Into<String>) -> bool {
        match self.messages.last() {
            Some(last) => {
                let id = last.id.clone();
                self.set_text(&id, text)
            }
            None => false,
        }
    }

    /// Empties the log.
    pub fn clear(&mut self) {
        self.apply(StoreAction::ClearLog);
    }

    /// The ordered conversation.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Compacted record of the actions that changed the log, in application
    /// order. Replaying it rebuilds the current log.
    pub fn journal(&self) -> &[StoreAction] {
        &self.journal
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.position(id).map(|idx| &self.messages[idx])
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    // Streaming targets the newest message, so search from the back.
    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().rposition(|m| &m.id == id)
    }
}

/// Cloneable handle that serializes every mutation of one [`MessageStore`]
/// and publishes applied actions to subscribers in order.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<MessageStore>>,
    changes: broadcast::Sender<StoreAction>,
}

impl SharedStore {
    /// Creates a handle around an empty log.
    pub fn new() -> Self {
        Self::from_store(MessageStore::new())
    }

    /// Creates a handle around an existing log.
    pub fn from_store(store: MessageStore) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(store)),
            changes,
        }
    }

    /// Applies `action` and notifies subscribers if the log changed.
    pub fn dispatch(&self, action: StoreAction) -> bool {
        let mut store = self.inner.lock();
        let changed = store.apply(action.clone());
        if changed {
            // Sent under the lock so subscribers see actions in apply order.
            let _ = self.changes.send(action);
        }
        changed
    }

    pub fn append(&self, message: Message) -> bool {
        self.dispatch(StoreAction::AppendMessage(message))
    }

    pub fn set_text(&self, id: &MessageId, text: impl Into<String>) -> bool {
        self.dispatch(StoreAction::ReplaceText {
            id: id.clone(),
            text: text.into(),
        })
    }

    /// Tail mutation; resolves the tail id and replaces under one lock.
    pub fn set_last_text(&self, text: impl Into<String>) -> bool {
        let mut store = self.inner.lock();
        let Some(id) = store.last().map(|m| m.id.clone()) else {
            return false;
        };
        let action = StoreAction::ReplaceText {
            id,
            text: text.into(),
        };
        let changed = store.apply(action.clone());
        if changed {
            let _ = self.changes.send(action);
        }
        changed
    }

    pub fn clear(&self) {
        self.dispatch(StoreAction::ClearLog);
    }

    /// Receives every action applied after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreAction> {
        self.changes.subscribe()
    }

    /// Copy of the current conversation.
    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.lock().messages().to_vec()
    }

    /// Copy of the message with `id`, if present.
    pub fn get(&self, id: &MessageId) -> Option<Message> {
        self.inner.lock().get(id).cloned()
    }

    /// Copy of the action journal.
    pub fn journal(&self) -> Vec<StoreAction> {
        self.inner.lock().journal().to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Runs `f` with read access to the log.
    pub fn read<R>(&self, f: impl FnOnce(&MessageStore) -> R) -> R {
        f(&self.inner.lock())
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}
