//! Observable conversation container
//!
//! Backed by a `tokio::sync::watch` channel: readers take snapshots or wait for
//! change notifications, and every write is a single atomic modification of the
//! shared [`ConversationState`]. Only the controller writes.

use tokio::sync::watch;

use crate::state::{ChatEntry, ConversationState};

pub struct MessageStore {
    tx: watch::Sender<ConversationState>,
}

impl MessageStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConversationState::default());
        Self { tx }
    }

    /// Store seeded with an assistant greeting
    pub fn with_greeting(greeting: &str) -> Self {
        let store = Self::new();
        store.tx.send_modify(|state| state.entries.push(ChatEntry::assistant(greeting)));
        store
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> ConversationState {
        self.tx.borrow().clone()
    }

    /// Receiver notified after every modification
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.tx.subscribe()
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.tx.borrow().awaiting_response
    }

    /// Appends the user entry and raises the awaiting flag in one step.
    /// Returns false, leaving the state untouched, if a turn is already open.
    pub(crate) fn open_turn(&self, entry: ChatEntry) -> bool {
        self.tx.send_if_modified(move |state| {
            if state.awaiting_response {
                return false;
            }
            state.entries.push(entry);
            state.awaiting_response = true;
            true
        })
    }

    /// Appends the reply entry and lowers the awaiting flag in one step.
    pub(crate) fn close_turn(&self, entry: ChatEntry) {
        self.tx.send_modify(|state| {
            state.entries.push(entry);
            state.awaiting_response = false;
        });
    }

    /// Lowers the awaiting flag without a reply.
    pub(crate) fn abandon_turn(&self) {
        self.tx.send_if_modified(|state| std::mem::replace(&mut state.awaiting_response, false));
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}
