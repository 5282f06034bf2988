//! Turn-taking between the user, the conversation store, and the model
//!
//! A turn appends the user entry and raises the awaiting flag, calls the
//! model, then appends exactly one assistant entry (the reply, a placeholder
//! for an empty reply, or a readable error) and lowers the flag. Only one
//! turn may be open at a time; overlapping submissions are refused.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ai::{InferenceClient, Prompt};
use crate::state::{ChatEntry, ConversationState, ImagePayload};
use crate::store::MessageStore;

pub const GREETING: &str = "Hello! I'm your AI assistant. I can help with questions, see images, and have conversations. What would you like to do?";
pub const DEFAULT_IMAGE_PROMPT: &str = "What do you see in this image?";

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyPrompt,
    #[error("still waiting for the previous reply")]
    RequestInFlight,
}

#[derive(Debug, Clone, Copy)]
enum TurnKind {
    Text,
    Image,
}

impl TurnKind {
    fn fallback(self) -> &'static str {
        match self {
            TurnKind::Text => "I'm not sure how to respond to that.",
            TurnKind::Image => "I'm not sure what I'm seeing in this image.",
        }
    }

    fn failure(self, message: &str) -> String {
        let message = if message.trim().is_empty() { "Unknown error" } else { message };
        match self {
            TurnKind::Text => format!("Sorry, I encountered an error: {}", message),
            TurnKind::Image => format!("Sorry, I couldn't analyze the image: {}", message),
        }
    }
}

pub struct ChatController {
    store: MessageStore,
    client: Arc<dyn InferenceClient>,
}

impl ChatController {
    /// Controller with a fresh conversation holding the greeting
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self::with_store(client, MessageStore::with_greeting(GREETING))
    }

    pub fn with_store(client: Arc<dyn InferenceClient>, store: MessageStore) -> Self {
        Self { store, client }
    }

    pub fn describe_client(&self) -> String {
        self.client.describe()
    }

    /// Receiver for re-rendering on every change
    pub fn conversation(&self) -> watch::Receiver<ConversationState> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> ConversationState {
        self.store.snapshot()
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.store.is_awaiting_response()
    }

    /// Run one text turn and return the assistant entry it appended
    pub async fn submit_text(&self, text: &str) -> Result<ChatEntry, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyPrompt);
        }

        self.run_turn(ChatEntry::user(text), Prompt::text(text), TurnKind::Text)
            .await
    }

    /// Run one image turn; a blank prompt asks what the image shows
    pub async fn submit_image(&self, image: ImagePayload, prompt: &str) -> Result<ChatEntry, ChatError> {
        let prompt = if prompt.trim().is_empty() { DEFAULT_IMAGE_PROMPT } else { prompt };

        self.run_turn(
            ChatEntry::user_with_image(prompt, image.clone()),
            Prompt::with_image(prompt, image),
            TurnKind::Image,
        )
        .await
    }

    /// [`submit_text`](Self::submit_text) on a background task
    pub fn spawn_text(self: &Arc<Self>, text: String) -> JoinHandle<Result<ChatEntry, ChatError>> {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.submit_text(&text).await })
    }

    /// [`submit_image`](Self::submit_image) on a background task
    pub fn spawn_image(self: &Arc<Self>, image: ImagePayload, prompt: String) -> JoinHandle<Result<ChatEntry, ChatError>> {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.submit_image(image, &prompt).await })
    }

    async fn run_turn(&self, user: ChatEntry, prompt: Prompt, kind: TurnKind) -> Result<ChatEntry, ChatError> {
        if !self.store.open_turn(user) {
            tracing::debug!("submission refused while a reply is outstanding");
            return Err(ChatError::RequestInFlight);
        }
        let turn = OpenTurn::new(&self.store);

        tracing::debug!(
            client = %self.client.describe(),
            has_image = prompt.image.is_some(),
            "sending prompt"
        );

        let reply = match self.client.generate(&prompt).await {
            Ok(Some(text)) if !text.trim().is_empty() => ChatEntry::assistant(text),
            Ok(_) => {
                tracing::info!("model returned no text, using placeholder reply");
                ChatEntry::assistant(kind.fallback())
            }
            Err(err) => {
                tracing::warn!(error = %err, "model request failed");
                ChatEntry::assistant(kind.failure(&err.to_string()))
            }
        };

        turn.close(reply.clone());
        Ok(reply)
    }
}

/// Clears the awaiting flag if the turn's future is dropped mid-request
struct OpenTurn<'a> {
    store: &'a MessageStore,
    closed: bool,
}

impl<'a> OpenTurn<'a> {
    fn new(store: &'a MessageStore) -> Self {
        Self { store, closed: false }
    }

    fn close(mut self, reply: ChatEntry) {
        self.store.close_turn(reply);
        self.closed = true;
    }
}

impl Drop for OpenTurn<'_> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!("turn dropped before the reply arrived");
            self.store.abandon_turn();
        }
    }
}
