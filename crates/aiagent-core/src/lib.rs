pub mod ai;
pub mod attachment;
pub mod config;
pub mod controller;
pub mod provider;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use ai::{connect, GeminiClient, InferenceClient, InferenceError, OllamaClient, Prompt};
pub use attachment::ImageError;
pub use config::Config;
pub use controller::{ChatController, ChatError};
pub use provider::Provider;
pub use state::{Author, ChatEntry, ConversationState, ImagePayload};
pub use store::MessageStore;
