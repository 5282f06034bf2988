//! UI-agnostic conversation state types
//!
//! These are the values the presentation layer renders. They carry no
//! behaviour beyond construction; all mutation goes through
//! [`MessageStore`](crate::store::MessageStore).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who wrote a chat entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Author {
    User,
    Assistant,
}

/// An encoded image attached to a user entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    data: Arc<[u8]>,
    mime_type: &'static str,
    width: u32,
    height: u32,
}

impl ImagePayload {
    /// Wraps already-encoded bytes. Use [`crate::attachment`] to build one from a
    /// file or arbitrary image data.
    pub fn new(data: impl Into<Arc<[u8]>>, mime_type: &'static str, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            mime_type,
            width,
            height,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Base64 form used by the HTTP providers
    pub fn to_base64(&self) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        STANDARD.encode(&self.data)
    }
}

/// One turn of the conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    content: String,
    author: Author,
    image: Option<ImagePayload>,
    created_at: DateTime<Utc>,
}

impl ChatEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(content, Author::User, None)
    }

    pub fn user_with_image(content: impl Into<String>, image: ImagePayload) -> Self {
        Self::new(content, Author::User, Some(image))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(content, Author::Assistant, None)
    }

    fn new(content: impl Into<String>, author: Author, image: Option<ImagePayload>) -> Self {
        Self {
            content: content.into(),
            author,
            image,
            created_at: Utc::now(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn author(&self) -> Author {
        self.author
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }

    pub fn image(&self) -> Option<&ImagePayload> {
        self.image.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Snapshot of the conversation as seen by readers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    pub entries: Vec<ChatEntry>,
    pub awaiting_response: bool,
}

impl ConversationState {
    /// Most recent assistant-authored entry, if any
    pub fn latest_reply(&self) -> Option<&ChatEntry> {
        self.entries.iter().rev().find(|e| e.author() == Author::Assistant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_constructors_set_author() {
        assert_eq!(ChatEntry::user("hi").author(), Author::User);
        assert_eq!(ChatEntry::assistant("hello").author(), Author::Assistant);
        assert!(ChatEntry::user("hi").image().is_none());
    }

    #[test]
    fn test_user_with_image_keeps_payload() {
        let image = ImagePayload::new(vec![1u8, 2, 3], "image/png", 4, 5);
        let entry = ChatEntry::user_with_image("look", image.clone());
        assert_eq!(entry.image(), Some(&image));
        assert!(entry.is_user());
    }

    #[test]
    fn test_to_base64() {
        let image = ImagePayload::new(b"hello".to_vec(), "image/png", 1, 1);
        assert_eq!(image.to_base64(), "aGVsbG8=");
    }

    #[test]
    fn test_latest_reply_skips_user_entries() {
        let state = ConversationState {
            entries: vec![
                ChatEntry::assistant("welcome"),
                ChatEntry::user("question"),
                ChatEntry::assistant("answer"),
                ChatEntry::user("follow up"),
            ],
            awaiting_response: true,
        };
        assert_eq!(state.latest_reply().map(|e| e.content()), Some("answer"));
        assert!(ConversationState::default().latest_reply().is_none());
    }
}
