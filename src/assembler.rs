//! Incremental reconstruction of a streamed doctor reply.
//!
//! The chat endpoint delivers one JSON object per fragment:
//!
//! ```text
//! {"reasoning_content": "...next piece of thinking..."}
//! {"content": "...the whole answer so far..."}
//! ```
//!
//! `reasoning_content` is an increment and is appended. `content` is
//! cumulative (the upstream resends the full answer each time) and replaces
//! what is displayed. Swapping those two rules duplicates the answer text, so
//! both are pinned by tests.

use serde::Deserialize;
use tracing::debug;

use crate::message::{ChatMessage, Conversation, MessageId};

/// Structured payload of one fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatFragment {
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Result of interpreting one raw fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedFragment {
    Structured(ChatFragment),
    Raw(String),
}

impl ParsedFragment {
    /// Parse never fails: anything that is not a JSON object is raw text.
    pub fn parse(fragment: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(fragment.trim()) {
            Ok(value @ serde_json::Value::Object(_)) => {
                match serde_json::from_value::<ChatFragment>(value) {
                    Ok(parsed) => ParsedFragment::Structured(parsed),
                    Err(_) => ParsedFragment::Raw(fragment.to_string()),
                }
            }
            _ => ParsedFragment::Raw(fragment.to_string()),
        }
    }
}

/// Apply one fragment to a message in place.
pub fn apply_fragment(message: &mut ChatMessage, fragment: &str) {
    match ParsedFragment::parse(fragment) {
        ParsedFragment::Structured(parsed) => {
            if let Some(reasoning) = parsed.reasoning_content {
                message.reasoning_content.push_str(&reasoning);
            }
            if let Some(content) = parsed.content {
                message.content = content;
            }
        }
        ParsedFragment::Raw(text) => {
            debug!(id = %message.id, len = text.len(), "unparseable fragment kept as raw text");
            message.raw_text.push_str(&text);
        }
    }
}

/// Routes fragments to messages of a [`Conversation`] by correlation id.
#[derive(Debug, Default)]
pub struct StreamingChatAssembler {
    fragments_applied: usize,
    fragments_dropped: usize,
}

impl StreamingChatAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the message `id` with `fragment` and return a snapshot of it.
    ///
    /// Fragments for an unknown id are dropped silently and `None` is returned.
    pub fn apply(
        &mut self,
        conversation: &mut Conversation,
        id: MessageId,
        fragment: &str,
    ) -> Option<ChatMessage> {
        let Some(message) = conversation.get_mut(id) else {
            self.fragments_dropped += 1;
            return None;
        };
        apply_fragment(message, fragment);
        self.fragments_applied += 1;
        Some(message.clone())
    }

    pub fn fragments_applied(&self) -> usize {
        self.fragments_applied
    }

    pub fn fragments_dropped(&self) -> usize {
        self.fragments_dropped
    }
}
