//! Chat messages and the per-session conversation they live in.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::language::{translations, Language};

/// Who is speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Doctor,
    Patient,
    /// Speaks the end-of-consultation summary.
    Reporter,
}

impl Role {
    pub fn label(self, language: Language) -> &'static str {
        match self {
            Role::Doctor => translations::DOCTOR.get(language),
            Role::Patient => translations::PATIENT.get(language),
            Role::Reporter => translations::REPORTER.get(language),
        }
    }
}

/// Correlation identifier routing streamed fragments to their message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        MessageId(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    /// Grows by concatenation, one piece per fragment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning_content: String,
    /// Replaced wholesale by each fragment carrying `content`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    /// Verbatim text of fragments that did not parse.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_text: String,
    pub is_streaming: bool,
}

/// What a renderer should show for a message right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageView<'a> {
    Structured {
        reasoning: Option<&'a str>,
        content: Option<&'a str>,
    },
    Raw(&'a str),
    Empty,
}

impl ChatMessage {
    /// A finalized message typed by the user.
    pub fn user(text: impl Into<String>) -> Self {
        ChatMessage {
            id: MessageId::new(),
            role: Role::Patient,
            reasoning_content: String::new(),
            content: text.into(),
            raw_text: String::new(),
            is_streaming: false,
        }
    }

    /// An empty, streaming placeholder filled by the assembler.
    pub fn placeholder(role: Role) -> Self {
        ChatMessage {
            id: MessageId::new(),
            role,
            reasoning_content: String::new(),
            content: String::new(),
            raw_text: String::new(),
            is_streaming: true,
        }
    }

    pub fn has_structured(&self) -> bool {
        !self.reasoning_content.is_empty() || !self.content.is_empty()
    }

    pub fn view(&self) -> MessageView<'_> {
        if self.has_structured() {
            MessageView::Structured {
                reasoning: (!self.reasoning_content.is_empty())
                    .then_some(self.reasoning_content.as_str()),
                content: (!self.content.is_empty()).then_some(self.content.as_str()),
            }
        } else if !self.raw_text.is_empty() {
            MessageView::Raw(&self.raw_text)
        } else {
            MessageView::Empty
        }
    }
}

/// Ordered messages of one session, addressed by [`MessageId`].
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) -> MessageId {
        let id = message.id;
        self.messages.push(message);
        id
    }

    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: MessageId) -> Option<&mut ChatMessage> {
        // Streaming targets are almost always the newest message.
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }

    /// Mark a message as no longer streaming. Returns the finalized copy.
    pub fn finalize(&mut self, id: MessageId) -> Option<ChatMessage> {
        let message = self.get_mut(id)?;
        message.is_streaming = false;
        Some(message.clone())
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }
}
