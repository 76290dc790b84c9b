//! Conversation model kept in step with the rendered panel.

use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Notices raised by the client itself (connection loss, bad frames).
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// Rendering lifecycle of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderState {
    Pending,
    Streaming,
    Complete,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Raw accumulated text. Partial while streaming.
    pub text: String,
    pub role: Role,
    pub render_state: RenderState,
}

impl Message {
    pub fn complete(role: Role, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role,
            render_state: RenderState::Complete,
        }
    }

    pub fn pending_assistant() -> Self {
        Self {
            text: String::new(),
            role: Role::Assistant,
            render_state: RenderState::Pending,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.render_state == RenderState::Streaming
    }
}

/// Append-only ordered list of messages.
///
/// At most one message is `Streaming`, and it is always the last one. Every
/// mutating method preserves that.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// Index of the streaming message, if any.
    pub fn streaming_index(&self) -> Option<usize> {
        match self.messages.last() {
            Some(m) if m.is_streaming() => Some(self.messages.len() - 1),
            _ => None,
        }
    }

    /// Drop everything. Used when a (re)connection resets the panel.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Append a message that is already complete.
    ///
    /// Returns `None` while another message is streaming; the caller must
    /// finish or abandon it first.
    pub fn push_complete(&mut self, role: Role, text: impl Into<String>) -> Option<usize> {
        if self.streaming_index().is_some() {
            return None;
        }
        self.messages.push(Message::complete(role, text));
        Some(self.messages.len() - 1)
    }

    /// Start a streamed assistant message: `Pending`, then `Streaming` once the
    /// first chunk is recorded.
    pub fn begin_stream(&mut self, first_chunk: &str) -> Option<usize> {
        if self.streaming_index().is_some() {
            return None;
        }
        let mut message = Message::pending_assistant();
        message.text.push_str(first_chunk);
        message.render_state = RenderState::Streaming;
        self.messages.push(message);
        Some(self.messages.len() - 1)
    }

    /// Append a chunk to the streaming message at `index`.
    pub fn append_chunk(&mut self, index: usize, chunk: &str) -> bool {
        match self.messages.get_mut(index) {
            Some(m) if m.is_streaming() => {
                m.text.push_str(chunk);
                true
            }
            _ => false,
        }
    }

    /// Mark the streaming message at `index` complete and return its full text.
    pub fn finish_stream(&mut self, index: usize) -> Option<&str> {
        match self.messages.get_mut(index) {
            Some(m) if m.is_streaming() => {
                m.render_state = RenderState::Complete;
                Some(m.text.as_str())
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
