//! Crate-level error type.

use thiserror::Error;

/// Errors raised by the transport, the frame codec, and configuration loading.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The socket could not be opened, or a read/write on it failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// An inbound payload was not a valid frame.
    #[error("malformed frame: {detail}")]
    FrameParse { detail: String, payload: String },

    /// The configuration file or a derived endpoint URL is unusable.
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Short, user-facing text for a system message in the panel.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Connection(detail) => format!("Connection lost: {detail}."),
            ChatError::FrameParse { .. } => {
                "Received a message that could not be read; it was skipped.".to_string()
            }
            ChatError::Config(detail) => format!("Configuration problem: {detail}"),
            ChatError::Io(e) => format!("I/O error: {e}"),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ChatError::Connection(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
