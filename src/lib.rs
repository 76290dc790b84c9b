//! Incremental renderer for assistant replies streamed over a WebSocket.
//!
//! The server answers each question either with one `full` frame or with a
//! `begin`, `content`..., `end` sequence. [`renderer::StreamingChatRenderer`]
//! shows partial text as it arrives in a single panel node and formats the
//! whole reply once when the stream ends.

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod frame;
pub mod message;
pub mod renderer;
pub mod session;
pub mod transport;
pub mod view;

pub use error::{ChatError, Result};
pub use format::{Formatter, MarkdownFormatter, PlainFormatter};
pub use frame::{Frame, Marker};
pub use message::{Conversation, Message, RenderState, Role};
pub use renderer::{FrameOutcome, RendererOptions, StreamHandle, StreamingChatRenderer};
pub use transport::{ReconnectPolicy, Transport, TransportEvent, WsTransport};
pub use view::{HtmlPanel, InputState, NodeContent, NodeId, View};
