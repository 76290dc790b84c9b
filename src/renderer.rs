//! Streaming chat renderer.
//!
//! [`StreamingChatRenderer`] turns connection events and decoded frames into
//! panel updates. It owns the transport, the view and the formatter that are
//! handed to it, and keeps a [`Conversation`] in step with the panel.
//!
//! ## Streamed replies
//! A reply arrives as `begin`, zero or more `content`, then `end`. The first
//! chunk creates one node showing raw text; later chunks are appended to that
//! same node without formatting; `end` formats the whole accumulated text once
//! and replaces the node's content. The active stream is addressed through a
//! [`StreamHandle`], never by looking up the last node in the panel.
//!
//! ## Out-of-order frames
//! - `content`/`end` with no active stream are dropped with a warning.
//! - `begin`/`full` while a stream is active first finish the active stream
//!   with whatever text it has, so only one message is ever streaming.

use tracing::{debug, warn};

use crate::error::{ChatError, Result};
use crate::format::Formatter;
use crate::frame::{Frame, Marker};
use crate::message::{Conversation, Role};
use crate::transport::Transport;
use crate::view::{InputState, NodeContent, NodeId, View};

/// Greeting shown each time the connection opens.
pub const DEFAULT_GREETING: &str = "Hi, I'm your AI assistant 🤖<br>I analyzed the data visualized in the dashboard and I'm ready to answer your questions.";

/// Pixels to scroll after an assistant update.
pub const DEFAULT_SCROLL_NUDGE: i64 = 100;

/// Notice shown once the transport gives up.
pub const CLOSED_NOTICE: &str = "The connection was closed. Please refresh the page.";

/// Reference to the message currently being streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle {
    message: usize,
    node: NodeId,
}

impl StreamHandle {
    pub fn message_index(&self) -> usize {
        self.message
    }

    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// Renderer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererOptions {
    pub greeting: String,
    pub scroll_nudge: i64,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            scroll_nudge: DEFAULT_SCROLL_NUDGE,
        }
    }
}

/// Effect of one inbound frame or payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A complete message was appended (`full`).
    Appended(NodeId),
    /// A streamed message was started (`begin`).
    Started(StreamHandle),
    /// The active stream received a chunk (`content`).
    Extended(StreamHandle),
    /// The active stream was finished and formatted (`end`).
    Finished(NodeId),
    /// The frame had no target and was dropped.
    Ignored,
    /// The payload could not be decoded; a notice was shown or queued.
    Malformed,
}

/// Renders one chat session into a [`View`].
pub struct StreamingChatRenderer<T, V, F> {
    transport: T,
    view: V,
    formatter: F,
    options: RendererOptions,
    conversation: Conversation,
    active: Option<StreamHandle>,
    connected: bool,
    /// Notices raised while a stream was active; shown once it ends.
    deferred_notices: Vec<String>,
}

impl<T: Transport, V: View, F: Formatter> StreamingChatRenderer<T, V, F> {
    pub fn new(transport: T, view: V, formatter: F) -> Self {
        Self::with_options(transport, view, formatter, RendererOptions::default())
    }

    pub fn with_options(transport: T, view: V, formatter: F, options: RendererOptions) -> Self {
        Self {
            transport,
            view,
            formatter,
            options,
            conversation: Conversation::new(),
            active: None,
            connected: false,
            deferred_notices: Vec::new(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn active_stream(&self) -> Option<StreamHandle> {
        self.active
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    // -----------------------------------------------------------------------
    // Connection events
    // -----------------------------------------------------------------------

    /// Reset the panel, show the greeting and enable input.
    pub fn on_connection_open(&mut self) {
        self.active = None;
        self.deferred_notices.clear();
        self.conversation.clear();
        self.view.clear();
        self.connected = true;

        let greeting = self.options.greeting.clone();
        self.append_full(&greeting);
        debug!("chat panel reset on connection open");
    }

    /// Show a transport failure and disable input until the next open.
    ///
    /// An in-flight stream is finished with the text received so far.
    pub fn on_connection_error(&mut self, err: &ChatError) {
        warn!(error = %err, "chat connection error");
        self.connected = false;
        self.finish_active();
        self.post_notice(err.user_message());
        self.view.set_input(InputState::Disabled);
    }

    /// Route an error reported by the transport.
    ///
    /// Connection failures disable input; anything else (an undecodable
    /// binary frame) only posts a notice.
    pub fn on_transport_error(&mut self, err: &ChatError) {
        match err {
            ChatError::Connection(_) => self.on_connection_error(err),
            other => {
                warn!(error = %other, "transport reported a bad frame");
                self.post_notice(other.user_message());
            }
        }
    }

    /// The transport gave up reconnecting.
    pub fn on_connection_closed(&mut self) {
        self.connected = false;
        self.finish_active();
        self.post_notice(CLOSED_NOTICE.to_string());
        self.view.set_input(InputState::Disabled);
    }

    // -----------------------------------------------------------------------
    // Inbound frames
    // -----------------------------------------------------------------------

    /// Decode one socket payload and apply it.
    pub fn on_payload(&mut self, payload: &str) -> FrameOutcome {
        match Frame::parse(payload) {
            Ok(frame) => self.on_frame(frame),
            Err(err) => {
                if let ChatError::FrameParse { payload, .. } = &err {
                    warn!(error = %err, payload = %payload, "dropping malformed frame");
                }
                self.post_notice(err.user_message());
                FrameOutcome::Malformed
            }
        }
    }

    /// Apply one decoded frame.
    pub fn on_frame(&mut self, frame: Frame) -> FrameOutcome {
        let active = self.active;
        match frame.marker {
            Marker::Full => {
                if self.active.is_some() {
                    warn!("full frame arrived mid-stream; finishing the open message");
                    self.finish_active();
                }
                FrameOutcome::Appended(self.append_full(&frame.content))
            }
            Marker::Begin => {
                if self.active.is_some() {
                    warn!("begin frame arrived mid-stream; finishing the open message");
                    self.finish_active();
                }
                match self.begin(&frame.content) {
                    Some(handle) => FrameOutcome::Started(handle),
                    None => FrameOutcome::Ignored,
                }
            }
            Marker::Content => match active {
                Some(handle) if self.append_chunk(handle, &frame.content) => {
                    FrameOutcome::Extended(handle)
                }
                _ => {
                    warn!(marker = %frame.marker, "no streaming message to extend");
                    FrameOutcome::Ignored
                }
            },
            Marker::End => match active {
                Some(handle) if self.finish(handle, &frame.content) => {
                    FrameOutcome::Finished(handle.node)
                }
                _ => {
                    warn!(marker = %frame.marker, "no streaming message to finish");
                    FrameOutcome::Ignored
                }
            },
        }
    }

    /// Start a streamed assistant message showing `chunk` unformatted.
    ///
    /// Returns `None` if a stream is already active.
    pub fn begin(&mut self, chunk: &str) -> Option<StreamHandle> {
        let message = self.conversation.begin_stream(chunk)?;
        let node = self
            .view
            .append_node(Role::Assistant, NodeContent::Text(chunk.to_string()));
        let handle = StreamHandle { message, node };
        self.active = Some(handle);
        self.after_assistant_update();
        Some(handle)
    }

    /// Append an unformatted chunk to the stream behind `handle`.
    ///
    /// Returns `false` if `handle` is not the active stream.
    pub fn append_chunk(&mut self, handle: StreamHandle, chunk: &str) -> bool {
        if self.active != Some(handle) {
            return false;
        }
        if !self.conversation.append_chunk(handle.message, chunk) {
            return false;
        }
        self.view.append_text(handle.node, chunk);
        self.after_assistant_update();
        true
    }

    /// Append the final chunk, format the whole text once and swap it in.
    pub fn finish(&mut self, handle: StreamHandle, chunk: &str) -> bool {
        if self.active != Some(handle) {
            return false;
        }
        self.conversation.append_chunk(handle.message, chunk);
        let Some(text) = self.conversation.finish_stream(handle.message) else {
            return false;
        };
        let markup = self.formatter.format(text);
        self.view.replace_markup(handle.node, markup);
        self.active = None;
        self.after_assistant_update();
        self.flush_deferred_notices();
        true
    }

    // -----------------------------------------------------------------------
    // User input
    // -----------------------------------------------------------------------

    /// Send `text` and show it as a user message.
    ///
    /// Blank input is ignored. Input is also refused while disconnected or
    /// while a reply is still streaming. Returns whether anything was sent.
    pub fn on_user_send(&mut self, text: &str) -> Result<bool> {
        if text.trim().is_empty() {
            return Ok(false);
        }
        if !self.connected {
            debug!("ignoring send while disconnected");
            return Ok(false);
        }
        if self.active.is_some() {
            debug!("ignoring send while a reply is streaming");
            return Ok(false);
        }

        if let Err(err) = self.transport.send(text) {
            self.on_connection_error(&err);
            return Err(err);
        }

        if self.conversation.push_complete(Role::User, text).is_some() {
            self.view
                .append_node(Role::User, NodeContent::Text(text.to_string()));
        }
        self.view.clear_input();
        self.view.scroll_to_bottom();
        self.view.set_input(InputState::Busy);
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn append_full(&mut self, text: &str) -> NodeId {
        let markup = self.formatter.format(text);
        self.conversation.push_complete(Role::Assistant, text);
        let node = self
            .view
            .append_node(Role::Assistant, NodeContent::Markup(markup));
        self.after_assistant_update();
        node
    }

    fn finish_active(&mut self) {
        if let Some(handle) = self.active {
            self.finish(handle, "");
        }
    }

    fn after_assistant_update(&mut self) {
        if self.connected {
            self.view.set_input(InputState::Ready);
        }
        self.view.scroll_by(self.options.scroll_nudge);
    }

    /// Show a system notice, or queue it until the active stream ends.
    fn post_notice(&mut self, text: String) {
        if self.active.is_some() {
            self.deferred_notices.push(text);
            return;
        }
        if self.conversation.push_complete(Role::System, text.as_str()).is_some() {
            self.view.append_node(Role::System, NodeContent::Text(text));
            self.view.scroll_to_bottom();
        }
    }

    fn flush_deferred_notices(&mut self) {
        for text in std::mem::take(&mut self.deferred_notices) {
            self.post_notice(text);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
