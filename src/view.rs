//! The panel the renderer draws into.
//!
//! [`View`] is the DOM-equivalent surface: a list of message nodes, one text
//! input with a submit control, and a scroll position. [`HtmlPanel`] is the
//! in-memory implementation used by the terminal client and the tests; it
//! keeps the class names of the browser page so its `to_html()` output can be
//! dropped straight into the original stylesheet.

use crate::format::escape_html;
use crate::message::Role;

/// Opaque handle to one message node in the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// What a node currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeContent {
    /// Unformatted text; escaped when rendered as HTML.
    Text(String),
    /// Formatter output, trusted as markup.
    Markup(String),
}

impl NodeContent {
    pub fn as_str(&self) -> &str {
        match self {
            NodeContent::Text(s) | NodeContent::Markup(s) => s,
        }
    }

    pub fn to_html(&self) -> String {
        match self {
            NodeContent::Text(s) => escape_html(s),
            NodeContent::Markup(s) => s.clone(),
        }
    }
}

/// State of the input field and its submit control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    /// Not connected yet; field and button disabled, button shows the icon.
    Disabled,
    /// Ready for input; button shows the send icon.
    Ready,
    /// Waiting for a reply; button replaced by a spinner and disabled.
    Busy,
}

impl InputState {
    pub fn is_enabled(self) -> bool {
        self == InputState::Ready
    }

    /// CSS classes of the submit control for this state.
    pub fn button_class(self) -> &'static str {
        match self {
            InputState::Busy => "lds-dual-ring-24",
            InputState::Disabled | InputState::Ready => "fa-regular fa-paper-plane",
        }
    }
}

/// Rendering surface driven by the renderer.
pub trait View {
    /// Remove every node.
    fn clear(&mut self);
    /// Append a node at the bottom and return its handle.
    fn append_node(&mut self, role: Role, content: NodeContent) -> NodeId;
    /// Append unformatted text to a node. Returns `false` if the node is gone.
    fn append_text(&mut self, node: NodeId, text: &str) -> bool;
    /// Replace a node's content with formatted markup.
    fn replace_markup(&mut self, node: NodeId, markup: String) -> bool;
    fn set_input(&mut self, state: InputState);
    fn clear_input(&mut self);
    fn scroll_to_bottom(&mut self);
    fn scroll_by(&mut self, offset: i64);
}

/// One rendered message node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub role: Role,
    pub content: NodeContent,
}

impl Node {
    pub fn class(&self) -> &'static str {
        role_class(self.role)
    }
}

/// CSS class for a message node.
pub fn role_class(role: Role) -> &'static str {
    match role {
        Role::User => "chat-message-user",
        Role::Assistant => "chat-message-bot",
        Role::System => "chat-message-system",
    }
}

/// Height one node contributes to the scroll model.
const NODE_HEIGHT: i64 = 48;

/// In-memory panel.
#[derive(Debug, Clone)]
pub struct HtmlPanel {
    nodes: Vec<Node>,
    next_id: u64,
    input: InputState,
    input_text: String,
    scroll_top: i64,
    /// Bumped on every [`View::clear`].
    generation: u64,
}

impl Default for HtmlPanel {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            next_id: 0,
            input: InputState::Disabled,
            input_text: String::new(),
            scroll_top: 0,
            generation: 0,
        }
    }
}

impl HtmlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn input_state(&self) -> InputState {
        self.input
    }

    pub fn input_text(&self) -> &str {
        &self.input_text
    }

    /// Set the field contents, as if typed.
    pub fn set_input_text(&mut self, text: impl Into<String>) {
        self.input_text = text.into();
    }

    pub fn scroll_top(&self) -> i64 {
        self.scroll_top
    }

    pub fn scroll_height(&self) -> i64 {
        self.nodes.len() as i64 * NODE_HEIGHT
    }

    /// Number of times the panel has been cleared.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Render the message list and the input control.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<div class=\"chat-messages\">");
        for node in &self.nodes {
            out.push_str(&format!(
                "<div class=\"{}\">{}</div>",
                node.class(),
                node.content.to_html()
            ));
        }
        out.push_str("</div><div class=\"chat-input\">");
        let disabled = if self.input.is_enabled() {
            ""
        } else {
            " disabled=\"disabled\""
        };
        out.push_str(&format!(
            "<input type=\"text\" value=\"{}\"{disabled}><button class=\"{}\"{disabled}></button>",
            escape_html(&self.input_text),
            self.input.button_class(),
        ));
        out.push_str("</div>");
        out
    }
}

impl View for HtmlPanel {
    fn clear(&mut self) {
        self.nodes.clear();
        self.scroll_top = 0;
        self.generation += 1;
    }

    fn append_node(&mut self, role: Role, content: NodeContent) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.push(Node { id, role, content });
        id
    }

    fn append_text(&mut self, node: NodeId, text: &str) -> bool {
        let Some(n) = self.node_mut(node) else {
            return false;
        };
        match &mut n.content {
            NodeContent::Text(s) => s.push_str(text),
            NodeContent::Markup(s) => s.push_str(&escape_html(text)),
        }
        true
    }

    fn replace_markup(&mut self, node: NodeId, markup: String) -> bool {
        let Some(n) = self.node_mut(node) else {
            return false;
        };
        n.content = NodeContent::Markup(markup);
        true
    }

    fn set_input(&mut self, state: InputState) {
        self.input = state;
    }

    fn clear_input(&mut self) {
        self.input_text.clear();
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll_top = self.scroll_height();
    }

    fn scroll_by(&mut self, offset: i64) {
        self.scroll_top = self
            .scroll_top
            .saturating_add(offset)
            .clamp(0, self.scroll_height());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
