//! Terminal session loop.
//!
//! One task owns the renderer and feeds it transport events and input lines
//! in arrival order. Lines typed while a reply is pending (or before the
//! socket opens) are queued and sent one at a time once the renderer is idle,
//! so piping a file of questions works as well as typing them.

use std::collections::VecDeque;
use std::io::{self, Write};

use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::Result;
use crate::format::Formatter;
use crate::message::{Conversation, RenderState, Role};
use crate::renderer::StreamingChatRenderer;
use crate::transport::{Transport, TransportEvent};
use crate::view::{HtmlPanel, InputState};

/// Typing this line ends the session.
pub const QUIT_COMMAND: &str = "/quit";

/// Lines from stdin.
pub fn stdin_lines() -> impl Stream<Item = io::Result<String>> + Unpin {
    LinesStream::new(BufReader::new(tokio::io::stdin()).lines())
}

// ---------------------------------------------------------------------------
// Transcript printer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    /// Bytes of raw streamed text already written.
    bytes: usize,
    done: bool,
}

/// Writes panel changes to a terminal incrementally.
///
/// Streamed chunks are printed raw as they arrive. When a streamed message
/// completes, its node's formatted content follows if it differs from the raw
/// text. Messages that are already complete when first seen print their node
/// content directly. A new panel generation (reconnect) starts a fresh
/// transcript.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    generation: Option<u64>,
    progress: Vec<Progress>,
}

impl TranscriptPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_updates<W: Write>(
        &mut self,
        conversation: &Conversation,
        panel: &HtmlPanel,
        out: &mut W,
    ) -> io::Result<()> {
        let generation = panel.generation();
        if self.generation != Some(generation) {
            if self.generation.is_some() {
                writeln!(out, "{}", "── reconnected ──".dimmed())?;
            }
            self.generation = Some(generation);
            self.progress.clear();
        }

        // The renderer appends one node per message, in the same order.
        for (i, (msg, node)) in conversation
            .messages()
            .iter()
            .zip(panel.nodes())
            .enumerate()
        {
            if i >= self.progress.len() {
                write!(out, "{} ", role_label(msg.role))?;
                self.progress.push(Progress::default());
            }
            let p = &mut self.progress[i];
            if p.done {
                continue;
            }
            let content = node.content.as_str();
            let complete = msg.render_state == RenderState::Complete;

            if complete && p.bytes == 0 {
                writeln!(out, "{}", content.trim_end())?;
                p.done = true;
                continue;
            }
            // Text only ever grows by whole chunks, so `bytes` is a char boundary.
            if msg.text.len() > p.bytes {
                write!(out, "{}", &msg.text[p.bytes..])?;
                p.bytes = msg.text.len();
            }
            if complete {
                writeln!(out)?;
                if content != msg.text {
                    writeln!(out, "{}", content.trim_end())?;
                }
                p.done = true;
            }
        }
        out.flush()
    }
}

fn role_label(role: Role) -> ColoredString {
    match role {
        Role::User => "you ›".bright_cyan().bold(),
        Role::Assistant => "ai  ›".bright_magenta().bold(),
        Role::System => "!!  ›".yellow().bold(),
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Drive `renderer` until the transport closes, the user quits, or input ends
/// with no reply outstanding.
pub async fn run<T, F, I, W>(
    renderer: &mut StreamingChatRenderer<T, HtmlPanel, F>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    mut input: I,
    out: &mut W,
) -> Result<()>
where
    T: Transport,
    F: Formatter,
    I: Stream<Item = io::Result<String>> + Unpin,
    W: Write,
{
    let mut printer = TranscriptPrinter::new();
    let mut queued: VecDeque<String> = VecDeque::new();
    let mut input_open = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(TransportEvent::Open) => renderer.on_connection_open(),
                    Some(TransportEvent::Payload(payload)) => {
                        renderer.on_payload(&payload);
                    }
                    Some(TransportEvent::Error(err)) => renderer.on_transport_error(&err),
                    Some(TransportEvent::Closed) | None => {
                        renderer.on_connection_closed();
                        printer.render_updates(renderer.conversation(), renderer.view(), out)?;
                        return Ok(());
                    }
                }
            }

            line = input.next(), if input_open => {
                match line {
                    Some(Ok(line)) => {
                        if line.trim() == QUIT_COMMAND {
                            debug!("quit requested");
                            return Ok(());
                        }
                        if !line.trim().is_empty() {
                            queued.push_back(line);
                        }
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => input_open = false,
                }
            }
        }

        if is_idle(renderer) {
            if let Some(line) = queued.pop_front() {
                renderer.view_mut().set_input_text(line.as_str());
                if let Err(err) = renderer.on_user_send(&line) {
                    warn!(error = %err, "failed to send message");
                }
            }
        }

        printer.render_updates(renderer.conversation(), renderer.view(), out)?;

        if !input_open && queued.is_empty() && is_idle(renderer) {
            debug!("input finished and no reply pending");
            return Ok(());
        }
    }
}

/// Connected, not waiting for a reply, nothing streaming.
fn is_idle<T: Transport, F: Formatter>(renderer: &StreamingChatRenderer<T, HtmlPanel, F>) -> bool {
    renderer.is_connected()
        && renderer.active_stream().is_none()
        && renderer.view().input_state() == InputState::Ready
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{NodeContent, View};

    fn bracket(raw: &str) -> String {
        format!("[{raw}]")
    }

    #[test]
    fn test_printer_streams_deltas_then_formatted_content() {
        let mut conv = Conversation::new();
        let mut panel = HtmlPanel::new();
        let mut printer = TranscriptPrinter::new();
        let mut out = Vec::new();

        let idx = conv.begin_stream("Hel").unwrap();
        let node = panel.append_node(Role::Assistant, NodeContent::Text("Hel".into()));
        printer.render_updates(&conv, &panel, &mut out).unwrap();
        conv.append_chunk(idx, "lo");
        panel.append_text(node, "lo");
        printer.render_updates(&conv, &panel, &mut out).unwrap();
        let text = conv.finish_stream(idx).unwrap();
        panel.replace_markup(node, bracket(text));
        printer.render_updates(&conv, &panel, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Hel").count(), 2);
        assert!(text.contains("Hello\n"));
        assert!(text.ends_with("[Hello]\n"));
    }

    #[test]
    fn test_printer_skips_formatted_copy_when_identical() {
        let mut conv = Conversation::new();
        let mut panel = HtmlPanel::new();
        let mut printer = TranscriptPrinter::new();
        let mut out = Vec::new();

        let idx = conv.begin_stream("plain").unwrap();
        let node = panel.append_node(Role::Assistant, NodeContent::Text("plain".into()));
        printer.render_updates(&conv, &panel, &mut out).unwrap();
        let text = conv.finish_stream(idx).unwrap().to_string();
        panel.replace_markup(node, text);
        printer.render_updates(&conv, &panel, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("plain").count(), 1);
    }

    #[test]
    fn test_printer_prints_node_content_of_complete_messages() {
        let mut conv = Conversation::new();
        let mut panel = HtmlPanel::new();
        conv.push_complete(Role::Assistant, "full reply");
        panel.append_node(Role::Assistant, NodeContent::Markup(bracket("full reply")));
        let mut printer = TranscriptPrinter::new();
        let mut out = Vec::new();
        printer.render_updates(&conv, &panel, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("[full reply]\n"));
    }

    #[test]
    fn test_printer_does_not_repeat_completed_messages() {
        let mut conv = Conversation::new();
        let mut panel = HtmlPanel::new();
        conv.push_complete(Role::User, "question");
        panel.append_node(Role::User, NodeContent::Text("question".into()));
        let mut printer = TranscriptPrinter::new();
        let mut out = Vec::new();
        printer.render_updates(&conv, &panel, &mut out).unwrap();
        printer.render_updates(&conv, &panel, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("question").count(), 1);
    }

    #[test]
    fn test_printer_restarts_on_new_generation() {
        let mut conv = Conversation::new();
        let mut panel = HtmlPanel::new();
        conv.push_complete(Role::Assistant, "greeting");
        panel.append_node(Role::Assistant, NodeContent::Markup("greeting".into()));
        let mut printer = TranscriptPrinter::new();
        let mut out = Vec::new();
        printer.render_updates(&conv, &panel, &mut out).unwrap();

        panel.clear();
        panel.append_node(Role::Assistant, NodeContent::Markup("greeting".into()));
        printer.render_updates(&conv, &panel, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("greeting").count(), 2);
        assert!(text.contains("reconnected"));
    }
}
