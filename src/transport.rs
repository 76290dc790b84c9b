//! WebSocket transport with reconnect-with-backoff.
//!
//! ## Design
//! - [`WsTransport`] is the renderer-facing half: `send` pushes raw user text
//!   onto an unbounded channel and never blocks.
//! - A supervisor task owns the socket. It multiplexes outbound text and
//!   inbound frames with `tokio::select!` and reports everything on a single
//!   [`TransportEvent`] channel, so the owner sees events in arrival order.
//! - When the socket drops, the supervisor reports the error, sleeps per
//!   [`ReconnectPolicy`], and dials again. A fresh `Open` follows every
//!   successful reconnect.
//! - A session that closes before it has been up for `stable_after_ms` counts
//!   as a failure, so a server that accepts and immediately hangs up still
//!   sees growing delays and an eventual `Closed`.
//! - Text queued while no socket was open is discarded before the next `Open`;
//!   the panel it was typed into is gone by then.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};

/// Outbound half of a chat connection.
pub trait Transport {
    /// Transmit raw user text.
    fn send(&mut self, text: &str) -> Result<()>;
}

impl Transport for mpsc::UnboundedSender<String> {
    fn send(&mut self, text: &str) -> Result<()> {
        mpsc::UnboundedSender::send(self, text.to_string())
            .map_err(|_| ChatError::Connection("transport task has stopped".to_string()))
    }
}

/// Something that happened on the connection.
#[derive(Debug)]
pub enum TransportEvent {
    /// Socket (re)opened.
    Open,
    /// One text payload from the server, undecoded.
    Payload(String),
    /// The socket failed or could not be opened. A reconnect may follow.
    Error(ChatError),
    /// Retries exhausted; no further events will arrive.
    Closed,
}

// ---------------------------------------------------------------------------
// Endpoint derivation
// ---------------------------------------------------------------------------

/// Derive the chat socket URL from the dashboard page location.
///
/// `http` maps to `ws`, `https` to `wss`; host and port are kept and the path
/// becomes `/chat/` followed by `ranges` with every `-` turned into `/`:
///
/// ```
/// use chat_stream_renderer::transport::endpoint_url;
/// let url = endpoint_url("https://dash.example.com/dashboard", "2024-01-01-2024-01-31").unwrap();
/// assert_eq!(url, "wss://dash.example.com/chat/2024/01/01/2024/01/31");
/// ```
pub fn endpoint_url(page_url: &str, ranges: &str) -> Result<String> {
    let page = url::Url::parse(page_url)
        .map_err(|e| ChatError::Config(format!("invalid page url '{page_url}': {e}")))?;

    let scheme = match page.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(ChatError::Config(format!(
                "unsupported page scheme '{other}' (expected http or https)"
            )))
        }
    };

    let host = page
        .host_str()
        .ok_or_else(|| ChatError::Config(format!("page url '{page_url}' has no host")))?;

    let ranges = ranges.trim().trim_matches('-');
    if ranges.is_empty() {
        return Err(ChatError::Config("date ranges must not be empty".to_string()));
    }

    let port = page.port().map(|p| format!(":{p}")).unwrap_or_default();
    Ok(format!(
        "{scheme}://{host}{port}/chat/{}",
        ranges.replace('-', "/")
    ))
}

// ---------------------------------------------------------------------------
// Reconnect policy
// ---------------------------------------------------------------------------

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Consecutive failed dials or short-lived sessions before giving up.
    /// `0` disables reconnecting.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Upper bound of the random extra delay added to each wait.
    pub jitter_ms: u64,
    /// A session must stay open this long to reset the failure count.
    pub stable_after_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_ms: 250,
            stable_after_ms: 10_000,
        }
    }
}

impl ReconnectPolicy {
    /// Deterministic part of the wait before attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay = (self.initial_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// [`delay_for`](Self::delay_for) plus uniform jitter in `0..=jitter_ms`.
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        self.delay_for(attempt) + Duration::from_millis(jitter)
    }

    /// Failure count after a session that stayed open for `uptime` dropped.
    pub fn failures_after_drop(&self, consecutive_failures: u32, uptime: Duration) -> u32 {
        if uptime >= Duration::from_millis(self.stable_after_ms) {
            1
        } else {
            consecutive_failures.saturating_add(1)
        }
    }
}

// ---------------------------------------------------------------------------
// WebSocket client
// ---------------------------------------------------------------------------

/// Renderer-facing handle to a supervised WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<String>,
}

impl WsTransport {
    /// Spawn the connection supervisor for `url`.
    ///
    /// Returns the send handle and the event receiver. Must be called inside
    /// a tokio runtime. Dropping every `WsTransport` clone closes the socket.
    pub fn connect(
        url: impl Into<String>,
        policy: ReconnectPolicy,
    ) -> (WsTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(supervise(url.into(), policy, outbound_rx, events_tx));
        (WsTransport { outbound: outbound_tx }, events_rx)
    }
}

impl Transport for WsTransport {
    fn send(&mut self, text: &str) -> Result<()> {
        Transport::send(&mut self.outbound, text)
    }
}

/// Why a live session ended.
enum SessionEnd {
    /// Socket failed; try again.
    Dropped(ChatError),
    /// Nobody is listening any more; stop for good.
    Shutdown,
}

async fn supervise(
    url: String,
    policy: ReconnectPolicy,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut consecutive_failures: u32 = 0;

    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws_stream, _response)) => {
                let stale = discard_pending(&mut outbound_rx);
                if stale > 0 {
                    debug!(url = %url, stale, "discarded text queued while disconnected");
                }
                info!(url = %url, "chat socket open");
                if events_tx.send(TransportEvent::Open).is_err() {
                    return;
                }
                let opened = Instant::now();
                match run_session(ws_stream, &mut outbound_rx, &events_tx).await {
                    SessionEnd::Shutdown => {
                        debug!(url = %url, "chat transport shut down");
                        return;
                    }
                    SessionEnd::Dropped(e) => {
                        let uptime = opened.elapsed();
                        consecutive_failures =
                            policy.failures_after_drop(consecutive_failures, uptime);
                        warn!(
                            error = %e,
                            url = %url,
                            uptime_ms = uptime.as_millis() as u64,
                            consecutive_failures,
                            "chat socket dropped"
                        );
                        if events_tx.send(TransportEvent::Error(e)).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                warn!(
                    error = %e,
                    url = %url,
                    consecutive_failures,
                    "chat socket connect failed"
                );
                if events_tx.send(TransportEvent::Error(e.into())).is_err() {
                    return;
                }
            }
        }

        if consecutive_failures >= policy.max_retries {
            info!(url = %url, consecutive_failures, "giving up on chat socket");
            let _ = events_tx.send(TransportEvent::Closed);
            return;
        }

        let delay = policy.delay_with_jitter(consecutive_failures);
        debug!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
        tokio::time::sleep(delay).await;
    }
}

/// Drop whatever was sent while no socket was open. Returns how many lines.
fn discard_pending(outbound_rx: &mut mpsc::UnboundedReceiver<String>) -> usize {
    let mut count = 0;
    while outbound_rx.try_recv().is_ok() {
        count += 1;
    }
    count
}

async fn run_session<S>(
    ws_stream: tokio_tungstenite::WebSocketStream<S>,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    events_tx: &mpsc::UnboundedSender<TransportEvent>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            inbound = ws_stream.next() => {
                let event = match inbound {
                    Some(Ok(WsMessage::Text(text))) => TransportEvent::Payload(text),
                    Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => TransportEvent::Payload(text),
                        Err(e) => TransportEvent::Error(ChatError::FrameParse {
                            detail: format!("binary frame is not UTF-8: {e}"),
                            payload: String::new(),
                        }),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return SessionEnd::Dropped(ChatError::Connection(
                            "closed by server".to_string(),
                        ));
                    }
                    Some(Ok(_)) => continue, // ping / pong / raw frames
                    Some(Err(e)) => return SessionEnd::Dropped(e.into()),
                };
                if events_tx.send(event).is_err() {
                    let _ = ws_sink.close().await;
                    return SessionEnd::Shutdown;
                }
            }

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(text) => {
                        if let Err(e) = ws_sink.send(WsMessage::Text(text)).await {
                            return SessionEnd::Dropped(e.into());
                        }
                    }
                    None => {
                        let _ = ws_sink.close().await;
                        return SessionEnd::Shutdown;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
