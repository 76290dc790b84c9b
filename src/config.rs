//! Client configuration.
//!
//! Settings come from an optional TOML file, then CLI flags override them:
//!
//! ```toml
//! page_url = "https://dash.example.com/dashboard"
//! ranges = "2024-01-01-2024-01-31"
//! greeting = "Ask me about your sleep data."
//! scroll_nudge = 100
//! markdown = true
//!
//! [reconnect]
//! max_retries = 5
//! initial_delay_ms = 500
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::error::{ChatError, Result};
use crate::renderer::{RendererOptions, DEFAULT_GREETING, DEFAULT_SCROLL_NUDGE};
use crate::transport::{endpoint_url, ReconnectPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Full socket URL. Takes precedence over `page_url` + `ranges`.
    pub url: Option<String>,
    /// Dashboard page the socket URL is derived from.
    pub page_url: Option<String>,
    /// Date ranges in `YYYY-MM-DD-YYYY-MM-DD` form.
    pub ranges: Option<String>,
    pub greeting: String,
    pub scroll_nudge: i64,
    /// Format completed replies as markdown.
    pub markdown: bool,
    /// Let raw HTML in replies through the markdown formatter.
    pub allow_html: bool,
    pub reconnect: ReconnectPolicy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: None,
            page_url: None,
            ranges: None,
            greeting: DEFAULT_GREETING.to_string(),
            scroll_nudge: DEFAULT_SCROLL_NUDGE,
            markdown: true,
            allow_html: true,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ChatConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ChatError::Config(e.to_string()))
    }

    /// Read a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text)
                .map_err(|e| ChatError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overlay CLI flags on top of file values.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(url) = &args.url {
            self.url = Some(url.clone());
        }
        if let Some(page_url) = &args.page_url {
            self.page_url = Some(page_url.clone());
        }
        if let Some(ranges) = &args.ranges {
            self.ranges = Some(ranges.clone());
        }
        if let Some(greeting) = &args.greeting {
            self.greeting = greeting.clone();
        }
        if args.plain {
            self.markdown = false;
        }
        if let Some(max_retries) = args.max_retries {
            self.reconnect.max_retries = max_retries;
        }
    }

    /// The socket URL to dial.
    pub fn endpoint(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        match (&self.page_url, &self.ranges) {
            (Some(page_url), Some(ranges)) => endpoint_url(page_url, ranges),
            _ => Err(ChatError::Config(
                "set either `url`, or both `page_url` and `ranges`".to_string(),
            )),
        }
    }

    pub fn renderer_options(&self) -> RendererOptions {
        RendererOptions {
            greeting: self.greeting.clone(),
            scroll_nudge: self.scroll_nudge,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
