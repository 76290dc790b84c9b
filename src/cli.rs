use clap::Parser;
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chat-stream")]
#[command(version)]
#[command(about = "Terminal client for the dashboard's streaming AI chat")]
pub struct Args {
    /// Full WebSocket URL (e.g. ws://localhost:8080/chat/2024/01/01/2024/01/31)
    #[arg(long)]
    pub url: Option<String>,

    /// Dashboard page URL the socket endpoint is derived from
    #[arg(long)]
    pub page_url: Option<String>,

    /// Date ranges shown on the dashboard, as YYYY-MM-DD-YYYY-MM-DD
    #[arg(long)]
    pub ranges: Option<String>,

    /// Path to a TOML config file
    #[arg(long, short, default_value = "chat-stream.toml")]
    pub config: PathBuf,

    /// Greeting shown when the connection opens
    #[arg(long)]
    pub greeting: Option<String>,

    /// Show replies as plain text instead of rendering markdown
    #[arg(long)]
    pub plain: bool,

    /// Consecutive reconnect attempts before giving up (0 disables)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Print the final panel as HTML when the session ends
    #[arg(long)]
    pub dump_html: bool,

    /// Print shell completions and exit
    #[arg(long, value_enum)]
    pub completions: Option<Shell>,
}
