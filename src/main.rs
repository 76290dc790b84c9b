use clap::{CommandFactory, Parser};
use colored::*;
use std::io;
use tracing_subscriber::EnvFilter;

use chat_stream_renderer::cli::Args;
use chat_stream_renderer::config::ChatConfig;
use chat_stream_renderer::format::{Formatter, MarkdownFormatter, PlainFormatter};
use chat_stream_renderer::renderer::StreamingChatRenderer;
use chat_stream_renderer::session;
use chat_stream_renderer::transport::WsTransport;
use chat_stream_renderer::view::HtmlPanel;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(shell) = args.completions {
        clap_complete::generate(shell, &mut Args::command(), "chat-stream", &mut io::stdout());
        return Ok(());
    }

    // Logs go to stderr so they don't interleave with the transcript.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = ChatConfig::load(&args.config)?;
    config.apply_args(&args);
    let url = config.endpoint()?;

    eprintln!("{} {}", "connecting to".dimmed(), url.bright_blue());

    let markdown = MarkdownFormatter {
        allow_html: config.allow_html,
        ..MarkdownFormatter::default()
    };
    let use_markdown = config.markdown;
    let formatter = move |raw: &str| {
        if use_markdown {
            markdown.format(raw)
        } else {
            PlainFormatter.format(raw)
        }
    };

    let (transport, events) = WsTransport::connect(url, config.reconnect.clone());
    let mut renderer = StreamingChatRenderer::with_options(
        transport,
        HtmlPanel::new(),
        formatter,
        config.renderer_options(),
    );

    let mut stdout = io::stdout();
    session::run(&mut renderer, events, session::stdin_lines(), &mut stdout).await?;

    if args.dump_html {
        println!("{}", renderer.view().to_html());
    }

    Ok(())
}
