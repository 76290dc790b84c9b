//! Rich-text formatting applied to completed assistant messages.
//!
//! Formatting only ever runs on fully accumulated text. Partial chunks are
//! shown raw because markdown is not stable under truncation (an unclosed
//! code fence swallows the rest of the message).

use pulldown_cmark::{html, Event, LinkType, Options, Parser, Tag};

/// Pure `raw text -> markup` conversion.
pub trait Formatter {
    fn format(&self, raw: &str) -> String;
}

impl<F: Fn(&str) -> String> Formatter for F {
    fn format(&self, raw: &str) -> String {
        self(raw)
    }
}

/// Markdown to HTML via pulldown-cmark.
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    /// Pass inline/block HTML through untouched. The server embeds `<br>` in
    /// its own notices, so this is on by default.
    pub allow_html: bool,
    /// Open links in a new tab.
    pub links_in_new_tab: bool,
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self {
            allow_html: true,
            links_in_new_tab: true,
        }
    }
}

impl MarkdownFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    fn options() -> Options {
        let mut opts = Options::empty();
        opts.insert(Options::ENABLE_TABLES);
        opts.insert(Options::ENABLE_STRIKETHROUGH);
        opts.insert(Options::ENABLE_FOOTNOTES);
        opts.insert(Options::ENABLE_TASKLISTS);
        opts.insert(Options::ENABLE_HEADING_ATTRIBUTES);
        opts
    }
}

impl Formatter for MarkdownFormatter {
    fn format(&self, raw: &str) -> String {
        let allow_html = self.allow_html;
        let new_tab = self.links_in_new_tab;
        let parser = Parser::new_ext(raw, Self::options()).map(|event| match event {
            Event::Html(h) if !allow_html => Event::Text(h),
            Event::InlineHtml(h) if !allow_html => Event::Text(h),
            // The matching `End` still renders as `</a>`.
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                ..
            }) if new_tab => Event::InlineHtml(new_tab_anchor(link_type, &dest_url, &title).into()),
            other => other,
        });

        let mut out = String::with_capacity(raw.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

/// Opening `<a>` tag for a markdown link that opens in a new tab.
fn new_tab_anchor(link_type: LinkType, dest_url: &str, title: &str) -> String {
    let scheme = if link_type == LinkType::Email { "mailto:" } else { "" };
    let mut tag = format!(
        "<a target=\"_blank\" href=\"{scheme}{}\"",
        escape_html(dest_url)
    );
    if !title.is_empty() {
        tag.push_str(&format!(" title=\"{}\"", escape_html(title)));
    }
    tag.push('>');
    tag
}

/// Identity formatter, used when markdown rendering is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormatter;

impl Formatter for PlainFormatter {
    fn format(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// Escape text for insertion into HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
