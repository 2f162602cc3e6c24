//! Lightweight markdown for message bodies.
//!
//! Supports `**bold**`, list lines starting with `* ` or `- `, and `[n]`
//! citation anchors that resolve against the message's sources.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{Citation, Message};

static INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*|\[(\d+)\]").expect("inline pattern is valid"));

/// A run of text within a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    /// Plain text.
    Text(String),
    /// Strong emphasis.
    Bold(String),
    /// Anchor to the 1-based source `number`.
    Citation {
        /// Number as written in the text.
        number: usize,
    },
}

/// One rendered line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Ordinary line.
    Paragraph(Vec<Inline>),
    /// Bulleted line with the marker removed.
    ListItem(Vec<Inline>),
}

/// Split a message body into blocks, one per line.
///
/// Citation anchors are only produced for AI messages and only when the
/// number points at an existing source; anything else stays literal text.
pub fn render(message: &Message) -> Vec<Block> {
    let sources = if message.is_ai() {
        message.sources.len()
    } else {
        0
    };

    message
        .content
        .split('\n')
        .map(|line| {
            let trimmed = line.trim_start();
            match trimmed
                .strip_prefix("* ")
                .or_else(|| trimmed.strip_prefix("- "))
            {
                Some(item) => Block::ListItem(inlines(item, sources)),
                None => Block::Paragraph(inlines(line, sources)),
            }
        })
        .collect()
}

fn inlines(line: &str, sources: usize) -> Vec<Inline> {
    let mut out = Vec::new();
    let mut text = String::new();
    let mut cursor = 0;

    for caps in INLINE.captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        text.push_str(&line[cursor..whole.start()]);
        cursor = whole.end();

        if let Some(bold) = caps.get(1) {
            flush(&mut out, &mut text);
            out.push(Inline::Bold(bold.as_str().to_string()));
            continue;
        }

        match caps.get(2).and_then(|n| n.as_str().parse::<usize>().ok()) {
            Some(number) if number >= 1 && number <= sources => {
                flush(&mut out, &mut text);
                out.push(Inline::Citation { number });
            }
            _ => text.push_str(whole.as_str()),
        }
    }

    text.push_str(&line[cursor..]);
    flush(&mut out, &mut text);
    out
}

fn flush(out: &mut Vec<Inline>, text: &mut String) {
    if !text.is_empty() {
        out.push(Inline::Text(std::mem::take(text)));
    }
}

/// Numbered source lines, `[1] Title`.
pub fn source_lines(sources: &[Citation]) -> Vec<String> {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| format!("[{}] {} <{}>", i + 1, source.title, source.uri))
        .collect()
}

/// Plain-terminal rendering of a message body
pub fn to_terminal(message: &Message) -> String {
    render(message)
        .iter()
        .map(|block| match block {
            Block::Paragraph(parts) => join(parts),
            Block::ListItem(parts) => format!("  • {}", join(parts)),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn join(parts: &[Inline]) -> String {
    parts
        .iter()
        .map(|part| match part {
            Inline::Text(text) => text.clone(),
            Inline::Bold(text) => format!("\x1b[1m{}\x1b[0m", text),
            Inline::Citation { number } => format!("[{}]", number),
        })
        .collect()
}
