//! Release-notes markdown to Telegram HTML conversion.
//!
//! The rules run in a fixed order; later rules only see the output of earlier
//! ones. The result is checked for properly nested tags before it is handed
//! out, and anything that fails that check is reduced to plain text.
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::warn;

pub const EMPTY_PLACEHOLDER: &str = "No release notes provided.";
pub const TRUNCATION_MARKER: &str = "... (truncated)";
/// Input is cut to this many chars before any rule runs.
pub const INPUT_LIMIT: usize = 2500;
/// Hard ceiling on converted output, marker included.
pub const OUTPUT_LIMIT: usize = 2800;

static HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+)$").expect("header regex"));
static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```([a-zA-Z]*)\n(.*?)```").expect("code block regex"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("inline code regex"));
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("bold regex"));
static STRIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"~~([^~]+)~~").expect("strike regex"));
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\((https?://[^)]+)\)").expect("link regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank lines regex"));
static EMITTED_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)(b|i|s|code|pre|a)\b[^>]*>").expect("tag regex"));
static MARKUP_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[*_`\[\]()~>#+=|{}.!-]").expect("markup chars regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarkupError {
    #[error("closing </{found}> does not match the open tag {expected:?}")]
    Mismatched {
        expected: Option<String>,
        found: String,
    },
    #[error("<{0}> is never closed")]
    Unclosed(String),
}

/// Convert release notes to Telegram HTML. Never fails: input that cannot be
/// converted cleanly comes back as plain text with markup characters removed.
pub fn convert(raw: Option<&str>) -> String {
    let raw = match raw {
        Some(text) if !text.trim().is_empty() => text,
        _ => return EMPTY_PLACEHOLDER.to_string(),
    };

    let text = if raw.chars().count() > INPUT_LIMIT {
        format!("{}{}", take_chars(raw, INPUT_LIMIT), TRUNCATION_MARKER)
    } else {
        raw.to_string()
    };

    match try_convert(&text) {
        Ok(html) => html,
        Err(err) => {
            warn!(%err, "release notes conversion failed; using plain text");
            strip_markup(&text)
        }
    }
}

/// Apply the conversion rules to already length-bounded text.
pub fn try_convert(text: &str) -> Result<String, MarkupError> {
    let text = HEADER.replace_all(text, |caps: &Captures| {
        format!("<b>{}</b>", unwrap_bold(&caps[1]))
    });
    let text = CODE_BLOCK.replace_all(&text, "<pre>${2}</pre>");
    let text = INLINE_CODE.replace_all(&text, "<code>${1}</code>");
    let text = BOLD.replace_all(&text, "<b>${1}</b>");
    let text = convert_italics(&text);
    let text = STRIKE.replace_all(&text, "<s>${1}</s>");
    let text = LINK.replace_all(&text, "<a href=\"${2}\">${1}</a>");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    // Entities already present (&lt; &gt; &amp;) are kept as-is; nothing is re-escaped.
    let mut text = text.trim().to_string();

    if text.chars().count() > OUTPUT_LIMIT {
        let keep = OUTPUT_LIMIT - TRUNCATION_MARKER.chars().count();
        let head = take_chars(&text, keep);
        text = format!("{}{}", drop_partial_tag(head), TRUNCATION_MARKER);
    }

    check_balanced(&text)?;
    Ok(text)
}

/// Plain-text rendition: every markup-significant character removed, capped
/// at `INPUT_LIMIT` chars.
pub fn strip_markup(text: &str) -> String {
    let plain = MARKUP_CHARS.replace_all(text, "");
    take_chars(&plain, INPUT_LIMIT).to_string()
}

/// `# **Title**` would otherwise become `<b><b>Title</b></b>`.
fn unwrap_bold(header: &str) -> &str {
    let trimmed = header.trim_end();
    trimmed
        .strip_prefix("**")
        .and_then(|s| s.strip_suffix("**"))
        .filter(|inner| !inner.is_empty() && !inner.contains('*'))
        .unwrap_or(header)
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `_text_` to `<i>text</i>`, but only when neither underscore touches a word
/// character, so identifiers like `snake_case_name` survive.
fn convert_italics(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '_' && (i == 0 || !is_word(chars[i - 1])) {
            if let Some(offset) = chars[i + 1..].iter().position(|&c| c == '_') {
                let close = i + 1 + offset;
                let word_follows = chars.get(close + 1).is_some_and(|&c| is_word(c));
                if offset > 0 && !word_follows {
                    out.push_str("<i>");
                    out.extend(&chars[i + 1..close]);
                    out.push_str("</i>");
                    i = close + 1;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn check_balanced(text: &str) -> Result<(), MarkupError> {
    let mut open: Vec<&str> = Vec::new();
    for caps in EMITTED_TAG.captures_iter(text) {
        let name = caps.get(2).map_or("", |m| m.as_str());
        if caps[1].is_empty() {
            open.push(name);
            continue;
        }
        match open.pop() {
            Some(top) if top == name => {}
            top => {
                return Err(MarkupError::Mismatched {
                    expected: top.map(str::to_string),
                    found: name.to_string(),
                })
            }
        }
    }
    match open.pop() {
        Some(name) => Err(MarkupError::Unclosed(name.to_string())),
        None => Ok(()),
    }
}

/// Cut a tag left half-written by truncation (`...<a hr`).
fn drop_partial_tag(text: &str) -> &str {
    if let Some(lt) = text.rfind('<') {
        let tail = &text[lt + 1..];
        let looks_like_tag = tail
            .chars()
            .next()
            .is_some_and(|c| c == '/' || c.is_ascii_alphabetic());
        if !tail.contains('>') && looks_like_tag {
            return &text[..lt];
        }
    }
    text
}

fn take_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
