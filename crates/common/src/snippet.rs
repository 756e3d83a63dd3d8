//! Failure snippet extraction
//!
//! Turns raw assertion/runner error text (ANSI colours, multi-line stack
//! traces) into a short excerpt suitable for a chat message. Extraction never
//! fails: unusable input degrades to the first line, and no input at all to an
//! empty string which callers treat as "nothing to report".

use once_cell::sync::Lazy;
use regex::Regex;

/// Cap for snippets posted into the run thread
pub const THREAD_SNIPPET_LIMIT: usize = 1400;

/// Cap for one-line action and transport errors
pub const SHORT_ERROR_LIMIT: usize = 200;

/// Cap for serialized GraphQL error payloads
pub const GRAPHQL_ERROR_LIMIT: usize = 400;

static ANSI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("static regex"));

static ERROR_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Error:.*$").expect("static regex"));

static EXPECTED_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Expected:.*$").expect("static regex"));

static RECEIVED_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Received:.*$").expect("static regex"));

/// Blank line, stack frame (`    at foo.js:10`) or runner tick line
static BLOCK_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{2,}|\n[ \t]*at\s|\n[ \t]*✓").expect("static regex"));

/// Remove ANSI colour sequences
pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}

/// Extract a compact snippet from one or more raw error texts.
///
/// Preference order:
/// 1. `Error:` line together with `Expected:`/`Received:` lines
/// 2. the block starting at `Expected:` up to a blank line or stack frame
/// 3. the first non-blank line
pub fn extract_snippet<S: AsRef<str>>(errors: &[S]) -> String {
    let messages: Vec<String> = errors
        .iter()
        .map(|e| strip_ansi(e.as_ref()).trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();

    let Some(first) = messages.first() else {
        return String::new();
    };

    for msg in &messages {
        if let Some(trio) = error_expected_received(msg) {
            return trio;
        }
    }

    for msg in &messages {
        if let Some(block) = expected_block(msg) {
            return block;
        }
    }

    first_non_blank_line(first)
        .unwrap_or(first.as_str())
        .to_string()
}

fn line_of(re: &Regex, msg: &str) -> Option<String> {
    re.find(msg).map(|m| m.as_str().trim_end().to_string())
}

fn error_expected_received(msg: &str) -> Option<String> {
    let error = line_of(&ERROR_LINE_RE, msg)?;
    let expected = line_of(&EXPECTED_LINE_RE, msg);
    let received = line_of(&RECEIVED_LINE_RE, msg);
    if expected.is_none() && received.is_none() {
        return None;
    }
    let parts: Vec<String> = [Some(error), expected, received].into_iter().flatten().collect();
    Some(parts.join("\n"))
}

fn expected_block(msg: &str) -> Option<String> {
    let idx = msg.find("Expected:")?;
    let slice = &msg[idx..];
    let end = BLOCK_END_RE
        .find(slice)
        .map(|m| m.start())
        .unwrap_or(slice.len());
    Some(slice[..end].trim_end().to_string())
}

/// First line that is not whitespace-only
pub fn first_non_blank_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Short one-line form of an error, used as a page's "last error"
pub fn short_error(text: &str) -> String {
    let clean = strip_ansi(text);
    let line = first_non_blank_line(&clean).unwrap_or_default();
    truncate_snippet(line, SHORT_ERROR_LIMIT)
}

/// Cap `text` at `max_chars` characters, marking the cut with `…`
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}
