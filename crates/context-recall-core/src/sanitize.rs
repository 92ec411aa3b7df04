//! Text sanitization and truncation applied before every embedding call.

use crate::error::{RecallError, Result};

/// Marker appended to text cut down to the character budget.
pub const TRUNCATION_MARKER: &str = "...";

/// Clean text for an embedding provider.
///
/// Strips control characters (keeping `\n`, `\t`, `\r` until whitespace
/// collapsing), byte-order marks, and zero-width characters, then
/// collapses every whitespace run to a single space and trims the ends.
///
/// # Errors
///
/// [`RecallError::Validation`] if nothing remains after cleaning.
pub fn sanitize_text(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if is_invisible(c) {
            continue;
        }
        if c.is_control() && !matches!(c, '\n' | '\t' | '\r') {
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    if out.is_empty() {
        return Err(RecallError::validation(
            "cannot embed empty text (nothing left after sanitization)",
        ));
    }
    Ok(out)
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{180E}'
    )
}

/// Cut `text` to at most `max_chars` characters, ending with
/// [`TRUNCATION_MARKER`] when anything was removed.
///
/// Returns the (possibly shortened) text and whether truncation happened.
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    let len = text.chars().count();
    if len <= max_chars {
        return (text.to_string(), false);
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return (text.chars().take(max_chars).collect(), true);
    }
    let mut out: String = text.chars().take(max_chars - marker_len).collect();
    out.push_str(TRUNCATION_MARKER);
    (out, true)
}
