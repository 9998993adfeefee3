//! Parse-or-degrade handling for model output that is supposed to be JSON.

use serde::de::DeserializeOwned;

const EXCERPT_CHARS: usize = 200;

/// Strips a surrounding Markdown code fence (with an optional language tag) and whitespace.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) if !rest[..newline].contains('{') => &rest[newline + 1..],
        _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    let body = match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim()
}

/// Attempts to deserialize `raw` as `T`, tolerating code fences and surrounding prose.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let body = strip_code_fences(raw);
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(err) => match (body.find('{'), body.rfind('}')) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str(&body[start..=end]).map_err(|_| err)
            }
            _ => Err(err),
        },
    }
}

/// Parses `raw` as the wire shape `W` and converts it with `build`.
///
/// When the text is not valid JSON, or `build` rejects the parsed value, the anomaly is logged
/// and `fallback` is called with the (fence-stripped) raw text instead. `what` names the
/// producer for the log line.
pub fn parse_or_degrade<W, T>(
    raw: &str,
    what: &str,
    build: impl FnOnce(W) -> Option<T>,
    fallback: impl FnOnce(&str) -> T,
) -> T
where
    W: DeserializeOwned,
{
    match parse_json::<W>(raw) {
        Ok(wire) => match build(wire) {
            Some(value) => value,
            None => {
                tracing::warn!("{} returned unusable output, degrading: {}", what, excerpt(raw));
                fallback(strip_code_fences(raw))
            }
        },
        Err(e) => {
            tracing::warn!(
                "{} returned non-JSON output ({}), degrading: {}",
                what,
                e,
                excerpt(raw)
            );
            fallback(strip_code_fences(raw))
        }
    }
}

/// Truncates `text` to at most `EXCERPT_CHARS` characters for logging.
pub fn excerpt(text: &str) -> &str {
    truncate_chars(text, EXCERPT_CHARS)
}

/// Truncates on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
