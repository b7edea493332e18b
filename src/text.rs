//! Plain-text normalization for fetched values.
//!
//! Backends hand back titles and attribute values that may carry HTML
//! markup or entities, and some SOAP servers base64-encode strings their
//! transport cannot represent. Everything shown to a user goes through
//! here first.

use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use scraper::Html;

static BASE64_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9+/]+={0,2}$").expect("valid base64 pattern"));

/// Strip markup from `html`, decode entities, and collapse whitespace.
///
/// Each tag boundary is replaced with `tag_replace` (use `""` to glue
/// adjacent text together, `" "` to keep words apart).
pub fn html_to_text(html: &str, tag_replace: &str) -> String {
    if !html.contains(['<', '&']) {
        return collapse_whitespace(html);
    }
    let fragment = Html::parse_fragment(html);
    let joined = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(tag_replace);
    collapse_whitespace(&joined)
}

/// Trim and squeeze every whitespace run into a single space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `text` looks like base64: only the base64 alphabet, at most two
/// `=` of padding, and a length that is a multiple of four.
pub fn is_base64(text: &str) -> bool {
    !text.is_empty() && text.len() % 4 == 0 && BASE64_RE.is_match(text)
}

/// Decode base64 into UTF-8 text. `None` if either step fails.
pub fn decode_base64(text: &str) -> Option<String> {
    let bytes = STANDARD.decode(text).ok()?;
    String::from_utf8(bytes).ok()
}

/// Decode `text` only when it passes [`is_base64`] and decodes to valid
/// UTF-8; anything else is returned untouched.
pub fn maybe_decode_base64(text: &str) -> String {
    if is_base64(text) {
        if let Some(decoded) = decode_base64(text) {
            return decoded;
        }
    }
    text.to_string()
}

/// Truncate to at most `max` characters, ending in `...` when cut.
/// Budgets too small for the marker get a bare prefix instead.
pub fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max < 3 {
        return text.chars().take(max).collect();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
