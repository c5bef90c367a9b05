use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use super::{Routing, MAX_CONFLICT_SUFFIX};
use crate::models::Category;

/// Longest filename most filesystems accept (NAME_MAX), in bytes.
pub const MAX_NAME_BYTES: usize = 255;

static UNSAFE_NAME_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w-]").unwrap());

/// Replace everything but word characters and `-` with `_`.
pub fn sanitize_component(raw: &str) -> String {
    UNSAFE_NAME_CHARS.replace_all(raw, "_").into_owned()
}

/// Sanitized base name, never empty.
pub fn sanitize_base_name(raw: &str) -> String {
    let clean = sanitize_component(raw);
    if clean.is_empty() {
        "document".to_string()
    } else {
        clean
    }
}

/// Confidence as a whole percentage, rounded.
pub fn confidence_percent(confidence: f64) -> u32 {
    (confidence.clamp(0.0, 1.0) * 100.0).round() as u32
}

pub fn timestamp(at: NaiveDateTime) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// Filename stem before any conflict suffix. The base is shortened so that
/// every candidate name, up to the last suffix, stays within `MAX_NAME_BYTES`.
pub fn filing_stem(
    base: &str,
    at: NaiveDateTime,
    routing: Routing,
    category: Category,
    confidence: f64,
    extension: &str,
) -> String {
    let ts = timestamp(at);
    let pct = confidence_percent(confidence);
    let tail = match routing {
        Routing::Direct => format!("_{ts}_{pct}pct"),
        Routing::Review => format!("_{ts}_{pct}pct_review"),
        Routing::Uncertain => format!("_{ts}_{category}_{pct}pct"),
    };

    let reserved = tail.len() + format!("_{MAX_CONFLICT_SUFFIX}.").len() + extension.len();
    let mut base = sanitize_base_name(base);
    truncate_on_char_boundary(&mut base, MAX_NAME_BYTES.saturating_sub(reserved));
    base + &tail
}

fn truncate_on_char_boundary(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

/// Candidate name for attempt `suffix`; 0 is the bare stem.
pub fn candidate_name(stem: &str, suffix: u32, extension: &str) -> String {
    match suffix {
        0 => format!("{stem}.{extension}"),
        n => format!("{stem}_{n}.{extension}"),
    }
}
