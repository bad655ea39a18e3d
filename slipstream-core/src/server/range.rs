//! HTTP range resolution against a growing file.
//!
//! The served file is appended to while requests are in flight, so every
//! range is resolved against the size read from the filesystem at request
//! time, never against a cached or final size.

use std::path::Path;

/// Inclusive byte span within the file's current size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes in the span. Never zero: start <= end by construction.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// How a request's Range header resolves against the current file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No usable Range header: serve the whole current content.
    Full,
    /// Satisfiable span, clamped to the current size.
    Partial(ByteRange),
    /// Start lies beyond the current content.
    Unsatisfiable,
}

/// Resolves an optional `Range` header value against `current_size`.
///
/// Handles the standard `bytes=start-end` form. A missing or malformed
/// header serves the full content; an omitted end, or an end past the
/// current size, clamps to `current_size - 1`.
pub fn resolve_range(header: Option<&str>, current_size: u64) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::Full;
    };
    let Some(spec) = header.strip_prefix("bytes=") else {
        return RangeOutcome::Full;
    };
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return RangeOutcome::Full;
    };

    let last = current_size.saturating_sub(1);
    let start = start_str.parse::<u64>().unwrap_or(0);
    let end = if end_str.is_empty() {
        last
    } else {
        end_str.parse::<u64>().unwrap_or(last).min(last)
    };

    if start >= current_size || start > end {
        return RangeOutcome::Unsatisfiable;
    }

    RangeOutcome::Partial(ByteRange { start, end })
}

/// Content type from the file extension.
///
/// Unknown extensions fall back to video/mp4, which keeps players probing
/// rather than refusing the stream outright.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("wmv") => "video/x-ms-wmv",
        Some("flv") => "video/x-flv",
        Some("webm") => "video/webm",
        Some("mpg") | Some("mpeg") => "video/mpeg",
        Some("ts") | Some("m2ts") => "video/mp2t",
        _ => "video/mp4",
    }
}
