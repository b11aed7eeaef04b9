use std::path::Path;

/// Detects a content type from a source locator's file extension.
///
/// Returns `None` for unknown or missing extensions; registration treats
/// that as an unclassifiable source rather than guessing a fallback.
pub fn classify_content_type(source: &str) -> Option<&'static str> {
    let ext = Path::new(source)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("webp") => Some("image/webp"),
        Some("gif") => Some("image/gif"),
        Some("ico") => Some("image/x-icon"),
        Some("svg") => Some("image/svg+xml"),
        Some("mp4") => Some("video/mp4"),
        Some("mov") => Some("video/quicktime"),
        Some("webm") => Some("video/webm"),
        Some("mkv") => Some("video/x-matroska"),
        Some("mp3") => Some("audio/mpeg"),
        Some("wav") => Some("audio/wav"),
        Some("ogg") => Some("audio/ogg"),
        Some("flac") => Some("audio/flac"),
        Some("m4a") => Some("audio/mp4"),
        Some("pdf") => Some("application/pdf"),
        Some("json") => Some("application/json"),
        Some("xml") => Some("application/xml"),
        Some("zip") => Some("application/zip"),
        Some("gz") => Some("application/gzip"),
        Some("txt") => Some("text/plain"),
        Some("md") => Some("text/markdown"),
        Some("csv") => Some("text/csv"),
        Some("html") => Some("text/html"),
        _ => None,
    }
}

/// Returns the primary segment of a content type (`"image/png"` → `"image"`).
///
/// Used by destination policies that partition objects by kind.
pub fn primary_type_segment(content_type: &str) -> &str {
    match content_type.split_once('/') {
        Some((primary, _)) => primary,
        None => content_type,
    }
}
