//! Content classification for uploads.
//!
//! The type is sniffed from leading bytes only; client-supplied headers are
//! never consulted.

/// How many leading bytes the text heuristic inspects.
const SNIFF_WINDOW: usize = 512;

pub fn content_type(content: &[u8]) -> &'static str {
    if let Some(kind) = infer::get(content) {
        return kind.mime_type();
    }
    if looks_like_text(content) {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

/// Preferred filename extension (without the dot) for a sniffed content type.
///
/// Common types are pinned so the produced names don't depend on registry
/// ordering; everything else falls through to the mime_guess registry.
/// `application/octet-stream` maps to nothing: unknown binary data has no
/// canonical extension.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();

    match essence {
        "application/octet-stream" => None,
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/bmp" => Some("bmp"),
        "text/plain" => Some("txt"),
        "text/html" => Some("html"),
        "application/pdf" => Some("pdf"),
        "application/zip" => Some("zip"),
        "application/json" => Some("json"),
        "application/gzip" => Some("gz"),
        _ => mime_guess::get_mime_extensions_str(essence)?.first().copied(),
    }
}

fn looks_like_text(content: &[u8]) -> bool {
    let window = &content[..content.len().min(SNIFF_WINDOW)];
    !window.iter().copied().any(is_binary_byte)
}

// Control bytes that never appear in plain text. \t \n \x0c \r and ESC
// are allowed.
fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f)
}
