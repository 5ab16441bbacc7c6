//! Content-type lookup for published artifacts.

/// Fallback for extensions not in [`CONTENT_TYPES`].
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Lower-case extension (with dot) to MIME type.
const CONTENT_TYPES: &[(&str, &str)] = &[
    (".mp4", "video/mp4"),
    (".webm", "video/webm"),
    (".mov", "video/quicktime"),
    (".avi", "video/x-msvideo"),
    (".gif", "image/gif"),
    (".png", "image/png"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".webp", "image/webp"),
    (".wav", "audio/wav"),
    (".mp3", "audio/mpeg"),
    (".flac", "audio/flac"),
];

/// Resolve the MIME type of `filename` from its extension.
///
/// Matching is case-insensitive. Unknown or missing extensions map to
/// [`DEFAULT_CONTENT_TYPE`].
pub fn content_type_for(filename: &str) -> &'static str {
    let Some(dot) = filename.rfind('.') else {
        return DEFAULT_CONTENT_TYPE;
    };
    let ext = filename[dot..].to_ascii_lowercase();

    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
