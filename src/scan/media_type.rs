use std::path::Path;

/// Non-image types recognized by extension.
const KNOWN_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("svg", "image/svg+xml"),
];

/// Detect the media type of a file from its name.
///
/// Raster formats come from the image codec registry; everything else from a small extension
/// table. Unknown extensions yield `None`.
pub fn detect(path: &Path) -> Option<String> {
    if let Ok(format) = image::ImageFormat::from_path(path) {
        return Some(format.to_mime_type().to_string());
    }
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    KNOWN_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| mime.to_string())
}
