//! Content-Type normalization and the tables keyed on it
//!
//! The normalized MIME type drives three decisions: the byte ceiling for the
//! body, the extension appended to names that lack one, and the coarse file
//! category reported back to the agent.

use crate::config::SizeLimits;
use serde::{Deserialize, Serialize};

/// MIME type assumed when the server sends none
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Extension used when the MIME type is unknown
pub const DEFAULT_EXTENSION: &str = ".bin";

const EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("image/svg+xml", ".svg"),
    ("application/pdf", ".pdf"),
    ("text/plain", ".txt"),
    ("text/csv", ".csv"),
    ("text/html", ".html"),
    ("application/json", ".json"),
    ("audio/mpeg", ".mp3"),
    ("audio/wav", ".wav"),
    ("audio/mp4", ".m4a"),
    ("audio/webm", ".webm"),
    ("audio/ogg", ".ogg"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".docx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".pptx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".xlsx",
    ),
];

/// Strip parameters (`; charset=...`) and lower-case a Content-Type header
///
/// Missing or blank headers normalize to [`DEFAULT_MIME`].
///
/// # Examples
///
/// ```
/// use fetch_guard::content_type::normalize;
///
/// assert_eq!(normalize(Some("Text/HTML; charset=UTF-8")), "text/html");
/// assert_eq!(normalize(None), "application/octet-stream");
/// ```
pub fn normalize(header: Option<&str>) -> String {
    let media_type = header
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .unwrap_or("");

    if media_type.is_empty() {
        DEFAULT_MIME.to_string()
    } else {
        media_type.to_ascii_lowercase()
    }
}

/// File extension (with leading dot) for a normalized MIME type
pub fn extension_for(mime: &str) -> &'static str {
    EXTENSIONS
        .iter()
        .find(|(known, _)| *known == mime)
        .map(|(_, ext)| *ext)
        .unwrap_or(DEFAULT_EXTENSION)
}

/// Coarse category of a downloaded file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// `image/*`
    Image,
    /// `audio/*`
    Audio,
    /// PDF and office documents
    Document,
    /// CSV, JSON and spreadsheets
    Data,
    /// Other `text/*`
    Text,
    /// Anything else
    File,
}

impl FileType {
    /// Classify a normalized MIME type
    pub fn classify(mime: &str) -> Self {
        if mime.starts_with("image/") {
            FileType::Image
        } else if mime.starts_with("audio/") {
            FileType::Audio
        } else if is_document(mime) {
            FileType::Document
        } else if mime == "text/csv" || mime == "application/json" || mime.contains("spreadsheet")
        {
            FileType::Data
        } else if mime.starts_with("text/") {
            FileType::Text
        } else {
            FileType::File
        }
    }

    /// Lower-case label used in tool responses
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Audio => "audio",
            FileType::Document => "document",
            FileType::Data => "data",
            FileType::Text => "text",
            FileType::File => "file",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_document(mime: &str) -> bool {
    mime == "application/pdf"
        || mime.contains("word")
        || mime.contains("powerpoint")
        || mime.contains("presentation")
}

impl SizeLimits {
    /// Byte ceiling for a normalized MIME type
    ///
    /// Exact overrides win, then the image/audio/document classes, then the default.
    pub fn limit_for(&self, mime: &str) -> u64 {
        if let Some(limit) = self.overrides.get(mime) {
            return *limit;
        }
        if mime.starts_with("image/") {
            self.image
        } else if mime.starts_with("audio/") {
            self.audio
        } else if is_document(mime) {
            self.document
        } else {
            self.default
        }
    }
}
