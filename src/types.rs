//! Core types for fetch-guard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content_type::FileType;

/// Category used when a request does not name one
pub const DEFAULT_CATEGORY: &str = "download_file";

/// A request to fetch a URL on behalf of a tenant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Attacker-influenced URL to fetch
    pub url: String,

    /// Tenant the call is charged to and the artifact is owned by
    #[serde(default)]
    pub requesting_identity: Option<String>,

    /// Filename supplied by the caller, sanitized before use
    #[serde(default)]
    pub explicit_filename: Option<String>,

    /// Integration category selecting the rate-limit budget
    #[serde(default = "default_category")]
    pub category: String,

    /// Conversation or session the artifact is scoped to
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl FetchRequest {
    /// Request for `url` in the default category
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            requesting_identity: None,
            explicit_filename: None,
            category: default_category(),
            session_id: None,
        }
    }

    /// Charge the call to `identity`
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.requesting_identity = Some(identity.into());
        self
    }

    /// Use `filename` instead of deriving one
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.explicit_filename = Some(filename.into());
        self
    }

    /// Rate-limit under `category`
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Scope the artifact to `session_id`
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Bytes and metadata of one successful fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedArtifact {
    /// Complete response body
    pub bytes: Vec<u8>,
    /// Normalized MIME type
    pub mime_type: String,
    /// Length of `bytes`
    pub size_bytes: u64,
    /// Sanitized filename
    pub filename: String,
    /// URL as requested by the caller
    pub source_url: String,
    /// When the fetch completed
    pub created_at: DateTime<Utc>,
}

/// Successful pipeline result returned to the agent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    /// Handle issued by the artifact store
    pub artifact_handle: String,
    /// Sanitized filename
    pub filename: String,
    /// Normalized MIME type
    pub mime_type: String,
    /// Body size in bytes
    pub size_bytes: u64,
    /// URL as requested by the caller
    pub source_url: String,
    /// Coarse file category
    pub file_type: FileType,
}

impl FetchOutcome {
    /// Human-readable summary for the agent
    pub fn message(&self) -> String {
        let hint = match self.file_type {
            FileType::Image => "image",
            FileType::Audio => "audio",
            FileType::Data => "data file",
            FileType::Document | FileType::Text | FileType::File => "document",
        };
        format!(
            "Downloaded {} ({} bytes). Pass artifact handle '{}' to a {} tool to read it.",
            self.filename, self.size_bytes, self.artifact_handle, hint
        )
    }
}
