//! Configuration types for fetch-guard

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

/// Top-level configuration
///
/// Every field has a sensible default, so `Config::default()` is a working
/// setup and partial TOML/JSON documents deserialize cleanly.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Outbound HTTP behavior (redirects, timeouts, exemptions)
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Byte ceilings per content type
    #[serde(default)]
    pub size_limits: SizeLimits,

    /// Per-category call budgets
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Retention of stored artifacts
    #[serde(default)]
    pub artifacts: ArtifactConfig,
}

impl Config {
    /// Check the configuration for values that would disable a safety bound
    pub fn validate(&self) -> Result<()> {
        if self.fetch.request_timeout.is_zero() {
            return Err(config_error(
                "request timeout must be greater than zero",
                "fetch.request_timeout",
            ));
        }
        if self.fetch.media_timeout.is_zero() {
            return Err(config_error(
                "media timeout must be greater than zero",
                "fetch.media_timeout",
            ));
        }

        let limits = [
            ("size_limits.image", self.size_limits.image),
            ("size_limits.audio", self.size_limits.audio),
            ("size_limits.document", self.size_limits.document),
            ("size_limits.default", self.size_limits.default),
        ];
        for (key, value) in limits {
            if value == 0 {
                return Err(config_error("size limit must be greater than zero", key));
            }
        }
        for (mime, value) in &self.size_limits.overrides {
            if *value == 0 {
                return Err(config_error(
                    format!("size limit for {mime} must be greater than zero"),
                    format!("size_limits.overrides.{mime}"),
                ));
            }
        }

        self.rate_limits
            .default_policy
            .validate("rate_limits.default_policy")?;
        for (category, policy) in &self.rate_limits.categories {
            policy.validate(&format!("rate_limits.categories.{category}"))?;
        }

        if self.artifacts.ttl.is_zero() {
            return Err(config_error(
                "artifact TTL must be greater than zero",
                "artifacts.ttl",
            ));
        }

        if self.artifacts.cleanup_interval.is_zero() {
            return Err(config_error(
                "artifact cleanup interval must be greater than zero",
                "artifacts.cleanup_interval",
            ));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: impl Into<String>) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.into()),
    }
}

/// Outbound HTTP behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of redirects followed per fetch (default: 5)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Wall-clock deadline for a standard fetch, all hops and body included (default: 30s)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Deadline for categories flagged as media (default: 120s)
    #[serde(default = "default_media_timeout", with = "duration_serde")]
    pub media_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Resolve DNS hosts, reject private answers, and pin the connection (default: true)
    ///
    /// Without this, only literal-IP hosts are checked and a hostname that
    /// resolves to an internal address is fetched.
    #[serde(default = "default_true")]
    pub resolve_dns: bool,

    /// Origins exempt from the address-range checks (`host` or `host:port`)
    ///
    /// Scheme and metadata checks still apply to exempt origins.
    #[serde(default)]
    pub exempt_origins: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_redirects: default_max_redirects(),
            request_timeout: default_request_timeout(),
            media_timeout: default_media_timeout(),
            user_agent: default_user_agent(),
            resolve_dns: true,
            exempt_origins: Vec::new(),
        }
    }
}

/// Byte ceilings per content-type class
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SizeLimits {
    /// `image/*` (default: 20 MiB)
    #[serde(default = "default_image_limit")]
    pub image: u64,

    /// `audio/*` (default: 25 MiB)
    #[serde(default = "default_audio_limit")]
    pub audio: u64,

    /// PDF and office documents (default: 10 MiB)
    #[serde(default = "default_document_limit")]
    pub document: u64,

    /// Everything else (default: 10 MiB)
    #[serde(default = "default_document_limit")]
    pub default: u64,

    /// Exact normalized MIME type overrides, checked before the classes
    #[serde(default)]
    pub overrides: HashMap<String, u64>,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            image: default_image_limit(),
            audio: default_audio_limit(),
            document: default_document_limit(),
            default: default_document_limit(),
            overrides: HashMap::new(),
        }
    }
}

/// Per-category call budgets
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Admit callers with no identity instead of rejecting them (default: true)
    #[serde(default = "default_true")]
    pub fail_open_on_missing_identity: bool,

    /// Policy for categories not listed in `categories`
    #[serde(default)]
    pub default_policy: CategoryPolicy,

    /// Policy per integration category
    #[serde(default = "default_categories")]
    pub categories: HashMap<String, CategoryPolicy>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            fail_open_on_missing_identity: true,
            default_policy: CategoryPolicy::default(),
            categories: default_categories(),
        }
    }
}

/// Sliding-window budget and fetch class for one category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPolicy {
    /// Maximum calls per identity within `window`
    pub max_calls: u32,

    /// Trailing window length
    #[serde(default = "default_window", with = "duration_serde")]
    pub window: Duration,

    /// Use the media timeout for fetches in this category
    #[serde(default)]
    pub media: bool,
}

impl CategoryPolicy {
    /// Policy with the standard timeout
    pub fn per_minute(max_calls: u32) -> Self {
        Self {
            max_calls,
            window: default_window(),
            media: false,
        }
    }

    fn validate(&self, key: &str) -> Result<()> {
        if self.max_calls == 0 {
            return Err(config_error(
                "max_calls must be greater than zero",
                format!("{key}.max_calls"),
            ));
        }
        if self.window.is_zero() {
            return Err(config_error(
                "window must be greater than zero",
                format!("{key}.window"),
            ));
        }
        Ok(())
    }
}

impl Default for CategoryPolicy {
    fn default() -> Self {
        Self::per_minute(30)
    }
}

/// Retention of stored artifacts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// How long an artifact stays resolvable after it is stored (default: 30 minutes)
    #[serde(default = "default_artifact_ttl", with = "duration_serde")]
    pub ttl: Duration,

    /// How often the in-memory store purges expired artifacts (default: 10 minutes)
    #[serde(default = "default_cleanup_interval", with = "duration_serde")]
    pub cleanup_interval: Duration,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            ttl: default_artifact_ttl(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_redirects() -> u32 {
    5
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_media_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_user_agent() -> String {
    format!("fetch-guard/{} (File Downloader)", env!("CARGO_PKG_VERSION"))
}

fn default_image_limit() -> u64 {
    20 * 1024 * 1024
}

fn default_audio_limit() -> u64 {
    25 * 1024 * 1024
}

fn default_document_limit() -> u64 {
    10 * 1024 * 1024
}

fn default_window() -> Duration {
    Duration::from_secs(60)
}

fn default_artifact_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_categories() -> HashMap<String, CategoryPolicy> {
    let mut categories = HashMap::new();
    for name in ["gmail", "google_drive", "google_calendar"] {
        categories.insert(name.to_string(), CategoryPolicy::per_minute(50));
    }
    for name in ["canva", "youtube", "zoom", "download_file"] {
        categories.insert(name.to_string(), CategoryPolicy::per_minute(30));
    }
    categories.insert("twitter".to_string(), CategoryPolicy::per_minute(25));
    categories.insert(
        "media_download".to_string(),
        CategoryPolicy {
            media: true,
            ..CategoryPolicy::per_minute(30)
        },
    );
    categories
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
