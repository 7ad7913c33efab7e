//! Error types for fetch-guard
//!
//! This module provides the error taxonomy for the fetch pipeline:
//! - URL rejections produced by the validator before any network I/O
//! - Policy errors (rate limiting)
//! - Transport, upstream and resource errors produced by the fetcher
//! - A user-facing failure payload with machine-readable codes and
//!   genericized messages

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for fetch-guard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reason a URL was refused by the validator
///
/// Rejections are deterministic and produced without any network I/O
/// (with the exception of [`Rejection::PrivateIpBlocked`] raised after DNS
/// resolution, see [`crate::url_guard::UrlGuard::resolve`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The input could not be parsed as an absolute URL
    #[error("invalid URL format")]
    InvalidFormat,

    /// The scheme is not exactly `http` or `https`
    #[error("only http and https schemes are allowed")]
    SchemeBlocked,

    /// The URL has no host component
    #[error("URL must have a host")]
    NoHost,

    /// The host is (or resolves to) a private, loopback or link-local address
    #[error("private or internal addresses are not allowed")]
    PrivateIpBlocked,

    /// The host is a cloud metadata endpoint
    #[error("access to cloud metadata endpoints is blocked")]
    MetadataBlocked,
}

impl Rejection {
    /// Machine-readable validator reason
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InvalidFormat => "invalid_format",
            Rejection::SchemeBlocked => "scheme_blocked",
            Rejection::NoHost => "no_host",
            Rejection::PrivateIpBlocked => "private_ip_blocked",
            Rejection::MetadataBlocked => "metadata_blocked",
        }
    }
}

/// Main error type for fetch-guard
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.max_redirects")
        key: Option<String>,
    },

    /// The requested URL was refused by the validator
    #[error("URL rejected: {0}")]
    Rejected(#[from] Rejection),

    /// A redirect pointed at a target the validator refuses
    #[error("redirect to {target} blocked: {reason}")]
    RedirectBlocked {
        /// The redirect target (logged only, never shown to the end user)
        target: String,
        /// Why the target was refused
        reason: Rejection,
    },

    /// The redirect chain was longer than allowed
    #[error("too many redirects (max {max})")]
    TooManyRedirects {
        /// Configured maximum number of redirects
        max: u32,
    },

    /// The caller exceeded its call budget for the category
    #[error("rate limit exceeded for {category}, retry after {retry_after:?}")]
    RateLimited {
        /// Integration category whose budget was exhausted
        category: String,
        /// Time until the oldest call in the window expires
        retry_after: Duration,
    },

    /// Upstream server answered with a non-success status
    #[error("upstream returned status {status}")]
    UpstreamStatus {
        /// The numeric HTTP status code
        status: u16,
    },

    /// Response body exceeded the byte ceiling for its content type
    #[error("response too large: limit {limit} bytes for {content_type}")]
    TooLarge {
        /// The ceiling that was exceeded
        limit: u64,
        /// Normalized content type used to pick the ceiling
        content_type: String,
        /// Declared Content-Length, when the rejection happened before reading the body
        declared: Option<u64>,
    },

    /// The fetch did not complete within its deadline
    #[error("fetch timed out after {after:?}")]
    Timeout {
        /// The deadline that expired
        after: Duration,
    },

    /// The caller cancelled the fetch
    #[error("fetch cancelled")]
    Cancelled,

    /// Transport failure (connect, TLS, DNS, body stream)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// DNS resolution failed for the target host
    #[error("DNS lookup failed for {host}: {reason}")]
    Dns {
        /// The host that could not be resolved
        host: String,
        /// Resolver error message
        reason: String,
    },

    /// The artifact store refused or failed the operation
    #[error("artifact store error: {0}")]
    Storage(String),

    /// Artifact not found (missing, expired, or owned by another identity)
    #[error("artifact not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Machine-readable error code, as exposed to callers
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Rejected(reason) => match reason {
                Rejection::InvalidFormat | Rejection::NoHost => "invalid_url",
                Rejection::SchemeBlocked => "scheme_blocked",
                Rejection::PrivateIpBlocked => "private_ip_blocked",
                Rejection::MetadataBlocked => "metadata_blocked",
            },
            Error::RedirectBlocked { .. } => "redirect_blocked",
            Error::TooManyRedirects { .. } => "too_many_redirects",
            Error::RateLimited { .. } => "rate_limited",
            Error::UpstreamStatus { .. } => "upstream_status_error",
            Error::TooLarge { .. } => "too_large",
            Error::Timeout { .. } => "timeout",
            Error::Cancelled => "cancelled",
            Error::Network(_) | Error::Dns { .. } => "network_error",
            Error::Storage(_) => "storage_error",
            Error::NotFound(_) => "not_found",
        }
    }

    /// Whether the *caller* may reasonably retry the same request later
    ///
    /// Nothing inside this crate retries automatically.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::Timeout { .. } => true,
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Dns { .. } => true,
            Error::UpstreamStatus { status } => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Message safe to show to the end user
    ///
    /// Never echoes hosts, addresses or upstream bodies, so a caller cannot
    /// learn whether an internal target exists or was reachable.
    pub fn user_message(&self) -> String {
        match self {
            Error::Config { .. } => "The download service is misconfigured".to_string(),
            Error::Rejected(reason) => match reason {
                Rejection::InvalidFormat | Rejection::NoHost => {
                    "The URL is not a valid absolute http(s) URL".to_string()
                }
                other => format!("The URL was blocked: {other}"),
            },
            Error::RedirectBlocked { .. } => {
                "The server redirected to a destination that is not allowed".to_string()
            }
            Error::TooManyRedirects { max } => {
                format!("The server redirected more than {max} times")
            }
            Error::RateLimited { retry_after, .. } => format!(
                "Too many downloads, try again in {} seconds",
                retry_after.as_secs().max(1)
            ),
            Error::UpstreamStatus { status } => {
                format!("Download failed with status: {status}")
            }
            Error::TooLarge {
                limit,
                content_type,
                ..
            } => format!("File too large: max {limit} bytes for {content_type}"),
            Error::Timeout { .. } => "The download timed out".to_string(),
            Error::Cancelled => "The download was cancelled".to_string(),
            Error::Network(_) | Error::Dns { .. } => {
                "The remote server could not be reached".to_string()
            }
            Error::Storage(_) => "The downloaded file could not be stored".to_string(),
            Error::NotFound(_) => "File not found".to_string(),
        }
    }
}

/// User-facing failure payload
///
/// # Example JSON
///
/// ```json
/// {
///   "error": {
///     "code": "too_large",
///     "message": "File too large: max 10485760 bytes for application/pdf",
///     "details": { "limit_bytes": 10485760 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchFailure {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "redirect_blocked", "too_large")
    pub code: String,

    /// Human-readable, genericized error message
    pub message: String,

    /// Optional additional context that is safe to disclose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for FetchFailure {
    fn from(error: &Error) -> Self {
        let details = match error {
            Error::UpstreamStatus { status } => Some(serde_json::json!({
                "status": status,
            })),
            Error::TooLarge { limit, .. } => Some(serde_json::json!({
                "limit_bytes": limit,
            })),
            Error::RateLimited { retry_after, .. } => Some(serde_json::json!({
                "retry_after_seconds": retry_after.as_secs().max(1),
            })),
            Error::TooManyRedirects { max } => Some(serde_json::json!({
                "max_redirects": max,
            })),
            _ => None,
        };

        FetchFailure {
            error: ErrorDetail {
                code: error.error_code().to_string(),
                message: error.user_message(),
                details,
            },
        }
    }
}

impl From<Error> for FetchFailure {
    fn from(error: Error) -> Self {
        FetchFailure::from(&error)
    }
}
