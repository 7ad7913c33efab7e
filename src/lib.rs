//! # fetch-guard
//!
//! Outbound URL fetching for multi-tenant agent runtimes, safe against
//! server-side request forgery and bounded in bytes, time and call volume.
//!
//! ## Design Philosophy
//!
//! fetch-guard is designed to be:
//! - **Closed by default** - Internal, loopback, link-local and cloud metadata
//!   targets are refused before any connection, including via redirects
//! - **Bounded** - Every body is read through a byte ceiling chosen by its
//!   content type, and every fetch races a single deadline
//! - **Fair** - Each tenant gets its own sliding-window budget per integration
//! - **Library-first** - No CLI or server, purely a Rust crate for embedding
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetch_guard::{Config, FetchRequest, FetchService, MemoryArtifactStore, tool_response};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let shutdown = CancellationToken::new();
//!
//!     // Expired artifacts are purged in the background
//!     let store = Arc::new(MemoryArtifactStore::new(config.artifacts.ttl));
//!     Arc::clone(&store).spawn_janitor(config.artifacts.cleanup_interval, shutdown.clone());
//!
//!     let service = FetchService::new(config, store)?;
//!
//!     let request = FetchRequest::new("https://example.com/report.pdf")
//!         .identity("user-42")
//!         .session("conversation-7");
//!
//!     let result = service.fetch(request).await;
//!     println!("{}", tool_response(&result));
//!
//!     shutdown.cancel();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artifact registration boundary and in-memory store
pub mod artifacts;
/// Configuration types
pub mod config;
/// Content-Type handling
pub mod content_type;
/// Error types
pub mod error;
/// Bounded HTTP fetching with redirect re-validation
pub mod fetcher;
/// Filename derivation and sanitization
pub mod filename;
/// Sliding-window rate limiting
pub mod rate_limiter;
/// Fetch pipeline
pub mod service;
/// Core types
pub mod types;
/// URL validation and DNS pinning
pub mod url_guard;

// Re-export commonly used types
pub use artifacts::{
    ArtifactHandle, ArtifactStore, MemoryArtifactStore, NewArtifact, StoredArtifact,
};
pub use config::{
    ArtifactConfig, CategoryPolicy, Config, FetchConfig, RateLimitConfig, SizeLimits,
};
pub use content_type::FileType;
pub use error::{Error, ErrorDetail, FetchFailure, Rejection, Result};
pub use fetcher::{BoundedFetcher, FetchOptions, FetchedResponse};
pub use filename::{resolve_filename, sanitize_filename};
pub use rate_limiter::{Admission, RateLimiter};
pub use service::{FetchService, tool_response};
pub use types::{FetchOutcome, FetchRequest, FetchedArtifact};
pub use url_guard::{UrlGuard, ValidatedUrl, is_blocked_ip, validate};
