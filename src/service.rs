//! Fetch pipeline
//!
//! [`FetchService`] wires the components together in their fixed order:
//! rate limiter admits, URL guard validates, fetcher downloads (re-validating
//! each redirect), filename resolver names the body, artifact store keeps it.
//! Any failure short-circuits the remaining steps, so a refused call never
//! touches the network and a failed fetch never reaches the store.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::artifacts::{ArtifactStore, NewArtifact};
use crate::config::Config;
use crate::content_type::FileType;
use crate::error::{Error, FetchFailure, Result};
use crate::fetcher::{BoundedFetcher, FetchOptions};
use crate::filename::resolve_filename;
use crate::rate_limiter::{Admission, RateLimiter};
use crate::types::{FetchOutcome, FetchRequest, FetchedArtifact};

/// Outbound fetch pipeline shared by every tool that downloads URLs
pub struct FetchService {
    config: Config,
    fetcher: BoundedFetcher,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn ArtifactStore>,
}

impl FetchService {
    /// Build the pipeline from configuration
    ///
    /// Fails with [`Error::Config`] when the configuration would disable a
    /// safety bound (zero limits, windows or timeouts).
    pub fn new(config: Config, store: Arc<dyn ArtifactStore>) -> Result<Self> {
        config.validate()?;

        let fetcher = BoundedFetcher::new(config.fetch.clone(), config.size_limits.clone())?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));

        Ok(Self {
            config,
            fetcher,
            limiter,
            store,
        })
    }

    /// Share a limiter with other services in the process
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// The limiter in use
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The configuration the service was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one request through the pipeline
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome> {
        self.fetch_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Run one request, aborting the download when `cancel` fires
    pub async fn fetch_with_cancel(
        &self,
        request: FetchRequest,
        cancel: CancellationToken,
    ) -> Result<FetchOutcome> {
        let span = tracing::info_span!(
            "fetch",
            identity = request.requesting_identity.as_deref().unwrap_or("-"),
            category = %request.category,
        );

        async move {
            let result = self.run(&request, cancel).await;
            match &result {
                Ok(outcome) => tracing::info!(
                    url = %request.url,
                    handle = %outcome.artifact_handle,
                    bytes = outcome.size_bytes,
                    mime_type = %outcome.mime_type,
                    "fetch completed"
                ),
                Err(e) => tracing::warn!(
                    url = %request.url,
                    code = e.error_code(),
                    error = %e,
                    "fetch failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Deadline for a category: media categories get the longer timeout
    pub fn timeout_for(&self, category: &str) -> Duration {
        if self.limiter.policy_for(category).media {
            self.config.fetch.media_timeout
        } else {
            self.config.fetch.request_timeout
        }
    }

    async fn run(
        &self,
        request: &FetchRequest,
        cancel: CancellationToken,
    ) -> Result<FetchOutcome> {
        let identity = normalize_identity(request.requesting_identity.as_deref());

        if let Admission::Limited { retry_after } =
            self.limiter.admit(&request.category, identity.as_deref()).await
        {
            return Err(Error::RateLimited {
                category: request.category.clone(),
                retry_after,
            });
        }

        let url = self.fetcher.guard().validate(&request.url)?;

        let options = FetchOptions::new(self.timeout_for(&request.category)).with_cancel(cancel);
        let response = self.fetcher.fetch(url.clone(), options).await?;

        let filename = resolve_filename(
            request.explicit_filename.as_deref(),
            url.as_url(),
            &response.content_type,
            response.header("content-disposition"),
        );

        let mime_type = response.content_type;
        let size_bytes = response.bytes.len() as u64;
        let source_url = request.url.trim().to_string();

        let artifact = FetchedArtifact {
            bytes: response.bytes,
            mime_type: mime_type.clone(),
            size_bytes,
            filename: filename.clone(),
            source_url: source_url.clone(),
            created_at: Utc::now(),
        };
        let handle = self
            .store
            .store(NewArtifact::new(artifact, identity, request.session_id.clone()))
            .await?;

        Ok(FetchOutcome {
            artifact_handle: handle.to_string(),
            file_type: FileType::classify(&mime_type),
            filename,
            mime_type,
            size_bytes,
            source_url,
        })
    }
}

/// Trimmed identity, with blank identities treated as missing
fn normalize_identity(identity: Option<&str>) -> Option<String> {
    identity
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Render a pipeline result as the JSON object handed back to the agent
///
/// Failures carry only the genericized message and safe details.
pub fn tool_response(result: &Result<FetchOutcome>) -> serde_json::Value {
    match result {
        Ok(outcome) => json!({
            "success": true,
            "artifact_handle": outcome.artifact_handle,
            "filename": outcome.filename,
            "mime_type": outcome.mime_type,
            "size_bytes": outcome.size_bytes,
            "source_url": outcome.source_url,
            "file_type": outcome.file_type,
            "message": outcome.message(),
        }),
        Err(e) => json!({
            "success": false,
            "error": FetchFailure::from(e).error,
        }),
    }
}
