//! Bounded HTTP fetching
//!
//! [`BoundedFetcher`] performs a GET for a [`ValidatedUrl`] and enforces the
//! outbound safety bounds while doing so:
//!
//! - Redirects are followed by hand (the client itself never follows them),
//!   and every `Location` target goes back through the [`UrlGuard`] before a
//!   connection is made. A public URL that 302s to an internal address is
//!   refused without ever contacting the internal address.
//! - DNS hosts are resolved by the guard and the connection is pinned to the
//!   checked address.
//! - The body is read through a reader capped at `ceiling + 1` bytes, after a
//!   cheap rejection on a declared `Content-Length` above the ceiling.
//! - The whole fetch (all hops and the body) races one deadline and the
//!   caller's cancellation token.

mod body;

pub use body::{CappedReadError, read_capped};

use crate::config::{FetchConfig, SizeLimits};
use crate::content_type;
use crate::error::{Error, Rejection, Result};
use crate::url_guard::{UrlGuard, ValidatedUrl};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, LOCATION};
use reqwest::redirect::Policy;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Bytes of an upstream error body kept for logging
const ERROR_BODY_LOG_BYTES: usize = 1024;

/// Per-call fetch options
#[derive(Clone, Debug)]
pub struct FetchOptions {
    /// Wall-clock deadline for the whole fetch
    pub timeout: Duration,
    /// Cancelled by the caller to abort an in-flight fetch
    pub cancel: CancellationToken,
}

impl FetchOptions {
    /// Options with the given deadline and a token nobody cancels
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the fetch when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A successfully fetched body and its metadata
#[derive(Clone, Debug)]
pub struct FetchedResponse {
    /// The complete body (never more than the ceiling for its content type)
    pub bytes: Vec<u8>,
    /// Normalized content type (no parameters)
    pub content_type: String,
    /// Response headers of the final hop
    pub headers: HeaderMap,
    /// URL of the final hop
    pub final_url: Url,
    /// Status code of the final hop
    pub status: u16,
    /// Number of redirects followed
    pub redirects: u32,
}

impl FetchedResponse {
    /// Header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// HTTP GET with redirect re-validation and byte ceilings
#[derive(Clone, Debug)]
pub struct BoundedFetcher {
    guard: UrlGuard,
    config: FetchConfig,
    limits: SizeLimits,
    client: reqwest::Client,
}

impl BoundedFetcher {
    /// Create a fetcher
    pub fn new(config: FetchConfig, limits: SizeLimits) -> Result<Self> {
        let client = build_client(&config, None)?;
        Ok(Self {
            guard: UrlGuard::new(&config),
            config,
            limits,
            client,
        })
    }

    /// The guard used to validate redirect targets
    pub fn guard(&self) -> &UrlGuard {
        &self.guard
    }

    /// Fetch `url`, following at most `max_redirects` validated redirects
    pub async fn fetch(&self, url: ValidatedUrl, options: FetchOptions) -> Result<FetchedResponse> {
        let FetchOptions { timeout, cancel } = options;
        let source = url.to_string();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(url = %source, "fetch cancelled by caller");
                Err(Error::Cancelled)
            }
            result = tokio::time::timeout(timeout, self.follow(url)) => match result {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(url = %source, timeout = ?timeout, "fetch timed out");
                    Err(Error::Timeout { after: timeout })
                }
            },
        }
    }

    async fn follow(&self, url: ValidatedUrl) -> Result<FetchedResponse> {
        let mut current = url;
        let mut redirects = 0u32;

        loop {
            let pin = match self.guard.resolve(&current).await {
                Ok(pin) => pin,
                Err(Error::Rejected(reason)) if redirects > 0 => {
                    return Err(Error::RedirectBlocked {
                        target: current.to_string(),
                        reason,
                    });
                }
                Err(e) => return Err(e),
            };

            let response = self.send(&current, pin).await?;
            let status = response.status();

            if is_redirect(status) {
                redirects += 1;
                if redirects > self.config.max_redirects {
                    tracing::warn!(
                        url = %current,
                        max = self.config.max_redirects,
                        "redirect limit exceeded"
                    );
                    return Err(Error::TooManyRedirects {
                        max: self.config.max_redirects,
                    });
                }

                let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::trim)
                    .filter(|location| !location.is_empty())
                else {
                    tracing::warn!(
                        url = %current,
                        status = status.as_u16(),
                        "redirect without Location"
                    );
                    return Err(Error::UpstreamStatus {
                        status: status.as_u16(),
                    });
                };

                let target = current.as_url().join(location).map_err(|_| {
                    tracing::warn!(url = %current, location, "unparseable redirect target");
                    Error::RedirectBlocked {
                        target: location.to_string(),
                        reason: Rejection::InvalidFormat,
                    }
                })?;

                current = self.guard.validate(target.as_str()).map_err(|reason| {
                    tracing::warn!(
                        from = %current,
                        to = %target,
                        reason = reason.code(),
                        "redirect target blocked"
                    );
                    Error::RedirectBlocked {
                        target: target.to_string(),
                        reason,
                    }
                })?;

                tracing::debug!(to = %current, hop = redirects, "following redirect");
                continue;
            }

            if !status.is_success() {
                log_error_body(&current, response).await;
                return Err(Error::UpstreamStatus {
                    status: status.as_u16(),
                });
            }

            return self.read_body(current, response, redirects).await;
        }
    }

    async fn send(
        &self,
        url: &ValidatedUrl,
        pin: Option<SocketAddr>,
    ) -> Result<reqwest::Response> {
        let client = match pin {
            Some(addr) => build_client(&self.config, Some((url.host(), addr)))?,
            None => self.client.clone(),
        };

        client.get(url.as_str()).send().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "request failed");
            Error::Network(e)
        })
    }

    async fn read_body(
        &self,
        url: ValidatedUrl,
        response: reqwest::Response,
        redirects: u32,
    ) -> Result<FetchedResponse> {
        let content_type = content_type::normalize(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let limit = self.limits.limit_for(&content_type);

        // Cheap rejection before any body byte is read
        if let Some(declared) = response.content_length()
            && declared > limit
        {
            tracing::warn!(
                url = %url,
                declared,
                limit,
                content_type = %content_type,
                "declared Content-Length exceeds ceiling"
            );
            return Err(Error::TooLarge {
                limit,
                content_type,
                declared: Some(declared),
            });
        }

        let headers = response.headers().clone();
        let status = response.status().as_u16();

        let bytes = match read_capped(response.bytes_stream(), limit).await {
            Ok(bytes) => bytes,
            Err(CappedReadError::LimitExceeded { retained }) => {
                tracing::warn!(
                    url = %url,
                    retained,
                    limit,
                    content_type = %content_type,
                    "body exceeded ceiling while streaming"
                );
                return Err(Error::TooLarge {
                    limit,
                    content_type,
                    declared: None,
                });
            }
            Err(CappedReadError::Stream(e)) => {
                tracing::warn!(url = %url, error = %e, "body stream failed");
                return Err(Error::Network(e));
            }
        };

        tracing::debug!(url = %url, bytes = bytes.len(), content_type = %content_type, "body read");

        Ok(FetchedResponse {
            bytes,
            content_type,
            headers,
            final_url: url.into_url(),
            status,
            redirects,
        })
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Log (never return) the start of an upstream error body
async fn log_error_body(url: &ValidatedUrl, mut response: reqwest::Response) {
    let status = response.status().as_u16();
    let snippet = match response.chunk().await {
        Ok(Some(chunk)) => {
            let end = chunk.len().min(ERROR_BODY_LOG_BYTES);
            String::from_utf8_lossy(&chunk[..end]).into_owned()
        }
        _ => String::new(),
    };
    tracing::warn!(url = %url, status, body = %snippet, "upstream returned error status");
}

fn build_client(config: &FetchConfig, pin: Option<(&str, SocketAddr)>) -> Result<reqwest::Client> {
    // Proxies would connect on our behalf to an address we never checked
    let mut builder = reqwest::Client::builder()
        .redirect(Policy::none())
        .user_agent(config.user_agent.as_str())
        .no_proxy();

    if let Some((host, addr)) = pin {
        builder = builder.resolve(host, addr);
    }

    builder.build().map_err(|e| Error::Config {
        message: format!("failed to build HTTP client: {e}"),
        key: None,
    })
}
