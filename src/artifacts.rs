//! Artifact registration
//!
//! After a successful fetch the pipeline hands the body and its metadata to
//! an [`ArtifactStore`] and gets an opaque [`ArtifactHandle`] back. Physical
//! storage and retention belong to the store; the pipeline only relies on
//! `store` and an owner-scoped `resolve`.
//!
//! [`MemoryArtifactStore`] keeps artifacts in process memory with a fixed
//! time-to-live. It is enough for a single-process deployment and for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::FetchedArtifact;

/// Opaque reference to a stored artifact
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactHandle(String);

impl ArtifactHandle {
    /// Wrap a handle string issued by a store
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Handle as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Random 128-bit handle, hex encoded
    pub fn random() -> Self {
        Self(hex(&rand::random::<[u8; 16]>()))
    }
}

impl std::fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a store receives for one artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewArtifact {
    /// Identity allowed to resolve the artifact
    pub owner: Option<String>,
    /// Optional conversation or session scope
    pub session_id: Option<String>,
    /// SHA-256 of the body, lower-case hex
    pub content_hash: String,
    /// Body and fetch metadata
    pub artifact: FetchedArtifact,
}

impl NewArtifact {
    /// Package a fetched artifact, hashing its body
    pub fn new(
        artifact: FetchedArtifact,
        owner: Option<String>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            owner,
            session_id,
            content_hash: content_hash(&artifact.bytes),
            artifact,
        }
    }
}

/// An artifact as held by a store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Handle the artifact was stored under
    pub handle: ArtifactHandle,
    /// Identity allowed to resolve the artifact
    pub owner: Option<String>,
    /// Optional conversation or session scope
    pub session_id: Option<String>,
    /// SHA-256 of the body, lower-case hex
    pub content_hash: String,
    /// Body and fetch metadata
    pub artifact: FetchedArtifact,
    /// When the artifact stops resolving
    pub expires_at: DateTime<Utc>,
}

impl StoredArtifact {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Storage boundary for fetched artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist an artifact and return its handle
    async fn store(&self, artifact: NewArtifact) -> Result<ArtifactHandle>;

    /// Look up an artifact on behalf of `identity`
    ///
    /// Artifacts owned by someone else must be reported as
    /// [`Error::NotFound`], exactly like missing ones.
    async fn resolve(
        &self,
        handle: &ArtifactHandle,
        identity: Option<&str>,
    ) -> Result<StoredArtifact>;
}

/// Lower-case hex SHA-256 of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex(&hasher.finalize())
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// In-process artifact store with time-based expiry
pub struct MemoryArtifactStore {
    artifacts: RwLock<HashMap<ArtifactHandle, StoredArtifact>>,
    ttl: Duration,
}

impl MemoryArtifactStore {
    /// Create a store whose artifacts live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            artifacts: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Restart the time-to-live of an artifact owned by `identity`
    pub async fn extend_ttl(
        &self,
        handle: &ArtifactHandle,
        identity: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut artifacts = self.artifacts.write().await;

        match artifacts.get_mut(handle) {
            Some(stored) if !stored.is_expired(now) && stored.owner.as_deref() == identity => {
                stored.expires_at = self.expiry_from(now);
                tracing::debug!(
                    handle = %handle,
                    expires_at = %stored.expires_at,
                    "artifact ttl extended"
                );
                Ok(())
            }
            _ => Err(Error::NotFound(format!("artifact {handle}"))),
        }
    }

    /// Remove one artifact, returning whether it existed
    pub async fn delete(&self, handle: &ArtifactHandle) -> bool {
        self.artifacts.write().await.remove(handle).is_some()
    }

    /// Remove every artifact scoped to `session_id`
    pub async fn delete_session(&self, session_id: &str) -> usize {
        let mut artifacts = self.artifacts.write().await;
        let before = artifacts.len();
        artifacts.retain(|_, stored| stored.session_id.as_deref() != Some(session_id));
        let removed = before - artifacts.len();
        if removed > 0 {
            tracing::info!(session_id, removed, "deleted session artifacts");
        }
        removed
    }

    /// Live artifacts owned by `owner`, oldest first
    pub async fn list_for_owner(&self, owner: &str) -> Vec<StoredArtifact> {
        let now = Utc::now();
        let artifacts = self.artifacts.read().await;
        let mut owned: Vec<StoredArtifact> = artifacts
            .values()
            .filter(|stored| stored.owner.as_deref() == Some(owner) && !stored.is_expired(now))
            .cloned()
            .collect();
        owned.sort_by_key(|stored| stored.artifact.created_at);
        owned
    }

    /// Drop expired artifacts, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut artifacts = self.artifacts.write().await;
        let before = artifacts.len();
        artifacts.retain(|_, stored| !stored.is_expired(now));
        before - artifacts.len()
    }

    /// Run [`MemoryArtifactStore::purge_expired`] every `interval` until `cancel` fires
    pub fn spawn_janitor(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("artifact janitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = self.purge_expired().await;
                        if removed > 0 {
                            tracing::debug!(removed, "purged expired artifacts");
                        }
                    }
                }
            }
        })
    }

    /// Number of artifacts held, expired ones included
    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    /// Whether the store holds nothing
    pub async fn is_empty(&self) -> bool {
        self.artifacts.read().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn store(&self, artifact: NewArtifact) -> Result<ArtifactHandle> {
        let handle = ArtifactHandle::random();
        let stored = StoredArtifact {
            handle: handle.clone(),
            owner: artifact.owner,
            session_id: artifact.session_id,
            content_hash: artifact.content_hash,
            expires_at: self.expiry_from(Utc::now()),
            artifact: artifact.artifact,
        };

        tracing::debug!(
            handle = %handle,
            size = stored.artifact.size_bytes,
            mime_type = %stored.artifact.mime_type,
            "artifact stored"
        );
        self.artifacts.write().await.insert(handle.clone(), stored);
        Ok(handle)
    }

    async fn resolve(
        &self,
        handle: &ArtifactHandle,
        identity: Option<&str>,
    ) -> Result<StoredArtifact> {
        let now = Utc::now();
        let mut artifacts = self.artifacts.write().await;

        let expired = match artifacts.get(handle) {
            Some(stored) if stored.is_expired(now) => true,
            Some(stored) if stored.owner.as_deref() == identity => return Ok(stored.clone()),
            Some(_) => {
                tracing::warn!(handle = %handle, "artifact requested by non-owner");
                false
            }
            None => false,
        };

        if expired {
            artifacts.remove(handle);
            tracing::debug!(handle = %handle, "expired artifact evicted");
        }
        Err(Error::NotFound(format!("artifact {handle}")))
    }
}
