//! Sliding-window rate limiting per integration category and identity
//!
//! Every `(category, identity)` pair owns a queue of admission timestamps.
//! An admit prunes timestamps older than the category window, compares the
//! remaining count with the category budget, and records the new call. The
//! three steps run under one lock guard so that concurrent admits cannot both
//! observe spare capacity and overshoot the budget.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{CategoryPolicy, RateLimitConfig};

/// Result of an admission check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed and has been counted
    Allowed,
    /// The budget is exhausted for this window
    Limited {
        /// Time until the oldest counted call leaves the window
        retry_after: Duration,
    },
}

impl Admission {
    /// Whether the call was admitted
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

type WindowKey = (String, String);

/// Sliding-window limiter shared by every fetch in a process
pub struct RateLimiter {
    /// Admission timestamps per (category, identity)
    windows: Mutex<HashMap<WindowKey, VecDeque<Instant>>>,
    /// Configuration
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a limiter with empty windows
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Budget applied to `category`
    pub fn policy_for(&self, category: &str) -> CategoryPolicy {
        self.config
            .categories
            .get(category)
            .copied()
            .unwrap_or(self.config.default_policy)
    }

    /// Admit or refuse one call from `identity` in `category`
    pub async fn admit(&self, category: &str, identity: Option<&str>) -> Admission {
        let policy = self.policy_for(category);

        let Some(identity) = identity.map(str::trim).filter(|id| !id.is_empty()) else {
            if self.config.fail_open_on_missing_identity {
                tracing::warn!(category, "no identity on request, skipping rate limit");
                return Admission::Allowed;
            }
            tracing::warn!(category, "no identity on request, refusing");
            return Admission::Limited {
                retry_after: policy.window,
            };
        };

        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let window = windows
            .entry((category.to_string(), identity.to_string()))
            .or_default();

        prune(window, now, policy.window);

        if window.len() >= policy.max_calls as usize {
            let retry_after = window
                .front()
                .map(|oldest| (*oldest + policy.window).saturating_duration_since(now))
                .unwrap_or(policy.window);
            tracing::warn!(
                category,
                identity,
                max_calls = policy.max_calls,
                window = ?policy.window,
                retry_after = ?retry_after,
                "rate limit exceeded"
            );
            return Admission::Limited { retry_after };
        }

        window.push_back(now);
        tracing::debug!(
            category,
            identity,
            used = window.len(),
            max_calls = policy.max_calls,
            "call admitted"
        );
        Admission::Allowed
    }

    /// Calls from `identity` currently counted in the `category` window
    pub async fn in_flight_count(&self, category: &str, identity: &str) -> usize {
        let policy = self.policy_for(category);
        let mut windows = self.windows.lock().await;
        let now = Instant::now();

        match windows.get_mut(&(category.to_string(), identity.to_string())) {
            Some(window) => {
                prune(window, now, policy.window);
                window.len()
            }
            None => 0,
        }
    }

    /// Drop identities with no calls left in their window
    ///
    /// Returns the number of entries removed.
    pub async fn prune_idle(&self) -> usize {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let before = windows.len();

        windows.retain(|(category, _), window| {
            prune(window, now, self.policy_for(category).window);
            !window.is_empty()
        });

        before - windows.len()
    }

    /// Run [`RateLimiter::prune_idle`] every `interval` until `cancel` fires
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("rate limit sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = self.prune_idle().await;
                        if removed > 0 {
                            tracing::debug!(removed, "evicted idle rate limit windows");
                        }
                    }
                }
            }
        })
    }
}

/// Remove timestamps at or before `now - window`
fn prune(window: &mut VecDeque<Instant>, now: Instant, length: Duration) {
    let Some(cutoff) = now.checked_sub(length) else {
        return;
    };
    while window.front().is_some_and(|t| *t <= cutoff) {
        window.pop_front();
    }
}
