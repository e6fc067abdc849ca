// ABOUTME: Auth token renewal dependency registered via Watcher::watch_token
// ABOUTME: Re-emits the token on a renewal interval; exempt from dependency cleaning

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::error::{DependencyError, Result};
use super::{ClientSet, Dependency, Fetched, StopSignal};

pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(300);

/// Keeps a secret-store session token alive by renewing it periodically.
///
/// This dependency is never named by a template, so the watcher tracks it
/// separately and `clean_deps` leaves it registered.
pub struct TokenRenewQuery {
    token: String,
    renew_interval: Duration,
    renewals: AtomicU64,
    stop: StopSignal,
}

impl TokenRenewQuery {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            renew_interval: DEFAULT_RENEW_INTERVAL,
            renewals: AtomicU64::new(0),
            stop: StopSignal::new(),
        }
    }

    pub fn with_renew_interval(mut self, interval: Duration) -> Self {
        self.renew_interval = interval;
        self
    }
}

#[async_trait]
impl Dependency for TokenRenewQuery {
    async fn fetch(&self, _clients: &ClientSet, _last_index: u64) -> Result<Fetched> {
        if self.stop.is_stopped() {
            return Err(DependencyError::Stopped);
        }

        // The first fetch establishes the token; subsequent fetches renew on
        // the interval.
        let renewal = self.renewals.fetch_add(1, Ordering::SeqCst);
        if renewal > 0 {
            tokio::select! {
                _ = self.stop.stopped() => return Err(DependencyError::Stopped),
                _ = tokio::time::sleep(self.renew_interval) => {}
            }
            debug!(renewal, "renewed auth token");
        }

        Ok(Fetched::new(Value::String(self.token.clone()), renewal + 1))
    }

    fn stop(&self) {
        self.stop.stop();
    }
}

impl fmt::Display for TokenRenewQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Constant id: there is at most one token renewer per watcher.
        write!(f, "token.renew")
    }
}
