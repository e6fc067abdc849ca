// ABOUTME: Deterministic dependency fixture for exercising views and watchers
// ABOUTME: Emits a value with a fresh index per fetch, or a fixed index, or a terminal error

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::error::{DependencyError, Result};
use super::{ClientSet, Dependency, Fetched, StopSignal};

/// A fabricated dependency for tests of views, watchers and templates.
///
/// By default every fetch returns `"<name>-data"` under a strictly increasing
/// index, so the owning view emits on each cycle. `same_index` pins the index
/// to 1 after the first fetch, which makes the view observe "unchanged" and
/// stay quiet. `failing` makes every fetch return a terminal error.
pub struct FakeDep {
    name: String,
    value: Value,
    fetch_delay: Duration,
    same_index: bool,
    failing: bool,
    counter: AtomicU64,
    stop: StopSignal,
}

impl FakeDep {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: Value::String(format!("{}-data", name)),
            fetch_delay: Duration::from_millis(5),
            same_index: false,
            failing: false,
            counter: AtomicU64::new(0),
            stop: StopSignal::new(),
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Every fetch after the first reports the same index, so views treat the
    /// data as unchanged.
    pub fn same_index(mut self) -> Self {
        self.same_index = true;
        self
    }

    /// Every fetch fails with a terminal (non-retryable) error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Number of completed fetch calls.
    pub fn fetch_count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dependency for FakeDep {
    async fn fetch(&self, _clients: &ClientSet, _last_index: u64) -> Result<Fetched> {
        if self.stop.is_stopped() {
            return Err(DependencyError::Stopped);
        }

        tokio::select! {
            _ = self.stop.stopped() => return Err(DependencyError::Stopped),
            _ = tokio::time::sleep(self.fetch_delay) => {}
        }

        if self.failing {
            return Err(DependencyError::InvalidQuery(format!(
                "fake({}): permanent failure",
                self.name
            )));
        }

        let count = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let index = if self.same_index { 1 } else { count };
        Ok(Fetched::new(self.value.clone(), index))
    }

    fn stop(&self) {
        self.stop.stop();
    }
}

impl fmt::Display for FakeDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fake({})", self.name)
    }
}
