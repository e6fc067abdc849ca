// ABOUTME: Long-lived poller bound to a single dependency
// ABOUTME: Funnels fresh values onto the watcher's data channel with retry and backoff

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::dep::{ClientSet, Dependency, DependencyError, StopSignal};

/// Backoff applied between failed fetches. Attempts are unbounded: a view
/// keeps polling through transient upstream failures and serves stale data
/// from the cache in the meantime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Calculate the delay before the given retry attempt (1-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay_ms = (self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(exponent)) as u64;

        let delay = Duration::from_millis(delay_ms);
        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }
}

#[derive(Debug, Default)]
struct ViewState {
    last_value: Option<Value>,
    last_index: u64,
    last_error: Option<String>,
    retries: u32,
}

/// One view per active dependency: holds the dependency, its last result and
/// error, a retry counter and the stop signal for its background task.
pub struct View {
    dep: Arc<dyn Dependency>,
    clients: ClientSet,
    retry: RetryConfig,
    state: Mutex<ViewState>,
    stop: StopSignal,
}

impl View {
    pub fn new(dep: Arc<dyn Dependency>, clients: ClientSet, retry: RetryConfig) -> Arc<Self> {
        Arc::new(Self {
            dep,
            clients,
            retry,
            state: Mutex::new(ViewState::default()),
            stop: StopSignal::new(),
        })
    }

    pub fn dep(&self) -> &Arc<dyn Dependency> {
        &self.dep
    }

    pub fn id(&self) -> String {
        self.dep.id()
    }

    /// Most recent successfully fetched value, if any.
    pub fn last_value(&self) -> Option<Value> {
        self.state.lock().expect("view lock poisoned").last_value.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().expect("view lock poisoned").last_error.clone()
    }

    pub fn retries(&self) -> u32 {
        self.state.lock().expect("view lock poisoned").retries
    }

    /// Stops the polling task and the dependency's in-flight fetch. Idempotent.
    pub fn stop(&self) {
        self.stop.stop();
        self.dep.stop();
    }

    /// The polling loop. Emits `self` on the data channel for every fetch
    /// that observed a new index (or the first success); terminal errors go
    /// to the error channel once and end the loop.
    pub(crate) async fn run(
        self: Arc<Self>,
        data_tx: mpsc::Sender<Arc<View>>,
        err_tx: mpsc::Sender<DependencyError>,
    ) {
        let id = self.id();
        debug!(dep = %id, "view started");

        loop {
            if self.stop.is_stopped() {
                break;
            }

            let last_index = self.state.lock().expect("view lock poisoned").last_index;
            let fetched = tokio::select! {
                _ = self.stop.stopped() => break,
                fetched = self.dep.fetch(&self.clients, last_index) => fetched,
            };

            match fetched {
                Ok(fetched) => {
                    let changed = {
                        let mut state = self.state.lock().expect("view lock poisoned");
                        let changed = state.last_value.is_none()
                            || state.last_index != fetched.metadata.last_index;
                        state.last_index = fetched.metadata.last_index;
                        state.retries = 0;
                        state.last_error = None;
                        if changed {
                            state.last_value = Some(fetched.value);
                        }
                        changed
                    };

                    if !changed {
                        continue;
                    }

                    debug!(dep = %id, index = last_index, "view received new data");
                    tokio::select! {
                        _ = self.stop.stopped() => break,
                        sent = data_tx.send(Arc::clone(&self)) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(DependencyError::Stopped) => break,
                Err(err) if err.is_transient() => {
                    let (retries, delay) = {
                        let mut state = self.state.lock().expect("view lock poisoned");
                        state.retries += 1;
                        state.last_error = Some(err.to_string());
                        (state.retries, self.retry.calculate_delay(state.retries))
                    };

                    warn!(dep = %id, retries, ?delay, %err, "fetch failed, backing off");
                    tokio::select! {
                        _ = self.stop.stopped() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => {
                    error!(dep = %id, %err, "fetch failed permanently");
                    self.state.lock().expect("view lock poisoned").last_error =
                        Some(err.to_string());
                    let _ = err_tx.send(err).await;
                    break;
                }
            }
        }

        debug!(dep = %id, "view stopped");
    }
}
