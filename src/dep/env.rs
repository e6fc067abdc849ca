// ABOUTME: Process environment variable dependency
// ABOUTME: Polls a single variable and emits when its value changes or it is unset

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use super::error::{DependencyError, Result};
use super::{ClientSet, Dependency, Fetched, StopSignal};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A dependency on a process environment variable. An unset variable is a
/// valid observation and is stored as null.
pub struct EnvQuery {
    name: String,
    poll_interval: Duration,
    last: Mutex<Option<Option<String>>>,
    stop: StopSignal,
}

impl EnvQuery {
    pub fn new(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DependencyError::InvalidQuery(format!(
                "env: invalid format: {:?}",
                name
            )));
        }

        Ok(Self {
            name: trimmed.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            last: Mutex::new(None),
            stop: StopSignal::new(),
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn current(&self) -> Option<String> {
        std::env::var(&self.name).ok()
    }
}

#[async_trait]
impl Dependency for EnvQuery {
    async fn fetch(&self, _clients: &ClientSet, _last_index: u64) -> Result<Fetched> {
        loop {
            if self.stop.is_stopped() {
                return Err(DependencyError::Stopped);
            }

            let value = self.current();
            let changed = {
                let mut last = self.last.lock().expect("env lock poisoned");
                let changed = last.as_ref() != Some(&value);
                if changed {
                    *last = Some(value.clone());
                }
                changed
            };

            if changed {
                let index = chrono::Utc::now().timestamp_millis() as u64;
                let value = value.map_or(Value::Null, Value::String);
                return Ok(Fetched::new(value, index));
            }

            tokio::select! {
                _ = self.stop.stopped() => return Err(DependencyError::Stopped),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    fn stop(&self) {
        self.stop.stop();
    }
}

impl fmt::Display for EnvQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let query = EnvQuery::new("PATH").unwrap();
        assert_eq!(query.id(), "env(PATH)");
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            EnvQuery::new(""),
            Err(DependencyError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_set_variable() {
        std::env::set_var("TIDEWATCH_ENV_DEP_TEST", "value-1");

        let query = EnvQuery::new("TIDEWATCH_ENV_DEP_TEST").unwrap();
        let fetched = query.fetch(&ClientSet::new(), 0).await.unwrap();
        assert_eq!(fetched.value, Value::String("value-1".to_string()));

        std::env::remove_var("TIDEWATCH_ENV_DEP_TEST");
    }

    #[tokio::test]
    async fn test_fetch_unset_variable_is_null() {
        let query = EnvQuery::new("TIDEWATCH_ENV_DEP_UNSET").unwrap();
        let fetched = query.fetch(&ClientSet::new(), 0).await.unwrap();
        assert_eq!(fetched.value, Value::Null);
    }
}
