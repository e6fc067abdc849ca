// ABOUTME: Local file dependency watched by polling stat metadata
// ABOUTME: Emits the file contents whenever size or modification time change

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::debug;

use super::error::{DependencyError, Result};
use super::{ClientSet, Dependency, Fetched, StopSignal};

/// Default amount of time to sleep between stat polls. Filesystem event APIs
/// are not portable enough for the platforms this has to run on, so the file
/// dependency polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStat {
    len: u64,
    modified: SystemTime,
}

/// A dependency on the contents of a local file.
pub struct FileQuery {
    path: PathBuf,
    poll_interval: Duration,
    stat: Mutex<Option<FileStat>>,
    stop: StopSignal,
}

impl FileQuery {
    pub fn new(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(DependencyError::InvalidQuery(format!(
                "file: invalid format: {:?}",
                path
            )));
        }

        Ok(Self {
            path: PathBuf::from(trimmed),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stat: Mutex::new(None),
            stop: StopSignal::new(),
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn stat(&self) -> Result<FileStat> {
        let meta = tokio::fs::metadata(&self.path).await?;
        Ok(FileStat {
            len: meta.len(),
            modified: meta.modified()?,
        })
    }
}

#[async_trait]
impl Dependency for FileQuery {
    /// Blocks until the file changes (or the first call observes it), then
    /// returns its contents. The index is derived from the wall clock; the
    /// watcher only compares indices for equality.
    async fn fetch(&self, _clients: &ClientSet, _last_index: u64) -> Result<Fetched> {
        loop {
            eprintln!("DEBUG loop top, stopped={}", self.stop.is_stopped());
            if self.stop.is_stopped() {
                return Err(DependencyError::Stopped);
            }

            eprintln!("DEBUG before stat");
            let stat = self.stat().await?;
            eprintln!("DEBUG after stat");
            let changed = self
                .stat
                .lock()
                .expect("file stat lock poisoned")
                .map_or(true, |last| last != stat);

            if changed {
                let contents = tokio::fs::read_to_string(&self.path).await?;
                *self.stat.lock().expect("file stat lock poisoned") = Some(stat);

                debug!(path = %self.path.display(), bytes = contents.len(), "file changed");
                let index = chrono::Utc::now().timestamp_millis() as u64;
                return Ok(Fetched::new(Value::String(contents), index));
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

impl fmt::Display for FileQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file({})", self.path.display())
    }
}
