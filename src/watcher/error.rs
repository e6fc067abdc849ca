// ABOUTME: Error types for watcher operations
// ABOUTME: Wraps terminal dependency failures surfaced through wait

use thiserror::Error;

use crate::dep::DependencyError;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("dependency failed: {0}")]
    Dependency(#[from] DependencyError),

    #[error("watcher stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, WatcherError>;
