// ABOUTME: Error types for dependency fetch operations
// ABOUTME: Distinguishes the stop sentinel from transient and terminal fetch failures

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DependencyError {
    /// Sentinel returned by an in-flight fetch once the dependency is stopped.
    #[error("dependency stopped")]
    Stopped,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DependencyError {
    /// Transient errors are retried by the owning view with backoff;
    /// everything else stops the view and surfaces to the watcher.
    pub fn is_transient(&self) -> bool {
        matches!(self, DependencyError::Fetch(_) | DependencyError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, DependencyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DependencyError::Fetch("connection reset".to_string()).is_transient());
        assert!(DependencyError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing"
        ))
        .is_transient());

        assert!(!DependencyError::Stopped.is_transient());
        assert!(!DependencyError::InvalidQuery("bad".to_string()).is_transient());
        assert!(!DependencyError::PermissionDenied("secret/".to_string()).is_transient());
    }
}
