// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides temp-dir environments and watcher/template constructors

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use tidewatch::{Template, TemplateInput, Watcher, WatcherInput};

pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    pub async fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.file(name);
        tokio::fs::write(&path, contents)
            .await
            .expect("Failed to write test file");
        path
    }
}

pub fn new_watcher() -> Watcher {
    Watcher::new(WatcherInput::default())
}

pub fn template_for(contents: &str) -> Template {
    Template::new(TemplateInput {
        contents: contents.to_string(),
        ..Default::default()
    })
}

/// Waits on the watcher until the predicate holds, bounded by the deadline.
pub async fn wait_until<F>(watcher: &Watcher, deadline: Duration, mut predicate: F)
where
    F: FnMut() -> bool,
{
    let end = tokio::time::Instant::now() + deadline;
    while !predicate() {
        assert!(
            tokio::time::Instant::now() < end,
            "condition not reached before deadline"
        );
        tokio::time::timeout(Duration::from_secs(5), watcher.wait())
            .await
            .expect("watcher.wait stalled")
            .expect("watcher.wait returned an error");
    }
}

pub fn file_id(path: &Path) -> String {
    format!("file({})", path.display())
}

pub fn arc_template(contents: &str) -> Arc<Template> {
    Arc::new(template_for(contents))
}
