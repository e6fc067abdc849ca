// ABOUTME: Drives a template towards a complete render against a watcher
// ABOUTME: Registers missing dependencies, reaps unused ones, and reports completion

use std::sync::Arc;
use tracing::debug;

use crate::template::Template;
use crate::watcher::Watcher;

/// Outcome of one resolution pass over a template.
#[derive(Debug, Clone)]
pub struct ResolveEvent {
    /// True when the execution used only dependencies already in the cache.
    pub complete: bool,
    /// The (possibly partial) output of this pass.
    pub contents: Vec<u8>,
}

/// Runs templates against a watcher's cache. One resolver may serve any
/// number of templates; it holds no per-template state.
///
/// Callers loop: `run`, and while the event is incomplete, `watcher.wait()`
/// and `run` again. A complete event's contents are ready for the template's
/// renderer.
#[derive(Debug, Default, Clone, Copy)]
pub struct Resolver;

impl Resolver {
    pub fn new() -> Self {
        Self
    }

    /// Executes the template once against the watcher's cache. Missing
    /// dependencies are registered with the watcher, which starts polling
    /// them; used dependencies are marked seen and everything unused is
    /// reaped.
    pub fn run(&self, template: &Template, watcher: &Watcher) -> crate::Result<ResolveEvent> {
        let result = template.execute(Arc::new(watcher.clone()))?;

        if !result.missing.is_empty() {
            debug!(
                template = %template.id(),
                missing = result.missing.len(),
                "render incomplete, registering missing dependencies"
            );
            for dep in result.missing.iter() {
                watcher.add(Arc::clone(dep));
            }

            return Ok(ResolveEvent {
                complete: false,
                contents: result.output,
            });
        }

        watcher.mark_seen(&result.used);
        watcher.clean_deps(&result.used);

        Ok(ResolveEvent {
            complete: true,
            contents: result.output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Recaller, Store};
    use crate::template::TemplateInput;
    use crate::watcher::{Watcher, WatcherInput};
    use serde_json::json;
    use std::time::Duration;

    fn watcher() -> Watcher {
        Watcher::new(WatcherInput::default())
    }

    #[tokio::test]
    async fn test_complete_render_without_dependencies() {
        let w = watcher();
        let tpl = Template::new(TemplateInput {
            contents: r#"{{ upper "done" }}"#.to_string(),
            ..Default::default()
        });

        let event = Resolver::new().run(&tpl, &w).unwrap();
        assert!(event.complete);
        assert_eq!(event.contents, b"DONE");

        w.stop().await;
    }

    #[tokio::test]
    async fn test_missing_dependency_starts_view() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");
        tokio::fs::write(&path, "from disk").await.unwrap();

        let w = watcher();
        let tpl = Template::new(TemplateInput {
            contents: format!(r#"{{{{ file "{}" }}}}"#, path.display()),
            ..Default::default()
        });

        let resolver = Resolver::new();
        let first = resolver.run(&tpl, &w).unwrap();
        assert!(!first.complete);
        assert!(w.watching(&format!("file({})", path.display())));

        tokio::time::timeout(Duration::from_secs(5), w.wait())
            .await
            .expect("file view never produced data")
            .unwrap();

        let second = resolver.run(&tpl, &w).unwrap();
        assert!(second.complete);
        assert_eq!(second.contents, b"from disk");

        w.stop().await;
    }

    #[tokio::test]
    async fn test_complete_render_reaps_unused() {
        let w = watcher();

        // Seed the cache and a stray view that no template uses.
        w.add(std::sync::Arc::new(crate::dep::fake::FakeDep::new("stray")));
        w.store().save("file(/seeded)", json!("seeded"));

        let tpl = Template::new(TemplateInput {
            contents: r#"{{ file "/seeded" }}"#.to_string(),
            ..Default::default()
        });

        let event = Resolver::new().run(&tpl, &w).unwrap();
        assert!(event.complete);
        assert_eq!(event.contents, b"seeded");
        assert!(!w.watching("fake(stray)"));

        w.stop().await;
    }

    #[tokio::test]
    async fn test_execution_does_not_mutate_store() {
        let w = watcher();
        let store: &std::sync::Arc<Store> = w.store();
        store.save("file(/a)", json!("a"));

        let tpl = Template::new(TemplateInput {
            contents: r#"{{ file "/a" }}{{ file "/b" }}"#.to_string(),
            ..Default::default()
        });
        Resolver::new().run(&tpl, &w).unwrap();

        // The miss on /b registered a view but wrote nothing to the cache.
        assert_eq!(store.recall("file(/a)"), Some(json!("a")));
        assert_eq!(store.recall("file(/b)"), None);

        w.stop().await;
    }
}
