// ABOUTME: Renderer contract invoked once per caller-driven render
// ABOUTME: Ships a deduplicating in-memory renderer; file and network renderers live with callers

use std::sync::Mutex;

use super::error::Result;

/// Outcome of handing rendered contents to a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    /// False when the renderer decided the contents were already current.
    pub did_render: bool,
    pub contents: Vec<u8>,
}

/// Destination for rendered template output. The core does not prescribe
/// what a renderer does with the bytes.
pub trait Renderer: Send + Sync {
    fn render(&self, contents: &[u8]) -> Result<RenderResult>;
}

/// Keeps the last rendered contents in memory and reports `did_render =
/// false` when handed identical bytes. Useful for daemons that only want to
/// act on actual changes, and for tests.
#[derive(Default)]
pub struct MemoryRenderer {
    last: Mutex<Option<Vec<u8>>>,
}

impl MemoryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently rendered contents, if any.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.last.lock().expect("renderer lock poisoned").clone()
    }
}

impl Renderer for MemoryRenderer {
    fn render(&self, contents: &[u8]) -> Result<RenderResult> {
        let mut last = self.last.lock().expect("renderer lock poisoned");
        let unchanged = last.as_deref() == Some(contents);
        if !unchanged {
            *last = Some(contents.to_vec());
        }

        Ok(RenderResult {
            did_render: !unchanged,
            contents: contents.to_vec(),
        })
    }
}
