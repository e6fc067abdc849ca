// ABOUTME: Template representation and execution against the dependency cache
// ABOUTME: Each execution records the used and missing dependency sets alongside the output

use handlebars::{Handlebars, HelperDef};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::error::{Result, TemplateError};
use super::helpers::{self, DepSetHandle};
use super::renderer::{RenderResult, Renderer};
use crate::dep::DepSet;
use crate::store::Recaller;

/// A helper supplied by the caller through `TemplateInput::func_map_merge`.
///
/// `Plain` helpers are ordinary template functions. `DepBinding` helpers
/// participate in dependency tracking: the factory is invoked once per
/// execution with the cache recaller and that execution's used/missing sets,
/// and returns the actual template-callable helper.
#[derive(Clone)]
pub enum TemplateFunc {
    Plain(Arc<dyn Fn() -> Box<dyn HelperDef + Send + Sync> + Send + Sync>),
    DepBinding(
        Arc<
            dyn Fn(
                    Arc<dyn Recaller>,
                    DepSetHandle,
                    DepSetHandle,
                ) -> Box<dyn HelperDef + Send + Sync>
                + Send
                + Sync,
        >,
    ),
}

/// Input used when creating a template.
#[derive(Default)]
pub struct TemplateInput {
    /// Raw template contents.
    pub contents: String,

    /// Fail execution when the template references a key that does not exist,
    /// instead of rendering the zero value.
    pub err_missing_key: bool,

    /// Helpers that add to or override the built-in set.
    pub func_map_merge: HashMap<String, TemplateFunc>,

    /// Root the `file` helper is confined to. Paths resolving outside it are
    /// an execution error.
    pub sandbox_path: Option<PathBuf>,

    /// Default renderer for this template's output.
    pub renderer: Option<Arc<dyn Renderer>>,
}

/// Result of one template execution: the (possibly partial) output plus the
/// dependency sets the execution touched. `missing` empty means the render
/// is complete.
#[derive(Debug)]
pub struct ExecuteResult {
    pub used: DepSet,
    pub missing: DepSet,
    pub output: Vec<u8>,
}

/// An individual template. Immutable after construction; identified by the
/// hex MD5 of its contents.
pub struct Template {
    contents: String,
    hex_md5: String,
    err_missing_key: bool,
    func_map_merge: HashMap<String, TemplateFunc>,
    sandbox_path: Option<PathBuf>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl Template {
    pub fn new(input: TemplateInput) -> Self {
        let digest = md5::compute(input.contents.as_bytes());

        Self {
            contents: input.contents,
            hex_md5: hex::encode(digest.0),
            err_missing_key: input.err_missing_key,
            func_map_merge: input.func_map_merge,
            sandbox_path: input.sandbox_path,
            renderer: input.renderer,
        }
    }

    /// Identifier for this template, stable across processes: identical
    /// contents always yield an identical id.
    pub fn id(&self) -> &str {
        &self.hex_md5
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// Evaluates the template against the given cache view.
    ///
    /// The execution does not mutate the cache. Dependency-binding helpers
    /// add every dependency they touch to `used`; those absent from the cache
    /// land in `missing` and render as their zero value. Callers register
    /// missing dependencies with a watcher, wait, and execute again.
    pub fn execute(&self, recaller: Arc<dyn Recaller>) -> Result<ExecuteResult> {
        let used: DepSetHandle = Arc::new(Mutex::new(DepSet::new()));
        let missing: DepSetHandle = Arc::new(Mutex::new(DepSet::new()));

        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(self.err_missing_key);
        // Output is config text, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);

        helpers::register_plain_helpers(&mut handlebars);
        helpers::register_dep_helpers(
            &mut handlebars,
            Arc::clone(&recaller),
            Arc::clone(&used),
            Arc::clone(&missing),
            self.sandbox_path.clone(),
        );

        for (name, func) in &self.func_map_merge {
            let helper = match func {
                TemplateFunc::Plain(factory) => factory(),
                TemplateFunc::DepBinding(factory) => factory(
                    Arc::clone(&recaller),
                    Arc::clone(&used),
                    Arc::clone(&missing),
                ),
            };
            handlebars.register_helper(name, helper);
        }

        // Registering parses the contents once; syntax problems surface here
        // as parse errors, distinct from execution failures inside helpers.
        handlebars
            .register_template_string(self.id(), &self.contents)
            .map_err(|e| TemplateError::SyntaxError(e.to_string()))?;

        let output = handlebars.render(self.id(), &json!({}))?;

        let used = used.lock().expect("used set lock poisoned").clone();
        let missing = missing.lock().expect("missing set lock poisoned").clone();
        debug!(
            template = %self.id(),
            used = used.len(),
            missing = missing.len(),
            "executed template"
        );

        Ok(ExecuteResult {
            used,
            missing,
            output: output.into_bytes(),
        })
    }

    /// Hands contents to the configured renderer, exactly once.
    pub fn render(&self, contents: &[u8]) -> Result<RenderResult> {
        match &self.renderer {
            Some(renderer) => renderer.render(contents),
            None => Err(TemplateError::NoRenderer(self.hex_md5.clone())),
        }
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("id", &self.hex_md5)
            .field("err_missing_key", &self.err_missing_key)
            .field("sandbox_path", &self.sandbox_path)
            .finish()
    }
}
