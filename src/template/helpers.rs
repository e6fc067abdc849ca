// ABOUTME: Template helper functions: plain formatting helpers and the sandboxed file helper
// ABOUTME: Dep-binding helpers record used/missing dependencies against the cache while rendering

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError,
};
use serde_json::Value;
use std::env;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::error::{Result, TemplateError};
use crate::dep::file::FileQuery;
use crate::dep::{DepSet, Dependency};
use crate::store::Recaller;

/// Shared handle onto a per-execution dependency set, threaded into
/// dep-binding helpers.
pub type DepSetHandle = Arc<Mutex<DepSet>>;

/// Environment variable helper with an optional default for unset variables.
pub fn env_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let name = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .ok_or_else(|| RenderError::new("env helper requires a variable name parameter"))?;

    let default_value = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");

    let value = env::var(name).unwrap_or_else(|_| default_value.to_string());
    out.write(&value)?;
    Ok(())
}

/// Current UTC time, formatted with an optional strftime string.
pub fn timestamp_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let format = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .unwrap_or("%Y-%m-%d %H:%M:%S");

    out.write(&Utc::now().format(format).to_string())?;
    Ok(())
}

pub fn upper_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let input = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .ok_or_else(|| RenderError::new("upper helper requires an input parameter"))?;

    out.write(&input.to_uppercase())?;
    Ok(())
}

pub fn lower_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let input = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .ok_or_else(|| RenderError::new("lower helper requires an input parameter"))?;

    out.write(&input.to_lowercase())?;
    Ok(())
}

pub fn trim_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let input = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .ok_or_else(|| RenderError::new("trim helper requires an input parameter"))?;

    out.write(input.trim())?;
    Ok(())
}

pub fn base64_encode_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let input = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .ok_or_else(|| RenderError::new("base64_encode helper requires an input parameter"))?;

    out.write(&BASE64.encode(input.as_bytes()))?;
    Ok(())
}

pub fn base64_decode_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let input = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .ok_or_else(|| RenderError::new("base64_decode helper requires an input parameter"))?;

    let decoded = BASE64
        .decode(input)
        .map_err(|e| RenderError::new(format!("base64 decode error: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| RenderError::new(format!("UTF-8 decode error: {}", e)))?;

    out.write(&decoded)?;
    Ok(())
}

/// Falls back to the second parameter when the first is empty.
pub fn default_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    let default_value = h
        .param(1)
        .and_then(|v| v.value().as_str())
        .ok_or_else(|| RenderError::new("default helper requires a default value parameter"))?;

    out.write(if value.is_empty() { default_value } else { value })?;
    Ok(())
}

/// Register the built-in plain helpers. These never touch the cache.
pub fn register_plain_helpers(handlebars: &mut Handlebars) {
    handlebars.register_helper("env", Box::new(env_helper));
    handlebars.register_helper("timestamp", Box::new(timestamp_helper));
    handlebars.register_helper("upper", Box::new(upper_helper));
    handlebars.register_helper("lower", Box::new(lower_helper));
    handlebars.register_helper("trim", Box::new(trim_helper));
    handlebars.register_helper("base64_encode", Box::new(base64_encode_helper));
    handlebars.register_helper("base64_decode", Box::new(base64_decode_helper));
    handlebars.register_helper("default", Box::new(default_helper));
}

/// Register the built-in dependency-binding helpers against this execution's
/// recaller and used/missing sets.
pub(crate) fn register_dep_helpers(
    handlebars: &mut Handlebars,
    recaller: Arc<dyn Recaller>,
    used: DepSetHandle,
    missing: DepSetHandle,
    sandbox_path: Option<PathBuf>,
) {
    handlebars.register_helper(
        "file",
        Box::new(
            move |h: &Helper,
                  _: &Handlebars,
                  _: &Context,
                  _: &mut RenderContext,
                  out: &mut dyn Output|
                  -> HelperResult {
                let path = h
                    .param(0)
                    .and_then(|v| v.value().as_str())
                    .ok_or_else(|| RenderError::new("file helper requires a path parameter"))?;
                if path.is_empty() {
                    return Ok(());
                }

                path_in_sandbox(sandbox_path.as_deref(), path)
                    .map_err(|e| RenderError::new(e.to_string()))?;

                let dep: Arc<dyn Dependency> = Arc::new(
                    FileQuery::new(path).map_err(|e| RenderError::new(e.to_string()))?,
                );
                let id = dep.id();
                used.lock()
                    .expect("used set lock poisoned")
                    .add(Arc::clone(&dep));

                match recaller.recall(&id) {
                    Some(Value::Null) => {}
                    Some(Value::String(contents)) => out.write(&contents)?,
                    Some(other) => out.write(&other.to_string())?,
                    None => {
                        missing.lock().expect("missing set lock poisoned").add(dep);
                    }
                }
                Ok(())
            },
        ),
    );
}

/// Returns an error if the path does not fall within the sandbox. Symlinks
/// are resolved when the path exists; nonexistent paths are checked after
/// lexical normalization.
pub fn path_in_sandbox(sandbox: Option<&Path>, path: &str) -> Result<()> {
    let Some(sandbox) = sandbox else {
        return Ok(());
    };

    let resolved =
        std::fs::canonicalize(path).unwrap_or_else(|_| normalize_lexically(Path::new(path)));
    let root =
        std::fs::canonicalize(sandbox).unwrap_or_else(|_| normalize_lexically(sandbox));

    if !resolved.starts_with(&root) {
        return Err(TemplateError::SandboxViolation(path.to_string()));
    }
    Ok(())
}

/// Folds `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
