// ABOUTME: Error types for template parsing, execution and rendering
// ABOUTME: Separates syntax errors from execution errors and sandbox violations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template syntax error: {0}")]
    SyntaxError(String),

    #[error("template execution error: {0}")]
    ExecutionError(#[from] handlebars::RenderError),

    #[error("'{0}' is outside of sandbox")]
    SandboxViolation(String),

    #[error("no renderer configured for template {0}")]
    NoRenderer(String),

    #[error("render failed: {0}")]
    RenderError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TemplateError>;
