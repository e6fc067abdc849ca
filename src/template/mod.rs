// ABOUTME: Template module: representation, execution, helpers and render contract
// ABOUTME: Executions resolve dependency helpers against the cache, recording used and missing sets

pub mod engine;
pub mod error;
pub mod helpers;
pub mod renderer;

pub use engine::{ExecuteResult, Template, TemplateFunc, TemplateInput};
pub use error::{Result, TemplateError};
pub use helpers::DepSetHandle;
pub use renderer::{MemoryRenderer, RenderResult, Renderer};
