// ABOUTME: Main library module for the tidewatch template-watching engine
// ABOUTME: Exports the dependency cache, view/watcher runtime and template execution model

pub mod dep;
pub mod resolver;
pub mod store;
pub mod template;
pub mod view;
pub mod watcher;

// Re-export commonly used types
pub use dep::{
    ClientSet, DepSet, Dependency, DependencyError, Fetched, ResponseMetadata, StopSignal,
};
pub use resolver::{ResolveEvent, Resolver};
pub use store::{Recaller, Store};
pub use template::{
    DepSetHandle, ExecuteResult, MemoryRenderer, RenderResult, Renderer, Template, TemplateError,
    TemplateFunc, TemplateInput,
};
pub use view::{RetryConfig, View};
pub use watcher::{Watcher, WatcherError, WatcherInput};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
