//! # pwx-runtime — runtime facade and widget loader
//!
//! The top of the stack: resolves configuration, wires the API client,
//! storage-backed trackers and the event bus together, discovers
//! placeholder containers in the host page and drives widget mounts
//! through the [`WidgetLoader`]. On wasm32 the [`wasm`] module exports
//! the `PWX` surface host pages call.

#![forbid(unsafe_code)]

mod loader;
mod registry;
mod runtime;
#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use loader::{LoaderStats, Spawner, WidgetLoader};
pub use registry::{WidgetFactory, WidgetRegistry};
pub use runtime::{Runtime, RuntimeDeps};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] pwx_config::ConfigError),
    #[error("unknown widget type `{0}`")]
    UnknownType(String),
    #[error("no widget mounted with id `{0}`")]
    UnknownWidget(String),
    #[error("widget `{widget_id}` failed to mount: {reason}")]
    Mount { widget_id: String, reason: String },
    #[error("scan finished with {} failure(s): {}", failures.len(), failures.join("; "))]
    Scan { failures: Vec<String> },
    #[error("invalid command: {0}")]
    Command(String),
    #[error("host page unavailable")]
    HostUnavailable,
}
