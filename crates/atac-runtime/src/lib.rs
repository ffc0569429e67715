//! ATAC Runtime - bootstrap layer for the ATAC dispatch core.
//!
//! This crate provides:
//! - Layered configuration (`AtacConfig`, `ConfigLoader`) backed by figment
//! - Logging setup (`LoggingBuilder`, `init_from_config`)
//! - Signed webhook ingress (`WebhookIngress`)
//! - The `AtacRuntime` wrapper that owns the service container and
//!   orchestrator and drives start/stop
//!
//! ```ignore
//! use atac_runtime::AtacRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = AtacRuntime::new();
//!     runtime.register_builtin_plugins();
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod webhook;

pub use config::{AtacConfig, ConfigLoader, LoggingConfig, load_config, load_config_from_file};
pub use error::{ConfigError, ConfigResult, RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents, init_from_config};
pub use runtime::{AtacRuntime, RuntimeBuilder};
pub use webhook::{WebhookError, WebhookIngress, WebhookPayload, WebhookRoute};

pub use tracing;
pub use tracing_subscriber;

/// Logging macros for plugin and service authors.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
