//! Runtime error types.

use thiserror::Error;

use atac_core::AtacError;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors raised while building or running an [`AtacRuntime`](crate::AtacRuntime).
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Loading or initializing a configured plugin failed.
    #[error(transparent)]
    Core(#[from] AtacError),

    /// The runtime was stopped; its orchestrator cannot be restarted.
    #[error("Runtime has been stopped")]
    Stopped,

    /// Installing the shutdown signal handlers failed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
