//! Error types for the code-act agent.
//!
//! Only structural failures live here. Code that fails inside the sandbox is
//! reported as [`ExecutionOutput`](crate::sandbox::ExecutionOutput) data and
//! fed back to the model, never as an [`Error`].

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for agent operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The caller supplied input the loop cannot start from.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The artifact file is missing, unreadable or corrupt.
    #[error("artifact storage error at {path}: {reason}")]
    Storage { path: PathBuf, reason: String },

    /// Failed to create a sandbox.
    #[error("failed to create sandbox: {0}")]
    SandboxCreation(String),

    /// Failed to clean up a sandbox.
    #[error("failed to clean up sandbox at {path}: {reason}")]
    SandboxCleanup { path: PathBuf, reason: String },

    /// Moving a file into or out of the sandbox failed.
    #[error("sandbox transfer failed: {0}")]
    Sandbox(String),

    /// The language model call failed.
    #[error("language model error: {0}")]
    Llm(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error outside of artifact storage.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a storage error for the given path.
    pub fn storage(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::Storage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, Error>;
