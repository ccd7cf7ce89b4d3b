//! Sandbox module for isolated code execution.
//!
//! This module provides the [`SandboxProvider`] and [`Sandbox`] traits, the
//! [`LocalSandbox`] implementation that runs code with a local interpreter,
//! and the [`Boilerplate`] that wraps every cell with artifact syncing.

mod boilerplate;
mod local;
mod provider;

pub use boilerplate::Boilerplate;
pub use local::{LocalSandbox, LocalSandboxConfig, LocalSandboxInstance};
pub use provider::{ExecutionOutput, Sandbox, SandboxProvider};
