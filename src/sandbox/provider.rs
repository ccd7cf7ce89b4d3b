//! Sandbox provider trait and types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Captured result of running a piece of code in a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code; `None` when the process was killed.
    pub exit_code: Option<i32>,
    /// Whether execution was cut off by the sandbox timeout.
    pub timed_out: bool,
    pub duration: Duration,
}

impl ExecutionOutput {
    /// Returns true if the code ran to completion without error.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Renders the output as observation text for the model.
    pub fn text(&self) -> String {
        let mut out = String::new();
        if !self.stdout.is_empty() {
            out.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("STDERR:\n");
            out.push_str(&self.stderr);
        }
        if self.timed_out {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("Execution timed out after {:?}", self.duration));
        } else if let Some(code) = self.exit_code.filter(|c| *c != 0) {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("Execution failed with exit code {}", code));
        }
        if out.is_empty() {
            out.push_str("Execution finished with no output.");
        }
        out
    }
}

/// Represents an active sandbox environment.
///
/// Remote references returned by [`Sandbox::upload`] are paths inside the
/// sandbox that code running there can open directly.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Returns the working directory of the sandbox.
    fn path(&self) -> &Path;

    /// Copies a host file into the sandbox and returns its remote reference.
    async fn upload(&self, local: &Path) -> Result<PathBuf>;

    /// Copies a sandbox file back to the host and returns the local path.
    async fn download(&self, remote: &Path) -> Result<PathBuf>;

    /// Runs `source` and captures its output.
    ///
    /// Code that fails is still `Ok`; `Err` means the sandbox itself could not
    /// run anything.
    async fn execute(&self, source: &str) -> Result<ExecutionOutput>;

    /// Cleans up the sandbox, removing all resources.
    fn cleanup(&mut self) -> Result<()>;
}

/// Provider for creating sandboxed environments.
pub trait SandboxProvider: Send + Sync {
    /// The type of sandbox this provider creates.
    type Sandbox: Sandbox;

    /// Creates a new sandbox.
    fn create(&self) -> Result<Self::Sandbox>;
}
