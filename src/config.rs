//! Agent configuration and validation.
//!
//! Configuration is resolved once at startup, either from a TOML/YAML file or
//! from the environment, and passed explicitly to the agent afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::artifacts::DEFAULT_ARTIFACT_FILE;
use crate::backoff::RetryPolicy;
use crate::error::{Error, Result};
use crate::sandbox::LocalSandboxConfig;

/// Environment variable naming the workspace directory.
pub const WORKSPACE_ENV: &str = "CODE_ACT_WORKSPACE";

/// Default cap on conversation rounds per call.
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

/// Configuration for a [`CodeActAgent`](crate::agent::CodeActAgent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Directory holding the artifact file and any user modules.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Artifact file name, relative to the workspace.
    #[serde(default = "default_artifact_file")]
    pub artifact_file: PathBuf,

    /// Maximum rounds before the loop gives control back.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// 0 logs round boundaries only; 1 and above also log decisions and
    /// execution output.
    #[serde(default)]
    pub verbosity: u8,

    /// Attempts per model call, including the first.
    #[serde(default = "default_llm_retries")]
    pub llm_retries: u32,

    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    #[serde(default)]
    pub sandbox: LocalSandboxConfig,
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_artifact_file() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACT_FILE)
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_llm_retries() -> u32 {
    3
}

fn default_retry_initial_ms() -> u64 {
    500
}

fn default_retry_max_ms() -> u64 {
    8_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            artifact_file: default_artifact_file(),
            max_iterations: default_max_iterations(),
            verbosity: 0,
            llm_retries: default_llm_retries(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
            sandbox: LocalSandboxConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Builds a configuration from the environment.
    ///
    /// `CODE_ACT_WORKSPACE` selects the workspace; it is also exposed to
    /// sandboxed code on the module search path.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(workspace) = Self::workspace_from_env() {
            config = config.with_workspace(workspace);
        }
        config
    }

    /// Loads a configuration file. The format follows the extension:
    /// `.toml`, `.yaml` or `.yml`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e))),
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e))),
            _ => Err(Error::Config(format!(
                "unsupported config format: {}",
                path.display()
            ))),
        }
    }

    /// Sets the workspace and exposes it on the sandbox module path.
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        if self.sandbox.python_path.is_none() {
            self.sandbox.python_path = Some(self.workspace.clone());
        }
        self
    }

    /// Applies a workspace override, falling back to the configured
    /// workspace. Either way the workspace ends up on the module path.
    pub fn with_workspace_override(self, workspace: Option<PathBuf>) -> Self {
        let workspace = workspace.unwrap_or_else(|| self.workspace.clone());
        self.with_workspace(workspace)
    }

    /// Workspace override from `CODE_ACT_WORKSPACE`, if set.
    pub fn workspace_from_env() -> Option<PathBuf> {
        std::env::var_os(WORKSPACE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Full path of the default artifact file.
    pub fn artifact_path(&self) -> PathBuf {
        self.workspace.join(&self.artifact_file)
    }

    /// Retry policy for model calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.llm_retries,
            initial_delay: Duration::from_millis(self.retry_initial_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
        }
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for LocalSandboxConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.interpreter.trim().is_empty() {
            result.add_error("sandbox interpreter cannot be empty");
        }
        if self.timeout_secs == 0 {
            result.add_error("sandbox timeout_secs must be greater than 0");
        } else if self.timeout_secs < 5 {
            result.add_warning("sandbox timeout under 5 seconds may cut off most code cells");
        }

        result
    }
}

impl Validate for AgentConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.max_iterations == 0 {
            result.add_error("max_iterations must be greater than 0");
        } else if self.max_iterations > 1000 {
            result.add_warning("max_iterations over 1000 may run up large model costs");
        }

        if self.artifact_file.as_os_str().is_empty() {
            result.add_error("artifact_file cannot be empty");
        }
        if self.artifact_file.is_absolute() {
            result.add_warning("artifact_file is absolute, workspace will be ignored for it");
        }

        if self.llm_retries == 0 {
            result.add_warning("llm_retries is 0, model calls will still be attempted once");
        }
        if self.retry_initial_ms > self.retry_max_ms {
            result.add_error("retry_initial_ms must not exceed retry_max_ms");
        }

        result.merge(self.sandbox.validate());
        result
    }
}
