//! Debug configuration for the conversation loop.
//!
//! Environment variables:
//! - `AGENT_DEBUG=1` - Dump full prompts and raw model replies
//!
//! Dumps go through `tracing::debug!`, so they also need a subscriber filter
//! that lets debug events through (e.g. `RUST_LOG=code_act_agent=debug`).

use std::sync::OnceLock;

/// Global debug configuration loaded once at startup.
static DEBUG_CONFIG: OnceLock<DebugConfig> = OnceLock::new();

/// Debug configuration.
#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// Dump prompts and replies.
    pub debug_mode: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DebugConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            debug_mode: std::env::var("AGENT_DEBUG")
                .map(|v| flag_enabled(&v))
                .unwrap_or(false),
        }
    }
}

fn flag_enabled(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Gets the global debug configuration.
pub fn get_config() -> &'static DebugConfig {
    DEBUG_CONFIG.get_or_init(DebugConfig::from_env)
}

/// Returns true if debug mode is enabled.
pub fn is_debug() -> bool {
    get_config().debug_mode
}

/// Dumps the prompt sent to the model for a round.
pub fn debug_prompt(round: u32, runner: &str, prompt: &str) {
    if is_debug() {
        tracing::debug!(round, runner, prompt_len = prompt.len(), "prompt:\n{}", prompt);
    }
}

/// Dumps the raw model reply for a round.
pub fn debug_reply(round: u32, reply: &str) {
    if is_debug() {
        tracing::debug!(round, reply_len = reply.len(), "model reply:\n{}", reply);
    }
}
