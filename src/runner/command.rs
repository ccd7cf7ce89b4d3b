//! Runner that shells out to a headless LLM CLI.
//!
//! The prompt is written to the child's stdin. A long transcript would not
//! fit in a single command-line argument.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::message::Message;
use crate::prompt::render_conversation;

use super::LLMRunner;

/// Runner for CLI-based models such as `claude --print`.
pub struct CommandRunner {
    /// Program to execute.
    program: String,
    /// Arguments passed to the program.
    args: Vec<String>,
    /// Maximum time to wait for a reply.
    timeout: Duration,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner {
    /// Creates a runner for the `claude` CLI in non-interactive mode.
    pub fn new() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec!["--print".to_string()],
            timeout: Duration::from_secs(600),
        }
    }

    /// Creates a runner for an arbitrary program that reads the prompt from
    /// stdin and prints the reply.
    pub fn with_program(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(600),
        }
    }

    /// Sets the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Collapses the message list into the single prompt a CLI accepts.
fn prompt_text(messages: &[Message]) -> String {
    match messages {
        [only] => only.content.clone(),
        _ => render_conversation(messages),
    }
}

#[async_trait]
impl LLMRunner for CommandRunner {
    async fn complete(&self, messages: &[Message], stream: bool) -> Result<String> {
        if stream {
            tracing::debug!(runner = %self.program, "streaming not supported, collecting full reply");
        }

        let prompt = prompt_text(messages);
        tracing::info!(
            cli = %self.program,
            messages = messages.len(),
            prompt_bytes = prompt.len(),
            "invoking model CLI"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Llm(format!("failed to spawn {}: {}", self.program, e)))?;

        // Feed stdin concurrently; the child may fill its stdout pipe before
        // it has read the whole prompt.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Llm(format!("no stdin for {}", self.program)))?;
        let writer = tokio::spawn(async move {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Llm(format!("{} timed out after {:?}", self.program, self.timeout)))?
            .map_err(|e| Error::Llm(format!("failed to wait for {}: {}", self.program, e)))?;

        let written = writer
            .await
            .map_err(|e| Error::Llm(format!("prompt writer for {} failed: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Llm(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        if let Err(e) = written {
            return Err(Error::Llm(format!(
                "failed to send prompt to {}: {}",
                self.program, e
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn name(&self) -> &str {
        &self.program
    }
}
