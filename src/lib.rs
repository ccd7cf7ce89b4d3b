//! Code-Act Agent - a conversational agent that acts by running code
//!
//! This library provides the conversation loop that turns model replies into
//! sandboxed code execution, keeps a named artifact store in sync between the
//! host and the sandbox, and decides when to hand control back to the user.

pub mod agent;
pub mod artifacts;
pub mod backoff;
pub mod config;
pub mod debug;
pub mod error;
pub mod message;
pub mod parser;
pub mod prompt;
pub mod runner;
pub mod sandbox;

pub use agent::{CodeActAgent, ConversationOutcome, TerminationReason};
pub use artifacts::{ArtifactPayload, ArtifactStore};
pub use backoff::{ExponentialBackoff, RetryPolicy};
pub use config::{AgentConfig, Validate, ValidationResult};
pub use error::Error;
pub use message::{ChatInput, Message, Role};
pub use parser::{extract_code, parse_decision, Decision, EXECUTE_BEGIN, EXECUTE_END};
pub use prompt::PromptTemplate;
pub use runner::{CommandRunner, LLMRunner};
pub use sandbox::{
    Boilerplate, ExecutionOutput, LocalSandbox, LocalSandboxConfig, Sandbox, SandboxProvider,
};
