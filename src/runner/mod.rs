//! Language model runners.
//!
//! The conversation loop only depends on the [`LLMRunner`] capability: an
//! ordered list of role-tagged messages in, raw text out.

mod command;

pub use command::CommandRunner;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::Message;

/// Trait for language model backends.
#[async_trait]
pub trait LLMRunner: Send + Sync {
    /// Sends `messages` to the model and returns its complete reply.
    ///
    /// When `stream` is false the runner must not return until the full
    /// reply is available.
    async fn complete(&self, messages: &[Message], stream: bool) -> Result<String>;

    /// Returns the name of this runner.
    fn name(&self) -> &str;
}

#[async_trait]
impl<R: LLMRunner + ?Sized> LLMRunner for Box<R> {
    async fn complete(&self, messages: &[Message], stream: bool) -> Result<String> {
        (**self).complete(messages, stream).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<R: LLMRunner + ?Sized> LLMRunner for Arc<R> {
    async fn complete(&self, messages: &[Message], stream: bool) -> Result<String> {
        (**self).complete(messages, stream).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
