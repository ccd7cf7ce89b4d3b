//! Transcript messages exchanged between the user, the agent and the sandbox.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human driving the conversation.
    User,
    /// The model's decision for a round.
    Assistant,
    /// Artifact summaries and execution output fed back to the model.
    Observation,
}

impl Role {
    /// Section label used when rendering a transcript into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "AGENT",
            Role::Observation => "OBSERVATION",
        }
    }
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Media files attached to the message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<PathBuf>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            media: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn observation(content: impl Into<String>) -> Self {
        Self::new(Role::Observation, content)
    }

    /// Attaches media files to the message.
    pub fn with_media<I, P>(mut self, media: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.media = Some(media.into_iter().map(Into::into).collect());
        self
    }

    /// Media attached to the message, empty when none.
    pub fn media(&self) -> &[PathBuf] {
        self.media.as_deref().unwrap_or_default()
    }
}

/// Input accepted by the caller-facing entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    /// A bare task description with optional media.
    Task {
        content: String,
        media: Option<PathBuf>,
    },
    /// A full transcript.
    Messages(Vec<Message>),
}

impl ChatInput {
    /// Creates a task input with a single media file.
    pub fn task_with_media(content: impl Into<String>, media: impl Into<PathBuf>) -> Self {
        ChatInput::Task {
            content: content.into(),
            media: Some(media.into()),
        }
    }

    /// Normalizes the input into a transcript.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            ChatInput::Task { content, media } => {
                let message = Message::user(content);
                let message = match media {
                    Some(path) => message.with_media([path]),
                    None => message,
                };
                vec![message]
            }
            ChatInput::Messages(messages) => messages,
        }
    }
}

impl From<&str> for ChatInput {
    fn from(content: &str) -> Self {
        ChatInput::Task {
            content: content.to_string(),
            media: None,
        }
    }
}

impl From<String> for ChatInput {
    fn from(content: String) -> Self {
        ChatInput::Task {
            content,
            media: None,
        }
    }
}

impl From<Vec<Message>> for ChatInput {
    fn from(messages: Vec<Message>) -> Self {
        ChatInput::Messages(messages)
    }
}

/// Rejects transcripts the loop cannot start from.
pub fn validate_transcript(chat: &[Message]) -> Result<()> {
    if chat.is_empty() {
        return Err(Error::InvalidInput("chat cannot be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_to_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Observation).unwrap(),
            "\"observation\""
        );
    }

    #[test]
    fn media_is_omitted_when_absent() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn message_without_media_key_deserializes() {
        let msg: Message = serde_json::from_str(r#"{"role":"assistant","content":"ok"}"#).unwrap();
        assert_eq!(msg, Message::assistant("ok"));
        assert!(msg.media().is_empty());
    }

    #[test]
    fn task_input_becomes_single_user_message() {
        let messages = ChatInput::task_with_media("count the dogs", "dog.jpg").into_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].media(), &[PathBuf::from("dog.jpg")]);

        let messages = ChatInput::from("hello").into_messages();
        assert_eq!(messages[0].media, None);
    }

    #[test]
    fn empty_transcript_is_invalid() {
        let err = validate_transcript(&[]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(validate_transcript(&[Message::user("x")]).is_ok());
    }
}
