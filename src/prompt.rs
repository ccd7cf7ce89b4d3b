//! Prompt rendering for the conversation loop.
//!
//! The loop hands the model a single prompt: fixed instructions, optional
//! tool documentation, then the transcript rendered as labelled sections.

use crate::message::{Message, Role};
use crate::parser::{EXECUTE_BEGIN, EXECUTE_END};

/// Default instructions describing the response protocol.
pub fn default_instructions() -> String {
    format!(
        "You are a helpful agent that solves the user's task by writing and running Python code.\n\
         Named artifacts persist between code runs in a mapping called `artifacts`; \
         read them with `artifacts[name]` and store bytes with `artifacts[name] = data`.\n\
         Reply with a JSON object with the keys \"thoughts\", \"response\" and \"let_user_respond\".\n\
         To run code, put it inside \"response\" between {begin} and {end}. Only the first block is run, \
         and its output is returned to you as an OBSERVATION.\n\
         Set \"let_user_respond\" to true when you need input from the user or the task is done.",
        begin = EXECUTE_BEGIN,
        end = EXECUTE_END,
    )
}

/// Template combining instructions, tool documentation and examples with the
/// rendered conversation.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub instructions: String,
    /// Documentation of the functions available inside the sandbox.
    pub documentation: Option<String>,
    pub examples: Vec<String>,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            instructions: default_instructions(),
            documentation: None,
            examples: Vec::new(),
        }
    }
}

impl PromptTemplate {
    /// Sets the tool documentation section.
    pub fn with_documentation(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    /// Adds a worked example.
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    /// Builds the full prompt for the given transcript.
    pub fn render(&self, chat: &[Message]) -> String {
        let mut prompt = String::new();
        prompt.push_str(&self.instructions);
        prompt.push_str("\n\n");

        if let Some(documentation) = &self.documentation {
            prompt.push_str("**Documentation**:\n");
            prompt.push_str(documentation);
            prompt.push_str("\n\n");
        }

        if !self.examples.is_empty() {
            prompt.push_str("**Examples**:\n");
            prompt.push_str(&self.examples.join("\n"));
            prompt.push_str("\n\n");
        }

        prompt.push_str("**Conversation**:\n");
        prompt.push_str(&render_conversation(chat));
        prompt
    }
}

/// Renders a transcript as `USER:` / `OBSERVATION:` / `AGENT:` sections.
pub fn render_conversation(chat: &[Message]) -> String {
    let mut conversation = String::new();
    for message in chat {
        match message.role {
            Role::Observation => {
                conversation.push_str(&format!("{}:\n{}\n\n", message.role.label(), message.content))
            }
            Role::User | Role::Assistant => {
                conversation.push_str(&format!("{}: {}\n\n", message.role.label(), message.content))
            }
        }
    }
    conversation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_uses_role_labels() {
        let chat = vec![
            Message::user("count the dogs"),
            Message::observation("Artifacts loaded:\n(none)\n"),
            Message::assistant("{\"response\":\"ok\"}"),
        ];

        assert_eq!(
            render_conversation(&chat),
            "USER: count the dogs\n\n\
             OBSERVATION:\nArtifacts loaded:\n(none)\n\n\n\
             AGENT: {\"response\":\"ok\"}\n\n"
        );
    }

    #[test]
    fn default_instructions_mention_markers() {
        let instructions = default_instructions();
        assert!(instructions.contains(EXECUTE_BEGIN));
        assert!(instructions.contains(EXECUTE_END));
        assert!(instructions.contains("let_user_respond"));
    }

    #[test]
    fn template_includes_optional_sections_only_when_set() {
        let chat = vec![Message::user("hi")];

        let bare = PromptTemplate::default().render(&chat);
        assert!(!bare.contains("**Documentation**"));
        assert!(!bare.contains("**Examples**"));
        assert!(bare.ends_with("USER: hi\n\n"));

        let full = PromptTemplate::default()
            .with_documentation("load_image(path) -> array")
            .with_example("USER: count cars")
            .render(&chat);
        assert!(full.contains("**Documentation**:\nload_image(path) -> array"));
        assert!(full.contains("**Examples**:\nUSER: count cars"));
    }
}
