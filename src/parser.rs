//! Parsing of raw model output into a round [`Decision`].
//!
//! The model is asked to answer with a JSON object carrying its reply and a
//! hand-back flag, and to wrap any code it wants run between
//! [`EXECUTE_BEGIN`] and [`EXECUTE_END`]. Parsing never fails: anything that
//! cannot be understood degrades to a plain-text reply without code.

use serde::{Deserialize, Serialize};

/// Marker that opens an executable code block.
pub const EXECUTE_BEGIN: &str = "<execute_python>";

/// Marker that closes an executable code block.
pub const EXECUTE_END: &str = "</execute_python>";

/// The model's decision for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Optional reasoning the model shares alongside its reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<String>,
    /// Natural-language reply, possibly containing a code block.
    pub response: String,
    /// Code extracted from `response`.
    #[serde(skip)]
    pub code: Option<String>,
    /// Whether control should return to the user.
    #[serde(default)]
    pub let_user_respond: bool,
}

impl Decision {
    /// Textual form appended to the transcript as the assistant message.
    pub fn to_transcript_text(&self) -> String {
        // Serializing a struct of strings and a bool cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| self.response.clone())
    }
}

#[derive(Deserialize)]
struct RawDecision {
    #[serde(default)]
    thoughts: Option<String>,
    response: String,
    #[serde(default)]
    let_user_respond: bool,
}

/// Returns the code between the first begin marker and the first end marker
/// after it.
///
/// A missing begin marker or an unterminated block yields `None`.
pub fn extract_code(text: &str) -> Option<String> {
    let start = text.find(EXECUTE_BEGIN)? + EXECUTE_BEGIN.len();
    let len = text[start..].find(EXECUTE_END)?;
    Some(text[start..start + len].to_string())
}

/// Parses raw model output into a [`Decision`].
pub fn parse_decision(raw: &str) -> Decision {
    match extract_json(raw) {
        Some(parsed) => Decision {
            code: extract_code(&parsed.response),
            thoughts: parsed.thoughts,
            response: parsed.response,
            let_user_respond: parsed.let_user_respond,
        },
        None => {
            tracing::warn!("model output is not a JSON decision, treating it as plain text");
            let code = extract_code(raw);
            Decision {
                thoughts: None,
                response: raw.trim().to_string(),
                let_user_respond: code.is_none(),
                code,
            }
        }
    }
}

fn extract_json(raw: &str) -> Option<RawDecision> {
    let trimmed = raw.trim();
    if let Ok(parsed) = serde_json::from_str(trimmed) {
        return Some(parsed);
    }

    if let Some(fenced) = fenced_json(trimmed) {
        if let Ok(parsed) = serde_json::from_str(fenced) {
            return Some(parsed);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn fenced_json(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let len = text[start..].find("```")?;
    Some(text[start..start + len].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_code_between_markers() {
        let text = "Let me check.\n<execute_python>\nprint(1)\n</execute_python>\nDone.";
        assert_eq!(extract_code(text), Some("\nprint(1)\n".to_string()));
    }

    #[test]
    fn no_begin_marker_means_no_code() {
        assert_eq!(extract_code("just talking"), None);
        assert_eq!(extract_code("print(1)</execute_python>"), None);
    }

    #[test]
    fn unterminated_block_means_no_code() {
        assert_eq!(extract_code("<execute_python>print(1)"), None);
    }

    #[test]
    fn only_first_complete_block_is_taken() {
        let text = "<execute_python>a = 1</execute_python> then \
                    <execute_python>b = 2</execute_python>";
        assert_eq!(extract_code(text), Some("a = 1".to_string()));
    }

    #[test]
    fn end_marker_before_begin_is_ignored() {
        let text = "</execute_python><execute_python>x()</execute_python>";
        assert_eq!(extract_code(text), Some("x()".to_string()));
    }

    #[test]
    fn parses_json_decision_with_code() {
        let raw = r#"{"thoughts": "need to count", "response": "Counting.<execute_python>count()</execute_python>", "let_user_respond": false}"#;
        let decision = parse_decision(raw);

        assert_eq!(decision.thoughts.as_deref(), Some("need to count"));
        assert_eq!(decision.code.as_deref(), Some("count()"));
        assert!(!decision.let_user_respond);
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "Here you go:\n```json\n{\"response\": \"There are 3 dogs.\", \"let_user_respond\": true}\n```";
        let decision = parse_decision(raw);

        assert_eq!(decision.response, "There are 3 dogs.");
        assert!(decision.let_user_respond);
        assert_eq!(decision.code, None);
    }

    #[test]
    fn parses_json_surrounded_by_prose() {
        let raw = "Sure! {\"response\": \"hi\", \"let_user_respond\": true} hope that helps";
        assert_eq!(parse_decision(raw).response, "hi");
    }

    #[test]
    fn plain_text_without_code_hands_back_to_user() {
        let decision = parse_decision("I am not sure what you mean.");
        assert_eq!(decision.response, "I am not sure what you mean.");
        assert!(decision.let_user_respond);
    }

    #[test]
    fn plain_text_with_code_keeps_running() {
        let decision = parse_decision("<execute_python>print(2)</execute_python>");
        assert_eq!(decision.code.as_deref(), Some("print(2)"));
        assert!(!decision.let_user_respond);
    }

    #[test]
    fn transcript_text_omits_extracted_code_field() {
        let decision = parse_decision(
            r#"{"response": "<execute_python>x</execute_python>", "let_user_respond": false}"#,
        );
        let text = decision.to_transcript_text();
        assert_eq!(
            text,
            r#"{"response":"<execute_python>x</execute_python>","let_user_respond":false}"#
        );
    }
}
