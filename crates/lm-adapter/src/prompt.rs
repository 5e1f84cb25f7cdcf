use serde::{Deserialize, Serialize};

use crate::errors::AdapterError;

/// Plain text content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// File reference attached to a user message.
///
/// Neither backend accepts files; they are replaced by a placeholder and a
/// warning during conversion, and `data` is never transmitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePart {
    /// URL or base64 payload.
    pub data: String,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// A tool invocation requested by the assistant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPart {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Serialized JSON arguments.
    pub input: String,
}

/// The result of a previous tool invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: serde_json::Value,
}

/// Content legal inside a user message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UserPart {
    Text(TextPart),
    File(FilePart),
}

/// Content legal inside an assistant message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AssistantPart {
    Text(TextPart),
    ToolCall(ToolCallPart),
}

/// One prompt message; the role decides which parts it may hold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: String },
    User { content: Vec<UserPart> },
    Assistant { content: Vec<AssistantPart> },
    Tool { content: Vec<ToolResultPart> },
}

const KNOWN_ROLES: [&str; 4] = ["system", "user", "assistant", "tool"];

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            content: text.into(),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![UserPart::Text(TextPart { text: text.into() })],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: vec![AssistantPart::Text(TextPart { text: text.into() })],
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: serde_json::Value,
    ) -> Self {
        Self::Tool {
            content: vec![ToolResultPart {
                tool_call_id: tool_call_id.into(),
                tool_name: tool_name.into(),
                output,
            }],
        }
    }

    /// Wire name of the message role.
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    /// Parses one SDK-shaped message.
    ///
    /// User and assistant `content` may be a bare string, shorthand for a
    /// single text part. Unknown roles fail with `UnsupportedRole`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, AdapterError> {
        let role = value
            .get("role")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidPrompt("message is missing a role".into()))?;
        if !KNOWN_ROLES.contains(&role) {
            return Err(AdapterError::UnsupportedRole { role: role.into() });
        }

        let mut value = value.clone();
        if matches!(role, "user" | "assistant")
            && let Some(text) = value.get("content").and_then(|c| c.as_str())
        {
            value["content"] = serde_json::json!([{ "type": "text", "text": text }]);
        }
        serde_json::from_value(value)
            .map_err(|e| AdapterError::InvalidPrompt(format!("invalid {role} message: {e}")))
    }
}

/// Ordered conversation handed to a model call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prompt {
    messages: Vec<Message>,
}

impl Prompt {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Parses an SDK-shaped message array.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, AdapterError> {
        let items = value
            .as_array()
            .ok_or_else(|| AdapterError::InvalidPrompt("prompt must be an array".into()))?;
        let messages = items
            .iter()
            .map(Message::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { messages })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl From<Vec<Message>> for Prompt {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_every_known_role() {
        let prompt = Prompt::from_json(&json!([
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": [
                {"type": "text", "text": "look"},
                {"type": "file", "data": "https://x/y.png", "mediaType": "image/png", "filename": "y.png"}
            ]},
            {"role": "assistant", "content": [
                {"type": "tool-call", "toolCallId": "c1", "toolName": "ls", "input": "{}"}
            ]},
            {"role": "tool", "content": [
                {"type": "tool-result", "toolCallId": "c1", "toolName": "ls", "output": ["a.rs"]}
            ]}
        ]))
        .expect("prompt");

        let roles: Vec<_> = prompt.messages().iter().map(Message::role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
        assert!(matches!(
            &prompt.messages()[1],
            Message::User { content } if matches!(&content[1], UserPart::File(f) if f.filename.as_deref() == Some("y.png"))
        ));
    }

    #[test]
    fn unknown_role_is_a_hard_error() {
        let err = Prompt::from_json(&json!([
            {"role": "user", "content": "hi"},
            {"role": "developer", "content": "x"}
        ]))
        .expect_err("unknown role");
        assert_eq!(
            err,
            AdapterError::UnsupportedRole {
                role: "developer".into()
            }
        );
    }

    #[test]
    fn string_content_is_shorthand_for_one_text_part() {
        let message = Message::from_json(&json!({"role": "user", "content": "hello"})).expect("msg");
        assert_eq!(message, Message::user_text("hello"));
    }

    #[test]
    fn part_not_legal_for_role_is_rejected() {
        let err = Message::from_json(&json!({
            "role": "user",
            "content": [{"type": "tool-call", "toolCallId": "c", "toolName": "t", "input": "{}"}]
        }))
        .expect_err("tool call in user message");
        assert!(matches!(err, AdapterError::InvalidPrompt(msg) if msg.contains("user")));
    }
}
