//! Prompt conversion shared by both backends.
//!
//! Messages are lowered into the chat wire shape first; the agent backend then
//! flattens that list into a single prompt string.
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::content::{FinishReason, Warning};
use crate::options::ToolChoice;
use crate::prompt::{AssistantPart, FilePart, Message, Prompt, ToolResultPart, UserPart};

/// Native chat message role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatRole {
    fn label(self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::Tool => "Tool result",
        }
    }
}

/// Function name and serialized arguments of a native tool call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatFunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Native tool call attached to an assistant message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatFunctionCall,
}

/// Native chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Omitted entirely when the assistant made no tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: ChatRole, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Whether the target backend has a native tool-call list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolCallSupport {
    /// Tool calls go into `tool_calls`.
    Native,
    /// Tool calls are rendered into the message text.
    Inline,
}

/// Lowers a prompt into native chat messages.
///
/// Degraded input (file parts, extra tool results) is recorded in `warnings`;
/// conversion itself never fails because illegal roles and parts are
/// unrepresentable in `Prompt`.
pub fn convert_prompt(
    prompt: &Prompt,
    tool_calls: ToolCallSupport,
    warnings: &mut Vec<Warning>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(prompt.messages().len());
    for message in prompt.messages() {
        match message {
            Message::System { content } => {
                messages.push(ChatMessage::new(ChatRole::System, content.clone()));
            }
            Message::User { content } => {
                let text = content
                    .iter()
                    .map(|part| convert_user_part(part, warnings))
                    .collect::<Vec<_>>()
                    .join("\n");
                messages.push(ChatMessage::new(ChatRole::User, text));
            }
            Message::Assistant { content } => {
                messages.push(convert_assistant(content, tool_calls));
            }
            Message::Tool { content } => {
                if let Some(message) = convert_tool_results(content, warnings) {
                    messages.push(message);
                }
            }
        }
    }
    messages
}

fn convert_user_part(part: &UserPart, warnings: &mut Vec<Warning>) -> String {
    match part {
        UserPart::Text(text) => text.text.clone(),
        UserPart::File(file) => file_placeholder(file, warnings),
    }
}

fn file_placeholder(file: &FilePart, warnings: &mut Vec<Warning>) -> String {
    let name = file.filename.as_deref().unwrap_or("unknown");
    warn!(filename = name, media_type = %file.media_type, "file part replaced by placeholder");
    warnings.push(Warning::unsupported_feature(
        "file-part",
        format!(
            "file attachments are not supported; {name} ({}) was replaced by a placeholder",
            file.media_type
        ),
    ));
    format!("[File: {name}]")
}

fn convert_assistant(content: &[AssistantPart], support: ToolCallSupport) -> ChatMessage {
    let mut texts = Vec::new();
    let mut calls = Vec::new();
    for part in content {
        match part {
            AssistantPart::Text(text) => texts.push(text.text.clone()),
            AssistantPart::ToolCall(call) => calls.push(ChatToolCall {
                id: call.tool_call_id.clone(),
                kind: "function".into(),
                function: ChatFunctionCall {
                    name: call.tool_name.clone(),
                    arguments: call.input.clone(),
                },
            }),
        }
    }

    match support {
        ToolCallSupport::Native => {
            let mut message = ChatMessage::new(ChatRole::Assistant, texts.join("\n"));
            if !calls.is_empty() {
                message.tool_calls = Some(calls);
            }
            message
        }
        ToolCallSupport::Inline => {
            texts.extend(calls.into_iter().map(|call| {
                format!(
                    "[Tool call {}: {}({})]",
                    call.id, call.function.name, call.function.arguments
                )
            }));
            ChatMessage::new(ChatRole::Assistant, texts.join("\n"))
        }
    }
}

// One native message per tool message: only the first result survives.
fn convert_tool_results(
    content: &[ToolResultPart],
    warnings: &mut Vec<Warning>,
) -> Option<ChatMessage> {
    let Some((first, rest)) = content.split_first() else {
        warnings.push(Warning::unsupported_feature(
            "empty-tool-message",
            "tool message without results was skipped",
        ));
        return None;
    };
    for dropped in rest {
        warn!(tool_call_id = %dropped.tool_call_id, "dropping extra tool result");
        warnings.push(Warning::unsupported_feature(
            "multiple-tool-results",
            format!(
                "only the first result of a tool message is sent; result for {} ({}) was dropped",
                dropped.tool_call_id, dropped.tool_name
            ),
        ));
    }

    let mut message = ChatMessage::new(ChatRole::Tool, tool_output_text(&first.output));
    message.tool_call_id = Some(first.tool_call_id.clone());
    Some(message)
}

fn tool_output_text(output: &serde_json::Value) -> String {
    match output {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Maps a tool choice to the chat backend's `tool_choice` value.
///
/// `Required` has no stricter native equivalent and maps to `"auto"`.
pub fn map_tool_choice(choice: Option<&ToolChoice>) -> Option<String> {
    match choice? {
        ToolChoice::Auto | ToolChoice::Required => Some("auto".into()),
        ToolChoice::None => Some("none".into()),
        ToolChoice::Tool { tool_name } => Some(tool_name.clone()),
    }
}

/// Maps a native finish reason; unknown or missing values become `Other`.
pub fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("function_call" | "tool_calls") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

/// Renders converted messages as one prompt string for the agent runtime.
///
/// A lone user message is passed through verbatim; anything else becomes
/// labelled blocks separated by blank lines.
pub fn flatten_prompt(messages: &[ChatMessage]) -> String {
    if let [only] = messages
        && only.role == ChatRole::User
    {
        return only.content.clone();
    }
    messages
        .iter()
        .map(|message| format!("{}: {}", message.role.label(), message.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
