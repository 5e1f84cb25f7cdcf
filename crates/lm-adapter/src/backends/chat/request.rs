use serde::Serialize;
use tracing::warn;

use crate::content::Warning;
use crate::convert::{ChatMessage, ToolCallSupport, convert_prompt, map_tool_choice};
use crate::options::{CallOptions, ToolDefinition};

use super::config::ChatSettings;

const RESERVED_FIELDS: [&str; 11] = [
    "model",
    "messages",
    "temperature",
    "max_tokens",
    "stop",
    "tools",
    "tool_choice",
    "user",
    "stream",
    "stream_options",
    "n",
];

/// Native chat-completion request body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Native tool definition.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: ChatToolFunction,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatToolFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

impl From<&ToolDefinition> for ChatTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: ChatToolFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

/// Builds the native request body and the warnings collected on the way.
///
/// Call-level options win over `settings`; values absent from both are left
/// out so the backend default applies. `stream` is set only for streaming
/// calls.
pub fn build_request(
    model_id: &str,
    options: &CallOptions,
    settings: &ChatSettings,
    stream: bool,
) -> (ChatRequest, Vec<Warning>) {
    let mut warnings = Vec::new();
    let messages = convert_prompt(&options.prompt, ToolCallSupport::Native, &mut warnings);

    let stop = if options.stop_sequences.is_empty() {
        &settings.stop
    } else {
        &options.stop_sequences
    };
    let tools: Vec<ChatTool> = options.tools.iter().map(ChatTool::from).collect();

    let mut extra = serde_json::Map::new();
    for (key, value) in &settings.extra {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            warn!(field = %key, "ignoring extra body field that collides with a built-in field");
            warnings.push(Warning::unsupported_setting(
                key.clone(),
                "extra body fields cannot override built-in request fields",
            ));
            continue;
        }
        extra.insert(key.clone(), value.clone());
    }

    let request = ChatRequest {
        model: model_id.to_string(),
        messages,
        temperature: options.temperature.or(settings.temperature),
        max_tokens: options.max_output_tokens.or(settings.max_tokens),
        stop: (!stop.is_empty()).then(|| stop.clone()),
        tools: (!tools.is_empty()).then_some(tools),
        tool_choice: map_tool_choice(options.tool_choice.as_ref()),
        user: settings.user.clone(),
        stream: stream.then_some(true),
        stream_options: (stream && settings.include_usage).then_some(StreamOptions {
            include_usage: true,
        }),
        extra,
    };
    (request, warnings)
}
