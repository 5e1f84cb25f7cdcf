use serde::Deserialize;

use crate::content::{Content, GenerateResult, RawRequest, ResponseMetadata, Usage};
use crate::convert::{ChatFunctionCall, map_finish_reason};
use crate::errors::AdapterError;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    id: Option<String>,
    model: Option<String>,
    created: Option<u64>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseToolCall {
    id: Option<String>,
    function: ChatFunctionCall,
}

/// Native token usage block.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub(crate) struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<ChatUsage> for Usage {
    fn from(usage: ChatUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Maps a native chat-completion response to a `GenerateResult`.
///
/// Pure; the caller fills in `warnings` and `request`. A response without
/// choices is a protocol violation.
pub fn map_response(body: serde_json::Value) -> Result<GenerateResult, AdapterError> {
    let response: ChatResponse = serde_json::from_value(body.clone()).map_err(|e| {
        AdapterError::invalid_response(format!("unexpected response shape: {e}"), body.clone())
    })?;
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(AdapterError::invalid_response(
            "response contains no choices",
            body,
        ));
    };

    let mut content = Vec::new();
    if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
        content.push(Content::Text { text });
    }
    for call in choice.message.tool_calls.unwrap_or_default() {
        content.push(Content::ToolCall {
            tool_call_id: call.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            tool_name: call.function.name,
            input: call.function.arguments,
        });
    }

    Ok(GenerateResult {
        content,
        finish_reason: map_finish_reason(choice.finish_reason.as_deref()),
        usage: response.usage.map(Usage::from).unwrap_or_default(),
        warnings: Vec::new(),
        request: RawRequest::default(),
        response: ResponseMetadata {
            id: response.id,
            model_id: response.model,
            timestamp: response.created,
            body: Some(body),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FinishReason;
    use serde_json::json;

    #[test]
    fn maps_text_response_with_usage_and_metadata() {
        let result = map_response(json!({
            "id": "chatcmpl-1",
            "model": "gpt-x",
            "created": 1700000000,
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .expect("mapped");
        assert_eq!(result.text(), "Hello");
        assert_eq!(result.finish_reason, FinishReason::Stop);
        assert_eq!(
            result.usage,
            Usage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15
            }
        );
        assert_eq!(result.response.id.as_deref(), Some("chatcmpl-1"));
        assert_eq!(result.response.model_id.as_deref(), Some("gpt-x"));
        assert_eq!(result.response.timestamp, Some(1700000000));
    }

    #[test]
    fn text_comes_first_then_tool_calls_in_backend_order() {
        let result = map_response(json!({
            "choices": [{
                "message": {
                    "content": "calling tools",
                    "tool_calls": [
                        {"id": "b", "type": "function", "function": {"name": "second", "arguments": "{}"}},
                        {"id": "a", "type": "function", "function": {"name": "first", "arguments": "{\"x\":1}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .expect("mapped");
        assert_eq!(result.finish_reason, FinishReason::ToolCalls);
        assert_eq!(
            result.content,
            vec![
                Content::Text {
                    text: "calling tools".into()
                },
                Content::ToolCall {
                    tool_call_id: "b".into(),
                    tool_name: "second".into(),
                    input: "{}".into()
                },
                Content::ToolCall {
                    tool_call_id: "a".into(),
                    tool_name: "first".into(),
                    input: "{\"x\":1}".into()
                },
            ]
        );
    }

    #[test]
    fn empty_or_null_text_is_not_emitted() {
        let result = map_response(json!({
            "choices": [{"message": {"content": null, "tool_calls": [
                {"type": "function", "function": {"name": "ls", "arguments": "{}"}}
            ]}, "finish_reason": "tool_calls"}]
        }))
        .expect("mapped");
        assert_eq!(result.content.len(), 1);
        assert!(
            matches!(&result.content[0], Content::ToolCall { tool_call_id, .. } if !tool_call_id.is_empty())
        );
        assert_eq!(result.usage, Usage::default());
    }

    #[test]
    fn unknown_finish_reason_maps_to_other() {
        let result = map_response(json!({
            "choices": [{"message": {"content": "x"}, "finish_reason": "eos_token"}]
        }))
        .expect("mapped");
        assert_eq!(result.finish_reason, FinishReason::Other);
    }

    #[test]
    fn empty_choices_is_invalid_response_data() {
        let body = json!({"id": "x", "choices": []});
        let err = map_response(body.clone()).expect_err("no choices");
        assert_eq!(
            err,
            AdapterError::InvalidResponseData {
                message: "response contains no choices".into(),
                data: body
            }
        );
    }

    #[test]
    fn malformed_envelope_is_invalid_response_data() {
        let err = map_response(json!({"choices": "nope"})).expect_err("bad shape");
        assert!(matches!(err, AdapterError::InvalidResponseData { .. }));
    }
}
