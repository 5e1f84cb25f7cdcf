use serde::{Deserialize, Serialize};

/// Output content produced by a model call.
///
/// Only text and tool calls are ever produced; files and tool results are
/// input-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Content {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        /// Serialized JSON arguments.
        input: String,
    },
}

/// Why generation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other,
}

/// Token accounting for one call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }
}

/// Non-fatal notice about an input feature that was degraded or ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Warning {
    UnsupportedFeature { feature: String, details: String },
    UnsupportedSetting { setting: String, details: String },
    Other { message: String },
}

impl Warning {
    pub fn unsupported_feature(feature: impl Into<String>, details: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            feature: feature.into(),
            details: details.into(),
        }
    }

    pub fn unsupported_setting(setting: impl Into<String>, details: impl Into<String>) -> Self {
        Self::UnsupportedSetting {
            setting: setting.into(),
            details: details.into(),
        }
    }
}

/// Echo of the native request body sent to the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRequest {
    pub body: serde_json::Value,
}

/// Metadata of the native response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub id: Option<String>,
    pub model_id: Option<String>,
    /// Unix timestamp in seconds reported by the backend.
    pub timestamp: Option<u64>,
    /// Raw response body.
    pub body: Option<serde_json::Value>,
}

/// Complete result of a `generate` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerateResult {
    /// Text first (when present), then tool calls in backend order.
    pub content: Vec<Content>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub warnings: Vec<Warning>,
    pub request: RawRequest,
    pub response: ResponseMetadata,
}

impl GenerateResult {
    /// Concatenates all text content in order and ignores tool calls.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.content {
            if let Content::Text { text } = part {
                out.push_str(text);
            }
        }
        out
    }

    /// Tool calls in the order the backend listed them.
    pub fn tool_calls(&self) -> impl Iterator<Item = &Content> {
        self.content
            .iter()
            .filter(|part| matches!(part, Content::ToolCall { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_concatenates_text_parts_only() {
        let result = GenerateResult {
            content: vec![
                Content::Text {
                    text: "hello".into(),
                },
                Content::ToolCall {
                    tool_call_id: "c1".into(),
                    tool_name: "ls".into(),
                    input: "{}".into(),
                },
                Content::Text {
                    text: " world".into(),
                },
            ],
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
            warnings: Vec::new(),
            request: RawRequest::default(),
            response: ResponseMetadata::default(),
        };
        assert_eq!(result.text(), "hello world");
        assert_eq!(result.tool_calls().count(), 1);
    }

    #[test]
    fn finish_reason_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(FinishReason::ToolCalls).expect("json"),
            serde_json::json!("tool-calls")
        );
        assert_eq!(
            serde_json::to_value(FinishReason::ContentFilter).expect("json"),
            serde_json::json!("content-filter")
        );
    }
}
