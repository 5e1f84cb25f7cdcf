use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::StreamExt as _;
use tracing::{debug, warn};

use crate::content::{
    Content, FinishReason, GenerateResult, RawRequest, ResponseMetadata, Usage, Warning,
};
use crate::convert::{ToolCallSupport, convert_prompt, flatten_prompt};
use crate::errors::AdapterError;
use crate::model::LanguageModel;
use crate::options::CallOptions;
use crate::stream::{EventMapper, StreamEvent, StreamResult, translate_stream};
use crate::transport::{until_aborted, with_abort};

use super::config::AgentConfig;
use super::executor::{AgentEvent, AgentExecutor};

/// Language model backed by a local coding-agent runtime.
///
/// Token usage is not reported by the runtime; it is approximated by the
/// character counts of the flattened prompt and the output text.
pub struct AgentLanguageModel {
    model_id: String,
    config: Arc<AgentConfig>,
    executor: Arc<dyn AgentExecutor>,
}

impl AgentLanguageModel {
    /// Creates a model that runs `config.program` as a subprocess.
    pub fn new(model_id: impl Into<String>, config: AgentConfig) -> Self {
        let executor = config.command_executor();
        Self::with_executor(model_id, Arc::new(config), Arc::new(executor))
    }

    pub fn with_executor(
        model_id: impl Into<String>,
        config: Arc<AgentConfig>,
        executor: Arc<dyn AgentExecutor>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            config,
            executor,
        }
    }

    fn prepare(&self, options: &CallOptions) -> (String, Vec<Warning>, RawRequest) {
        let mut warnings = Vec::new();
        let messages = convert_prompt(&options.prompt, ToolCallSupport::Inline, &mut warnings);
        let prompt = flatten_prompt(&messages);

        if options.temperature.is_some() {
            warnings.push(unsupported("temperature"));
        }
        if options.max_output_tokens.is_some() {
            warnings.push(unsupported("maxOutputTokens"));
        }
        if !options.stop_sequences.is_empty() {
            warnings.push(unsupported("stopSequences"));
        }
        if !options.tools.is_empty() {
            warnings.push(unsupported("tools"));
        }
        if options.tool_choice.is_some() {
            warnings.push(unsupported("toolChoice"));
        }

        let request = RawRequest {
            body: serde_json::json!({
                "prompt": prompt,
                "options": self.config.options,
            }),
        };
        (prompt, warnings, request)
    }
}

fn unsupported(setting: &str) -> Warning {
    warn!(setting, "setting ignored by agent runtime");
    Warning::unsupported_setting(setting, "the agent runtime does not support this setting")
}

fn approximate_usage(prompt: &str, output: &str) -> Usage {
    Usage::new(prompt.chars().count() as u64, output.chars().count() as u64)
}

fn now_secs() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

/// Maps runtime events to stream events.
///
/// Every run that ends without a runtime failure closes with `Finish`, with
/// or without a `result` event.
struct AgentStreamMapper {
    start: Option<Vec<Warning>>,
    prompt: String,
    streamed: String,
    finished: bool,
    failed: bool,
}

impl AgentStreamMapper {
    fn new(warnings: Vec<Warning>, prompt: String) -> Self {
        Self {
            start: Some(warnings),
            prompt,
            streamed: String::new(),
            finished: false,
            failed: false,
        }
    }

    fn start_event(&mut self) -> Vec<StreamEvent> {
        self.start
            .take()
            .map(|warnings| StreamEvent::StreamStart { warnings })
            .into_iter()
            .collect()
    }

    fn finish_event(&mut self, output: &str) -> StreamEvent {
        self.finished = true;
        StreamEvent::Finish {
            finish_reason: FinishReason::Stop,
            usage: Some(approximate_usage(&self.prompt, output)),
        }
    }
}

impl EventMapper<Result<AgentEvent, AdapterError>> for AgentStreamMapper {
    fn map(&mut self, event: Result<AgentEvent, AdapterError>) -> Vec<StreamEvent> {
        let mut events = self.start_event();
        match event {
            Ok(AgentEvent::Text { content }) => {
                if !content.is_empty() {
                    self.streamed.push_str(&content);
                    events.push(StreamEvent::TextDelta { delta: content });
                }
            }
            Ok(AgentEvent::Result { result }) => {
                let output = if self.streamed.is_empty() {
                    if !result.is_empty() {
                        events.push(StreamEvent::TextDelta {
                            delta: result.clone(),
                        });
                    }
                    result
                } else {
                    std::mem::take(&mut self.streamed)
                };
                events.push(self.finish_event(&output));
            }
            Ok(AgentEvent::Other) => {}
            Err(error) => {
                self.failed = true;
                events.push(StreamEvent::Error { error });
            }
        }
        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = self.start_event();
        if !self.finished && !self.failed {
            let output = std::mem::take(&mut self.streamed);
            events.push(self.finish_event(&output));
        }
        events
    }
}

#[async_trait::async_trait]
impl LanguageModel for AgentLanguageModel {
    fn provider(&self) -> &str {
        &self.config.provider
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, options: CallOptions) -> Result<GenerateResult, AdapterError> {
        let (prompt, warnings, request) = self.prepare(&options);
        debug!(provider = %self.config.provider, model = %self.model_id, prompt_chars = prompt.len(), "running agent");

        let abort = options.abort_signal.as_ref();
        let (text, result) = with_abort(abort, async {
            let mut events = self
                .executor
                .execute(prompt.clone(), &self.config.options)
                .await?;
            let mut text = String::new();
            let mut result = None;
            while let Some(event) = events.next().await {
                match event? {
                    AgentEvent::Text { content } => text.push_str(&content),
                    AgentEvent::Result { result: payload } => result = Some(payload),
                    AgentEvent::Other => {}
                }
            }
            Ok::<_, AdapterError>((text, result))
        })
        .await?;

        let output = result.unwrap_or(text);
        let usage = approximate_usage(&prompt, &output);
        let content = if output.is_empty() {
            Vec::new()
        } else {
            vec![Content::Text { text: output }]
        };
        Ok(GenerateResult {
            content,
            finish_reason: FinishReason::Stop,
            usage,
            warnings,
            request,
            response: ResponseMetadata {
                id: None,
                model_id: Some(self.model_id.clone()),
                timestamp: now_secs(),
                body: None,
            },
        })
    }

    async fn stream(&self, options: CallOptions) -> Result<StreamResult, AdapterError> {
        let (prompt, warnings, request) = self.prepare(&options);
        debug!(provider = %self.config.provider, model = %self.model_id, prompt_chars = prompt.len(), "starting agent stream");

        let abort = options.abort_signal.as_ref();
        let events = with_abort(
            abort,
            self.executor.execute(prompt.clone(), &self.config.options),
        )
        .await?;

        let mapper = AgentStreamMapper::new(warnings.clone(), prompt);
        // Aborting cuts the mapped stream so no closing `Finish` follows.
        let stream = until_aborted(translate_stream(events, mapper), abort);
        Ok(StreamResult {
            stream,
            request,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::abort_pair;
    use crate::options::ToolDefinition;
    use crate::backends::agent::executor::{AgentEventStream, ExecuteOptions};
    use crate::prompt::{AssistantPart, Message, Prompt, TextPart, ToolCallPart};
    use futures::stream;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeExecutor {
        events: Vec<Result<AgentEvent, AdapterError>>,
        pending: bool,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl AgentExecutor for FakeExecutor {
        async fn execute(
            &self,
            prompt: String,
            _options: &ExecuteOptions,
        ) -> Result<AgentEventStream, AdapterError> {
            self.prompts.lock().expect("lock").push(prompt);
            let events = stream::iter(self.events.clone());
            if self.pending {
                Ok(Box::pin(events.chain(stream::pending())))
            } else {
                Ok(Box::pin(events))
            }
        }
    }

    fn text(content: &str) -> Result<AgentEvent, AdapterError> {
        Ok(AgentEvent::Text {
            content: content.into(),
        })
    }

    fn result(result: &str) -> Result<AgentEvent, AdapterError> {
        Ok(AgentEvent::Result {
            result: result.into(),
        })
    }

    fn model(executor: Arc<FakeExecutor>) -> AgentLanguageModel {
        AgentLanguageModel::with_executor("agent", Arc::new(AgentConfig::new("agent")), executor)
    }

    #[tokio::test]
    async fn generate_prefers_result_payload() {
        let executor = Arc::new(FakeExecutor {
            events: vec![text("thinking"), Ok(AgentEvent::Other), result("final answer")],
            ..FakeExecutor::default()
        });
        let out = model(executor.clone())
            .generate(CallOptions::new(vec![Message::user_text("fix the bug")]))
            .await
            .expect("generate");

        assert_eq!(out.text(), "final answer");
        assert_eq!(out.finish_reason, FinishReason::Stop);
        assert_eq!(out.usage, Usage::new(11, 12));
        assert_eq!(out.response.model_id.as_deref(), Some("agent"));
        assert_eq!(out.request.body["prompt"], serde_json::json!("fix the bug"));
        assert_eq!(
            executor.prompts.lock().expect("lock").as_slice(),
            ["fix the bug".to_string()]
        );
    }

    #[tokio::test]
    async fn generate_falls_back_to_concatenated_text() {
        let executor = Arc::new(FakeExecutor {
            events: vec![text("a"), text("b")],
            ..FakeExecutor::default()
        });
        let out = model(executor)
            .generate(CallOptions::new(vec![Message::user_text("x")]))
            .await
            .expect("generate");
        assert_eq!(out.text(), "ab");
    }

    #[tokio::test]
    async fn generate_propagates_runtime_failure() {
        let executor = Arc::new(FakeExecutor {
            events: vec![text("a"), Err(AdapterError::Agent("crashed".into()))],
            ..FakeExecutor::default()
        });
        let err = model(executor)
            .generate(CallOptions::new(vec![Message::user_text("x")]))
            .await
            .expect_err("failure");
        assert_eq!(err, AdapterError::Agent("crashed".into()));
    }

    #[tokio::test]
    async fn unsupported_settings_become_warnings() {
        let executor = Arc::new(FakeExecutor {
            events: vec![result("ok")],
            ..FakeExecutor::default()
        });
        let options = CallOptions::new(vec![Message::user_text("x")])
            .temperature(0.3)
            .max_output_tokens(10)
            .stop_sequence("END")
            .tool(ToolDefinition::new("ls", serde_json::json!({"type": "object"})));
        let out = model(executor).generate(options).await.expect("generate");
        let settings: Vec<_> = out
            .warnings
            .iter()
            .map(|w| match w {
                Warning::UnsupportedSetting { setting, .. } => setting.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(
            settings,
            vec!["temperature", "maxOutputTokens", "stopSequences", "tools"]
        );
    }

    #[tokio::test]
    async fn multi_message_prompt_is_flattened_with_inline_tool_calls() {
        let executor = Arc::new(FakeExecutor {
            events: vec![result("ok")],
            ..FakeExecutor::default()
        });
        let prompt = Prompt::new(vec![
            Message::system("be terse"),
            Message::Assistant {
                content: vec![
                    AssistantPart::Text(TextPart {
                        text: "checking".into(),
                    }),
                    AssistantPart::ToolCall(ToolCallPart {
                        tool_call_id: "c1".into(),
                        tool_name: "ls".into(),
                        input: "{}".into(),
                    }),
                ],
            },
            Message::user_text("go on"),
        ]);
        model(executor.clone())
            .generate(CallOptions::new(prompt))
            .await
            .expect("generate");
        let prompts = executor.prompts.lock().expect("lock");
        assert_eq!(
            prompts[0],
            "System: be terse\n\nAssistant: checking\n[Tool call c1: ls({})]\n\nUser: go on"
        );
    }

    #[tokio::test]
    async fn stream_maps_text_and_result() {
        let executor = Arc::new(FakeExecutor {
            events: vec![text("He"), Ok(AgentEvent::Other), text("llo"), result("Hello")],
            ..FakeExecutor::default()
        });
        let out = model(executor)
            .stream(CallOptions::new(vec![Message::user_text("hi")]))
            .await
            .expect("stream");
        let events: Vec<_> = out.stream.collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::StreamStart {
                    warnings: Vec::new()
                },
                StreamEvent::TextDelta { delta: "He".into() },
                StreamEvent::TextDelta {
                    delta: "llo".into()
                },
                StreamEvent::Finish {
                    finish_reason: FinishReason::Stop,
                    usage: Some(Usage::new(2, 5)),
                },
            ]
        );
    }

    #[tokio::test]
    async fn stream_emits_result_text_when_nothing_was_streamed() {
        let executor = Arc::new(FakeExecutor {
            events: vec![result("done")],
            ..FakeExecutor::default()
        });
        let out = model(executor)
            .stream(CallOptions::new(vec![Message::user_text("hi")]))
            .await
            .expect("stream");
        let events: Vec<_> = out.stream.collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], StreamEvent::TextDelta { delta: "done".into() });
    }

    #[tokio::test]
    async fn stream_reports_runtime_failure_in_band() {
        let executor = Arc::new(FakeExecutor {
            events: vec![Err(AdapterError::Agent("exit 1".into()))],
            ..FakeExecutor::default()
        });
        let out = model(executor)
            .stream(CallOptions::new(vec![Message::user_text("hi")]))
            .await
            .expect("stream");
        let events: Vec<_> = out.stream.collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::StreamStart {
                    warnings: Vec::new()
                },
                StreamEvent::Error {
                    error: AdapterError::Agent("exit 1".into())
                },
            ]
        );
    }

    #[tokio::test]
    async fn abort_ends_stream_and_cancels_generate() {
        let executor = Arc::new(FakeExecutor {
            events: vec![text("partial")],
            pending: true,
            ..FakeExecutor::default()
        });
        let (handle, signal) = abort_pair();
        let mut out = model(executor.clone())
            .stream(CallOptions::new(vec![Message::user_text("hi")]).abort_signal(signal.clone()))
            .await
            .expect("stream");
        assert!(matches!(
            out.stream.next().await,
            Some(StreamEvent::StreamStart { .. })
        ));
        assert!(matches!(
            out.stream.next().await,
            Some(StreamEvent::TextDelta { .. })
        ));
        handle.abort();
        assert_eq!(out.stream.next().await, None);

        let err = model(executor)
            .generate(CallOptions::new(vec![Message::user_text("hi")]).abort_signal(signal))
            .await
            .expect_err("cancelled");
        assert_eq!(err, AdapterError::Cancelled);
    }

    #[tokio::test]
    async fn stream_closes_with_finish_when_no_result_arrives() {
        let executor = Arc::new(FakeExecutor {
            events: vec![text("hi")],
            ..FakeExecutor::default()
        });
        let model = model(executor);
        let generated = model
            .generate(CallOptions::new(vec![Message::user_text("go")]))
            .await
            .expect("generate");
        let events: Vec<_> = model
            .stream(CallOptions::new(vec![Message::user_text("go")]))
            .await
            .expect("stream")
            .stream
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::StreamStart {
                    warnings: Vec::new()
                },
                StreamEvent::TextDelta { delta: "hi".into() },
                StreamEvent::Finish {
                    finish_reason: generated.finish_reason,
                    usage: Some(generated.usage),
                },
            ]
        );
    }

    #[tokio::test]
    async fn empty_run_still_starts_and_finishes() {
        let executor = Arc::new(FakeExecutor::default());
        let events: Vec<_> = model(executor)
            .stream(CallOptions::new(vec![Message::user_text("go")]))
            .await
            .expect("stream")
            .stream
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::StreamStart {
                    warnings: Vec::new()
                },
                StreamEvent::Finish {
                    finish_reason: FinishReason::Stop,
                    usage: Some(Usage::new(2, 0)),
                },
            ]
        );
    }
}
