use std::sync::Arc;

use tracing::debug;

use crate::content::{GenerateResult, RawRequest};
use crate::errors::AdapterError;
use crate::model::LanguageModel;
use crate::options::CallOptions;
use crate::stream::StreamResult;
use crate::transport::{HttpTransport, Transport, until_aborted};

use super::config::{ChatConfig, ChatSettings};
use super::request::{ChatRequest, build_request};
use super::response::map_response;
use super::stream::map_chunk_stream;

/// Language model backed by an HTTP chat-completion API.
pub struct ChatLanguageModel {
    model_id: String,
    config: Arc<ChatConfig>,
    settings: ChatSettings,
    transport: Arc<dyn Transport>,
}

impl ChatLanguageModel {
    /// Creates a model that talks to the backend over `reqwest`.
    pub fn new(model_id: impl Into<String>, config: ChatConfig) -> Result<Self, AdapterError> {
        if config.api_key.trim().is_empty() {
            return Err(AdapterError::Config(
                "chat config api_key must not be empty".into(),
            ));
        }
        let transport = HttpTransport::new(config.timeout)?;
        Ok(Self::with_transport(
            model_id,
            Arc::new(config),
            Arc::new(transport),
        ))
    }

    /// Creates a model on top of an existing transport.
    pub fn with_transport(
        model_id: impl Into<String>,
        config: Arc<ChatConfig>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            config,
            settings: ChatSettings::default(),
            transport,
        }
    }

    /// Replaces the per-model defaults.
    pub fn settings(mut self, settings: ChatSettings) -> Self {
        self.settings = settings;
        self
    }
}

fn request_body(request: &ChatRequest) -> Result<serde_json::Value, AdapterError> {
    serde_json::to_value(request)
        .map_err(|e| AdapterError::InvalidPrompt(format!("failed to serialize request: {e}")))
}

#[async_trait::async_trait]
impl LanguageModel for ChatLanguageModel {
    fn provider(&self) -> &str {
        &self.config.provider
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, options: CallOptions) -> Result<GenerateResult, AdapterError> {
        let (request, warnings) = build_request(&self.model_id, &options, &self.settings, false);
        let body = request_body(&request)?;
        debug!(provider = %self.config.provider, model = %self.model_id, messages = request.messages.len(), "sending chat completion");

        let response = self
            .transport
            .post_json(
                &self.config.chat_completions_url(),
                &self.config.request_headers(),
                &body,
                options.abort_signal.as_ref(),
            )
            .await?;

        let mut result = map_response(response)?;
        result.warnings = warnings;
        result.request = RawRequest { body };
        Ok(result)
    }

    async fn stream(&self, options: CallOptions) -> Result<StreamResult, AdapterError> {
        let (request, warnings) = build_request(&self.model_id, &options, &self.settings, true);
        let body = request_body(&request)?;
        debug!(provider = %self.config.provider, model = %self.model_id, messages = request.messages.len(), "starting chat completion stream");

        let chunks = self
            .transport
            .post_json_for_event_stream(
                &self.config.chat_completions_url(),
                &self.config.request_headers(),
                &body,
                options.abort_signal.as_ref(),
            )
            .await?;

        // A held `Finish` must not surface after an abort.
        let events = map_chunk_stream(chunks, warnings.clone());
        Ok(StreamResult {
            stream: until_aborted(events, options.abort_signal.as_ref()),
            request: RawRequest { body },
            warnings,
        })
    }
}
