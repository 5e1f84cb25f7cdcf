use std::sync::Arc;

use tracing::debug;

use crate::backends::agent::{AgentConfig, AgentExecutor, AgentLanguageModel};
use crate::backends::chat::{ChatConfig, ChatLanguageModel, ChatSettings};
use crate::errors::AdapterError;
use crate::model::LanguageModel;
use crate::transport::{HttpTransport, Transport};

/// Model ids routed to the agent backend: `agent` or `agent/<name>`.
pub const AGENT_MODEL_PREFIX: &str = "agent";

/// Returns true when `model_id` addresses the agent backend.
pub fn is_agent_model(model_id: &str) -> bool {
    model_id == AGENT_MODEL_PREFIX
        || model_id
            .strip_prefix(AGENT_MODEL_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

struct ChatBackend {
    config: Arc<ChatConfig>,
    settings: ChatSettings,
    transport: Arc<dyn Transport>,
}

struct AgentBackend {
    config: Arc<AgentConfig>,
    executor: Arc<dyn AgentExecutor>,
}

/// Hands out language models for the registered backends.
#[derive(Clone)]
pub struct Provider {
    chat: Option<Arc<ChatBackend>>,
    agent: Option<Arc<AgentBackend>>,
}

impl Provider {
    pub fn builder() -> ProviderBuilder {
        ProviderBuilder::default()
    }

    /// Registers every backend whose environment is configured.
    ///
    /// Fails only when neither backend is available.
    pub fn from_env() -> Result<Self, AdapterError> {
        let mut builder = Self::builder();
        if let Ok(config) = ChatConfig::from_env() {
            builder = builder.chat(config);
        }
        if let Ok(config) = AgentConfig::from_env() {
            builder = builder.agent(config);
        }
        builder.build()
    }

    /// Resolves `model_id` to a model of the matching backend.
    pub fn language_model(&self, model_id: &str) -> Result<Arc<dyn LanguageModel>, AdapterError> {
        let model_id = model_id.trim();
        if model_id.is_empty() {
            return Err(AdapterError::Config("model id must not be empty".into()));
        }

        if is_agent_model(model_id) {
            let backend = self.agent.as_ref().ok_or_else(|| {
                AdapterError::Config(format!("no agent backend configured for model {model_id}"))
            })?;
            debug!(model = model_id, "routing to agent backend");
            return Ok(Arc::new(AgentLanguageModel::with_executor(
                model_id,
                backend.config.clone(),
                backend.executor.clone(),
            )));
        }

        let backend = self.chat.as_ref().ok_or_else(|| {
            AdapterError::Config(format!("no chat backend configured for model {model_id}"))
        })?;
        debug!(model = model_id, "routing to chat backend");
        Ok(Arc::new(
            ChatLanguageModel::with_transport(
                model_id,
                backend.config.clone(),
                backend.transport.clone(),
            )
            .settings(backend.settings.clone()),
        ))
    }
}

/// Builder used to register backend configuration before creating a `Provider`.
#[derive(Default)]
pub struct ProviderBuilder {
    chat: Option<ChatConfig>,
    chat_settings: ChatSettings,
    chat_transport: Option<Arc<dyn Transport>>,
    agent: Option<AgentConfig>,
    agent_executor: Option<Arc<dyn AgentExecutor>>,
}

impl ProviderBuilder {
    pub fn chat(mut self, config: ChatConfig) -> Self {
        self.chat = Some(config);
        self
    }

    /// Defaults applied to every chat model.
    pub fn chat_settings(mut self, settings: ChatSettings) -> Self {
        self.chat_settings = settings;
        self
    }

    /// Replaces the `reqwest` transport, e.g. with a test double.
    pub fn chat_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.chat_transport = Some(transport);
        self
    }

    pub fn agent(mut self, config: AgentConfig) -> Self {
        self.agent = Some(config);
        self
    }

    /// Replaces the subprocess executor.
    pub fn agent_executor(mut self, executor: Arc<dyn AgentExecutor>) -> Self {
        self.agent_executor = Some(executor);
        self
    }

    pub fn build(self) -> Result<Provider, AdapterError> {
        if self.chat.is_none() && self.agent.is_none() {
            return Err(AdapterError::Config(
                "register at least one backend (chat or agent)".into(),
            ));
        }

        let chat = match self.chat {
            Some(config) => {
                if config.api_key.trim().is_empty() {
                    return Err(AdapterError::Config(
                        "chat config api_key must not be empty".into(),
                    ));
                }
                let transport = match self.chat_transport {
                    Some(transport) => transport,
                    None => Arc::new(HttpTransport::new(config.timeout)?),
                };
                Some(Arc::new(ChatBackend {
                    config: Arc::new(config),
                    settings: self.chat_settings,
                    transport,
                }))
            }
            None => None,
        };

        let agent = self.agent.map(|config| {
            let executor = self
                .agent_executor
                .unwrap_or_else(|| Arc::new(config.command_executor()) as Arc<dyn AgentExecutor>);
            Arc::new(AgentBackend {
                config: Arc::new(config),
                executor,
            })
        });

        Ok(Provider { chat, agent })
    }
}
