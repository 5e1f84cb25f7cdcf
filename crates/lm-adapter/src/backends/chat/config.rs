use std::time::Duration;

use crate::errors::AdapterError;
use crate::transport::Headers;

pub(crate) const API_KEY_ENV: &str = "LM_ADAPTER_API_KEY";
pub(crate) const BASE_URL_ENV: &str = "LM_ADAPTER_BASE_URL";

/// Connection configuration for the HTTP chat backend.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL of the chat-completion endpoint (without `/chat/completions`).
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// Default HTTP timeout for requests.
    pub timeout: Duration,
    /// Provider name reported by the model.
    pub provider: String,
    /// Extra headers sent with every request.
    pub headers: Headers,
}

impl ChatConfig {
    /// Creates a config with sensible defaults and a provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(120),
            provider: "lm-adapter.chat".to_string(),
            headers: Headers::new(),
        }
    }

    /// Builds a config from `LM_ADAPTER_API_KEY` and, when set,
    /// `LM_ADAPTER_BASE_URL`.
    pub fn from_env() -> Result<Self, AdapterError> {
        let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(AdapterError::Config(format!(
                "missing {API_KEY_ENV} for the chat backend"
            )));
        }
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var(BASE_URL_ENV)
            && !base_url.trim().is_empty()
        {
            config = config.base_url(base_url.trim());
        }
        Ok(config)
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the default HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub(crate) fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub(crate) fn request_headers(&self) -> Headers {
        let mut headers = self.headers.clone();
        headers.insert(
            "authorization".to_string(),
            format!("Bearer {}", self.api_key),
        );
        headers
    }
}

/// Per-model defaults applied when a call leaves an option unset.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// End-user identifier forwarded as `user`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Ask the backend to report usage on streaming calls.
    #[serde(default)]
    pub include_usage: bool,
    /// Backend-specific fields merged into the request body.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatSettings {
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn stop(mut self, stop: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.stop = stop.into_iter().map(Into::into).collect();
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn include_usage(mut self, include_usage: bool) -> Self {
        self.include_usage = include_usage;
        self
    }

    /// Sets a backend-specific body field.
    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
