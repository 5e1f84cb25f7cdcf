/// Errors returned by the adapter.
///
/// Variants follow the failure taxonomy of a call: caller contract violations,
/// backend protocol violations, transport failures, agent runtime failures and
/// cancellation. Per-chunk stream decode failures are carried in-band as
/// `StreamEvent::Error` and never abort a stream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    /// A prompt message used a role the adapter does not know.
    #[error("unsupported message role: {role}")]
    UnsupportedRole { role: String },
    /// A prompt message was structurally invalid.
    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),
    /// The backend answered with data the adapter cannot interpret.
    #[error("invalid response data: {message}")]
    InvalidResponseData {
        message: String,
        /// Offending payload, kept for debugging.
        data: serde_json::Value,
    },
    /// The backend answered with a non-success HTTP status.
    #[error("API call to {url} failed with status {status} {status_text}")]
    Api {
        url: String,
        status: u16,
        status_text: String,
        body: Option<String>,
        is_retryable: bool,
    },
    /// The backend answered with HTTP 429.
    #[error("too many requests to {url} (retry after: {})", retry_after.as_deref().unwrap_or("unspecified"))]
    RateLimited {
        url: String,
        /// Raw `retry-after` header value.
        retry_after: Option<String>,
    },
    /// The request or stream failed below HTTP (connect, read, decode).
    #[error("network error: {0}")]
    Network(String),
    /// The local agent runtime failed.
    #[error("agent runtime error: {0}")]
    Agent(String),
    /// The call was aborted through its abort signal.
    #[error("call cancelled")]
    Cancelled,
    /// Invalid adapter/provider configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl AdapterError {
    /// Creates an `InvalidResponseData` error with the offending payload attached.
    pub fn invalid_response(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::InvalidResponseData {
            message: message.into(),
            data,
        }
    }

    /// Creates an `Api` error from a status code; 5xx statuses are retryable.
    pub fn api(
        url: impl Into<String>,
        status: u16,
        status_text: impl Into<String>,
        body: Option<String>,
    ) -> Self {
        Self::Api {
            url: url.into(),
            status,
            status_text: status_text.into(),
            body,
            is_retryable: status >= 500,
        }
    }

    /// Whether a caller may reasonably retry the same call.
    ///
    /// The adapter itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { is_retryable, .. } => *is_retryable,
            Self::RateLimited { .. } | Self::Network(_) => true,
            Self::UnsupportedRole { .. }
            | Self::InvalidPrompt(_)
            | Self::InvalidResponseData { .. }
            | Self::Agent(_)
            | Self::Cancelled
            | Self::Config(_) => false,
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}
