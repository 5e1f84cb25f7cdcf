use crate::content::GenerateResult;
use crate::errors::AdapterError;
use crate::options::CallOptions;
use crate::stream::StreamResult;

/// Backend-agnostic language model contract.
///
/// Implementations are stateless apart from immutable configuration; every
/// call owns its own conversion state.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name used in logs (for example `lm-adapter.chat`).
    fn provider(&self) -> &str;

    /// Backend model identifier.
    fn model_id(&self) -> &str;

    /// Runs one call to completion.
    async fn generate(&self, options: CallOptions) -> Result<GenerateResult, AdapterError>;

    /// Starts a streaming call.
    ///
    /// Failures before the first event (invalid prompt, non-2xx status, agent
    /// spawn failure) reject this call; failures after that arrive in-band as
    /// `StreamEvent::Error`.
    async fn stream(&self, options: CallOptions) -> Result<StreamResult, AdapterError>;
}
