//! Language model adapter over two backends: an HTTP chat-completion API and
//! a local coding-agent runtime.
//!
//! Both backends implement [`LanguageModel`]: a normalized [`Prompt`] and
//! [`CallOptions`] go in, a [`GenerateResult`] or a lazy stream of
//! [`StreamEvent`]s comes out. Degraded input (file attachments, settings a
//! backend ignores) is reported as [`Warning`]s rather than failing the call.
//!
//! # Usage
//!
//! ```no_run
//! use lm_adapter::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), AdapterError> {
//! let provider = Provider::builder()
//!     .chat(ChatConfig::from_env()?)
//!     .build()?;
//!
//! let model = provider.language_model("gpt-4o-mini")?;
//! let result = model
//!     .generate(CallOptions::new(vec![
//!         Message::system("Answer briefly."),
//!         Message::user_text("Say hello"),
//!     ]))
//!     .await?;
//!
//! println!("{}", result.text());
//! # Ok(())
//! # }
//! ```

/// Cancellation handle and signal.
pub mod abort;
/// Backend implementations.
pub mod backends;
/// Normalized result content, usage and warnings.
pub mod content;
/// Prompt conversion shared by both backends.
pub mod convert;
/// Error taxonomy.
pub mod errors;
/// The `LanguageModel` contract.
pub mod model;
pub mod observability;
/// Per-call options.
pub mod options;
/// Common imports for typical usage.
pub mod prelude;
/// Normalized prompt types.
pub mod prompt;
/// Backend factory and model-id routing.
pub mod provider;
/// Normalized stream events.
pub mod stream;
/// HTTP transport and SSE decoding.
pub mod transport;

pub use abort::{AbortHandle, AbortSignal, abort_pair};
pub use backends::agent::{AgentConfig, AgentLanguageModel};
pub use backends::chat::{ChatConfig, ChatLanguageModel, ChatSettings};
pub use content::{Content, FinishReason, GenerateResult, Usage, Warning};
pub use errors::AdapterError;
pub use model::LanguageModel;
pub use observability::init_observability;
pub use options::{CallOptions, ToolChoice, ToolDefinition};
pub use prompt::{Message, Prompt};
pub use provider::{Provider, ProviderBuilder};
pub use stream::{EventStream, StreamEvent, StreamResult};
