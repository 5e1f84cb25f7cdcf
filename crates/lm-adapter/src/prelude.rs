//! Common imports for typical adapter usage.
pub use crate::{
    AbortHandle, AbortSignal, AdapterError, AgentConfig, CallOptions, ChatConfig, ChatSettings,
    Content, FinishReason, GenerateResult, LanguageModel, Message, Prompt, Provider,
    StreamEvent, StreamResult, ToolChoice, ToolDefinition, Usage, Warning, abort_pair,
};
