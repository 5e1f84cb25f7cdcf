//! HTTP chat-completion backend.
//!
//! Requests are built from the shared prompt conversion, sent through a
//! `Transport`, and mapped back either as one response or as a chunk stream.
mod adapter;
mod config;
pub mod request;
pub mod response;
pub mod stream;

pub use adapter::ChatLanguageModel;
pub use config::{ChatConfig, ChatSettings};
pub use request::{ChatRequest, build_request};
pub use response::map_response;
pub use stream::{ChatStreamMapper, map_chunk_stream};
