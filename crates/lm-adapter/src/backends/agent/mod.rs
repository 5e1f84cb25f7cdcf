//! Local coding-agent backend.
//!
//! The prompt is flattened into one string and handed to an `AgentExecutor`;
//! its text and result events are mapped back to the normalized shapes.
//! Other runtime events are not surfaced.
mod adapter;
mod config;
pub mod executor;

pub use adapter::AgentLanguageModel;
pub use config::AgentConfig;
pub use executor::{AgentEvent, AgentEventStream, AgentExecutor, CommandExecutor, ExecuteOptions};
