use std::path::PathBuf;

use clap::Parser;

/// Send one prompt to a chat model or the local agent.
#[derive(Debug, Parser)]
#[command(name = "lm-adapter", about = "Run a prompt through lm-adapter")]
pub struct Args {
    /// Model id; `agent` or `agent/<name>` selects the local agent runtime
    #[arg(short, long, default_value = "gpt-4o-mini", env = "LM_ADAPTER_MODEL")]
    pub model: String,

    /// Optional system message
    #[arg(short, long)]
    pub system: Option<String>,

    /// Sampling temperature (chat backend only)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Upper bound on generated tokens (chat backend only)
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Print text as it arrives
    #[arg(long)]
    pub stream: bool,

    /// Print the full result as JSON instead of plain text
    #[arg(long, conflicts_with = "stream")]
    pub json: bool,

    /// Working directory for the agent runtime
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Let the agent run without permission prompts
    #[arg(long)]
    pub dangerously_allow_all: bool,

    /// Prompt text
    #[arg(required = true, num_args = 1..)]
    pub prompt: Vec<String>,
}

impl Args {
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ")
    }
}
