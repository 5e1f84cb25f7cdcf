use std::path::PathBuf;

use crate::errors::AdapterError;

use super::executor::{CommandExecutor, ExecuteOptions};

const AGENT_BIN_ENV: &str = "LM_ADAPTER_AGENT_BIN";
const AGENT_CWD_ENV: &str = "LM_ADAPTER_AGENT_CWD";

/// How to launch the local agent runtime.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub provider: String,
    /// Options passed to every execution.
    pub options: ExecuteOptions,
}

impl AgentConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            provider: "lm-adapter.agent".to_string(),
            options: ExecuteOptions::default(),
        }
    }

    /// Reads `LM_ADAPTER_AGENT_BIN` and, if set, `LM_ADAPTER_AGENT_CWD`.
    pub fn from_env() -> Result<Self, AdapterError> {
        let program = std::env::var(AGENT_BIN_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AdapterError::Config(format!("missing {AGENT_BIN_ENV}")))?;
        let mut config = Self::new(program);
        if let Ok(cwd) = std::env::var(AGENT_CWD_ENV)
            && !cwd.trim().is_empty()
        {
            config.options.cwd = Some(cwd.into());
        }
        Ok(config)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }

    pub(crate) fn command_executor(&self) -> CommandExecutor {
        self.args
            .iter()
            .fold(CommandExecutor::new(&self.program), |executor, arg| {
                executor.arg(arg.clone())
            })
    }
}
