use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use futures::stream;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt as _, AsyncReadExt as _, AsyncWriteExt as _, BufReader, Lines};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::errors::AdapterError;

/// Events emitted by the agent runtime.
///
/// Only text and result events are interpreted; every other event type
/// (tool notices, progress, runtime-side errors) is parsed as `Other` and
/// ignored.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AgentEvent {
    /// Incremental assistant text.
    Text { content: String },
    /// Final answer of the run.
    Result { result: String },
    #[serde(other)]
    Other,
}

/// Options handed to the runtime for one execution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOptions {
    /// Working directory the agent operates in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Directory of additional tools exposed to the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolbox: Option<PathBuf>,
    /// Skip every permission prompt inside the agent.
    #[serde(default)]
    pub dangerously_allow_all: bool,
}

impl ExecuteOptions {
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn toolbox(mut self, toolbox: impl Into<PathBuf>) -> Self {
        self.toolbox = Some(toolbox.into());
        self
    }

    pub fn dangerously_allow_all(mut self, allow: bool) -> Self {
        self.dangerously_allow_all = allow;
        self
    }
}

/// Runtime events in arrival order.
pub type AgentEventStream =
    Pin<Box<dyn futures::Stream<Item = Result<AgentEvent, AdapterError>> + Send>>;

/// Local agent runtime: runs one prompt and streams its events.
///
/// Dropping the returned stream stops the run.
#[async_trait::async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(
        &self,
        prompt: String,
        options: &ExecuteOptions,
    ) -> Result<AgentEventStream, AdapterError>;
}

/// Environment variable through which `CommandExecutor` passes the toolbox.
pub const TOOLBOX_ENV: &str = "AGENT_TOOLBOX";

/// Runs the agent as a subprocess speaking JSON lines.
///
/// The prompt is written to stdin; each stdout line is one JSON event.
/// Lines that are not valid events are skipped. A non-zero exit status ends
/// the stream with `AdapterError::Agent`.
#[derive(Clone, Debug)]
pub struct CommandExecutor {
    program: PathBuf,
    args: Vec<String>,
    allow_all_flag: String,
}

impl CommandExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            allow_all_flag: "--dangerously-allow-all".to_string(),
        }
    }

    /// Appends a fixed argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Overrides the flag passed when `dangerously_allow_all` is set.
    pub fn allow_all_flag(mut self, flag: impl Into<String>) -> Self {
        self.allow_all_flag = flag.into();
        self
    }

    fn command(&self, options: &ExecuteOptions) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if options.dangerously_allow_all {
            command.arg(&self.allow_all_flag);
        }
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }
        if let Some(toolbox) = &options.toolbox {
            command.env(TOOLBOX_ENV, toolbox);
        }
        command
    }
}

#[async_trait::async_trait]
impl AgentExecutor for CommandExecutor {
    async fn execute(
        &self,
        prompt: String,
        options: &ExecuteOptions,
    ) -> Result<AgentEventStream, AdapterError> {
        let program = self.program.display().to_string();
        let mut child = self
            .command(options)
            .spawn()
            .map_err(|e| AdapterError::Agent(format!("failed to start {program}: {e}")))?;
        debug!(program = %program, cwd = ?options.cwd, "agent process started");

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AdapterError::Agent("agent stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AdapterError::Agent("agent stdout unavailable".into()))?;
        let stderr = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        stdin
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| AdapterError::Agent(format!("failed to send prompt to {program}: {e}")))?;
        drop(stdin);

        Ok(event_lines(
            program,
            BufReader::new(stdout).lines(),
            child,
            stderr,
        ))
    }
}

fn event_lines(
    program: String,
    lines: Lines<BufReader<ChildStdout>>,
    child: Child,
    stderr: Option<JoinHandle<String>>,
) -> AgentEventStream {
    struct State {
        program: String,
        lines: Lines<BufReader<ChildStdout>>,
        child: Option<Child>,
        stderr: Option<JoinHandle<String>>,
    }

    Box::pin(stream::unfold(
        State {
            program,
            lines,
            child: Some(child),
            stderr,
        },
        |mut state| async move {
            let mut child = state.child.take()?;
            loop {
                match state.lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<AgentEvent>(line) {
                            Ok(event) => {
                                state.child = Some(child);
                                return Some((Ok(event), state));
                            }
                            Err(e) => debug!(error = %e, "skipping non-event agent output"),
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let err = AdapterError::Agent(format!(
                            "reading {} output failed: {e}",
                            state.program
                        ));
                        return Some((Err(err), state));
                    }
                }
            }

            let status = match child.wait().await {
                Ok(status) => status,
                Err(e) => {
                    let err = AdapterError::Agent(format!("waiting for {} failed: {e}", state.program));
                    return Some((Err(err), state));
                }
            };
            if status.success() {
                return None;
            }
            let stderr = match state.stderr.take() {
                Some(handle) => handle.await.unwrap_or_default(),
                None => String::new(),
            };
            let err = AdapterError::Agent(format!(
                "{} exited with {status}: {}",
                state.program,
                stderr.trim()
            ));
            Some((Err(err), state))
        },
    ))
}
