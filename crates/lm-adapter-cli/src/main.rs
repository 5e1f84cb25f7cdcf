//! `lm-adapter` command-line tool.

mod args;

use std::io::Write as _;
use std::process::ExitCode;

use clap::Parser;
use futures::StreamExt as _;
use lm_adapter::backends::agent::ExecuteOptions;
use lm_adapter::prelude::*;
use tracing::{error, info};

use crate::args::Args;

/// Failures of the command itself, on top of adapter errors.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("failed to render result as JSON: {0}")]
    Render(#[from] serde_json::Error),
}

fn render_json(result: &GenerateResult) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(result)?)
}

fn build_provider(args: &Args) -> Result<Provider, AdapterError> {
    let mut builder = Provider::builder();
    if let Ok(config) = ChatConfig::from_env() {
        builder = builder.chat(config);
    }
    if let Ok(mut config) = AgentConfig::from_env() {
        let mut options: ExecuteOptions = config.options.clone();
        if let Some(cwd) = &args.cwd {
            options = options.cwd(cwd.clone());
        }
        config = config.options(options.dangerously_allow_all(args.dangerously_allow_all));
        builder = builder.agent(config);
    }
    builder.build()
}

fn call_options(args: &Args, abort: AbortSignal) -> CallOptions {
    let mut messages = Vec::new();
    if let Some(system) = &args.system {
        messages.push(Message::system(system.clone()));
    }
    messages.push(Message::user_text(args.prompt_text()));

    let mut options = CallOptions::new(messages).abort_signal(abort);
    if let Some(temperature) = args.temperature {
        options = options.temperature(temperature);
    }
    if let Some(max_tokens) = args.max_tokens {
        options = options.max_output_tokens(max_tokens);
    }
    options
}

async fn run(args: Args, abort: AbortSignal) -> Result<(), CliError> {
    let provider = build_provider(&args)?;
    let model = provider.language_model(&args.model)?;
    info!(provider = model.provider(), model = model.model_id(), "running prompt");
    let options = call_options(&args, abort);

    if args.stream {
        let mut result = model.stream(options).await?;
        for warning in &result.warnings {
            eprintln!("warning: {warning:?}");
        }
        let mut stdout = std::io::stdout();
        while let Some(event) = result.stream.next().await {
            match event {
                StreamEvent::TextDelta { delta } => {
                    print!("{delta}");
                    let _ = stdout.flush();
                }
                StreamEvent::ToolCall {
                    tool_name, input, ..
                } => println!("\n[tool call] {tool_name}({input})"),
                StreamEvent::Finish { finish_reason, .. } => {
                    println!();
                    info!(?finish_reason, "stream finished");
                }
                StreamEvent::Error { error } => eprintln!("\nstream error: {error}"),
                StreamEvent::StreamStart { .. } => {}
            }
        }
        return Ok(());
    }

    let result = model.generate(options).await?;
    if args.json {
        println!("{}", render_json(&result)?);
    } else {
        for warning in &result.warnings {
            eprintln!("warning: {warning:?}");
        }
        println!("{}", result.text());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    lm_adapter::init_observability();
    let args = Args::parse();

    let (handle, signal) = abort_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.abort();
        }
    });

    match run(args, signal).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Adapter(AdapterError::Cancelled)) => {
            eprintln!("cancelled");
            ExitCode::from(130)
        }
        Err(CliError::Adapter(err)) => {
            error!(error = %err, retryable = err.is_retryable(), "prompt failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_options_include_system_and_settings() {
        let args = Args::try_parse_from([
            "lm-adapter",
            "-s",
            "be brief",
            "-t",
            "0.5",
            "--max-tokens",
            "64",
            "hello",
            "there",
        ])
        .expect("args");
        let (_handle, signal) = abort_pair();
        let options = call_options(&args, signal);
        assert_eq!(options.prompt.messages().len(), 2);
        assert_eq!(options.temperature, Some(0.5));
        assert_eq!(options.max_output_tokens, Some(64));
        assert!(options.abort_signal.is_some());
    }

    #[test]
    fn json_output_renders_the_full_result() {
        let result = GenerateResult {
            content: vec![Content::Text { text: "hi".into() }],
            finish_reason: FinishReason::Stop,
            usage: Usage::new(1, 1),
            warnings: Vec::new(),
            request: Default::default(),
            response: Default::default(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&render_json(&result).expect("render")).expect("json");
        assert_eq!(json["usage"]["totalTokens"], serde_json::json!(2));
    }

    #[test]
    fn render_failures_stay_out_of_the_adapter_taxonomy() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").expect_err("truncated");
        let err = CliError::from(serde_err);
        assert!(matches!(err, CliError::Render(_)));
        assert!(err.to_string().starts_with("failed to render result as JSON"));
    }
}
