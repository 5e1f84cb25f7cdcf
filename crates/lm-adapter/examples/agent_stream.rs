use futures::StreamExt as _;
use lm_adapter::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), AdapterError> {
    lm_adapter::init_observability();

    let provider = Provider::builder().agent(AgentConfig::from_env()?).build()?;
    let model = provider.language_model("agent")?;

    let mut result = model
        .stream(CallOptions::new(vec![Message::user_text(
            "List the files in the working directory.",
        )]))
        .await?;

    while let Some(event) = result.stream.next().await {
        match event {
            StreamEvent::TextDelta { delta } => print!("{delta}"),
            StreamEvent::Finish { usage, .. } => {
                println!();
                if let Some(usage) = usage {
                    eprintln!("approx. tokens: {}", usage.total_tokens);
                }
            }
            StreamEvent::Error { error } => eprintln!("agent error: {error}"),
            StreamEvent::StreamStart { .. } | StreamEvent::ToolCall { .. } => {}
        }
    }
    Ok(())
}
