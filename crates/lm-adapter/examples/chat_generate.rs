use lm_adapter::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), AdapterError> {
    lm_adapter::init_observability();

    let provider = Provider::builder().chat(ChatConfig::from_env()?).build()?;
    let model = provider.language_model("gpt-4o-mini")?;

    let result = model
        .generate(
            CallOptions::new(vec![
                Message::system("Answer briefly."),
                Message::user_text("Say hello"),
            ])
            .temperature(0.2),
        )
        .await?;

    println!("{}", result.text());
    println!(
        "finish={:?} tokens={}",
        result.finish_reason, result.usage.total_tokens
    );
    Ok(())
}
