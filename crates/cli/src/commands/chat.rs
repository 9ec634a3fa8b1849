//! `steward chat`: Interactive or single-message chat through the
//! in-process pipeline.

use std::io::Write;
use std::sync::Arc;

use steward_agent::{Agent, BufferedSink, GENERIC_FAILURE_MESSAGE, Outcome};
use steward_channels::CliChannel;
use steward_config::AppConfig;
use steward_core::channel::Channel;
use steward_core::input::Input;
use steward_gateway::{Runtime, build_runtime};

pub async fn run(message: Option<String>, user: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    STEWARD_API_KEY=...      (generic)");
        eprintln!("    OPENROUTER_API_KEY=...   (recommended)");
        eprintln!("    OPENAI_API_KEY=...       (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let runtime = build_runtime(&config)
        .await
        .map_err(|e| format!("Failed to start: {e}"))?;
    let agent = runtime.primary().ok_or("No agent configured")?;

    let mut channel = CliChannel::new(agent.agent_id());
    if let Some(user) = user {
        channel = channel.with_user(user);
    }

    if let Some(msg) = message {
        let input = channel.parse_line(&msg).ok_or("Message is empty")?;
        eprint!("  Thinking...");
        let reply = ask(&runtime, Arc::clone(&agent), input).await;
        eprint!("\r              \r");
        println!("{reply}");
        return Ok(());
    }

    let name = agent.character().name.clone();
    println!();
    println!("  Steward — chatting with {name}");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.models.chat);
    println!("  Routes:    {}", agent.routes().names().join(", "));
    println!("  Room:      {}", channel.room_id());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Prefix with `/image <url>` to attach an image.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut rx = channel.start().await.map_err(|e| format!("Channel error: {e}"))?;
    prompt()?;

    while let Some(result) = rx.recv().await {
        match result {
            Ok(input) => {
                let room_id = input.room_id.clone();
                let reply = ask(&runtime, Arc::clone(&agent), input).await;
                println!();
                channel
                    .send(&room_id, &format!("  {name} > {reply}"))
                    .await
                    .map_err(|e| format!("Channel error: {e}"))?;
                println!();
                prompt()?;
            }
            Err(e) => {
                eprintln!("  Channel error: {e}");
                break;
            }
        }
    }

    println!("\n  Goodbye!");
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

/// Run one input through the pipeline and render its outcome.
async fn ask(runtime: &Runtime, agent: Arc<Agent>, input: Input) -> String {
    let sink = Arc::new(BufferedSink::new());
    runtime.pipeline.process(input, agent, sink.clone()).await;

    match sink.take().await {
        Some(Outcome::Text(text)) => text,
        Some(Outcome::Json(value)) => {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
        }
        Some(Outcome::Failure { message, .. }) => message,
        None => GENERIC_FAILURE_MESSAGE.to_string(),
    }
}
