//! `steward status`: Show the resolved configuration.

use steward_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("Steward Status");
    println!("==============");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Provider:      {}", config.default_provider);
    println!("  API key:       {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Chat model:    {}", config.models.chat);
    println!("  Small model:   {}", config.models.small);
    println!("  Large model:   {}", config.models.large);
    println!("  Vision model:  {}", config.models.vision);
    println!("  Memory:        {} (history {})", config.memory.backend, config.memory.history_limit);
    println!("  History scope: {:?}", config.memory.scope);
    println!("  Router:        threshold {:.2}, {:?} classifier", config.router.confidence_threshold, config.router.classifier_size);
    println!("  Room ordering: {}", if config.pipeline.serialize_rooms { "serialized" } else { "concurrent" });
    println!("  Gateway:       {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "  Character:     {}",
        config.agent.character_path.as_deref().unwrap_or("built-in (Stern)")
    );

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `steward onboard` first");
    }

    Ok(())
}
