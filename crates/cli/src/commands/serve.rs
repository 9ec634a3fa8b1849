//! `steward serve`: Start the HTTP gateway.

use steward_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Steward Gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Endpoint:   POST /agent/input");
    println!("   Rate limit: {} req/min", config.gateway.rate_limit_per_minute);

    steward_gateway::start(config)
        .await
        .map_err(|e| format!("Gateway failed: {e}"))?;

    Ok(())
}
