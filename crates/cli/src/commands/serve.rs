//! `taxmate serve`: Start the HTTP gateway.

use taxmate_config::AppConfig;
use taxmate_core::{Error, Result};

pub async fn run(port_override: Option<u16>) -> Result<()> {
    let mut config = AppConfig::load()?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        return Err(Error::config(missing_key_message()));
    }

    println!("TaxMate Gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:      {}", config.provider.model);
    println!("   Judge:      {}", config.provider.judge_model());
    println!(
        "   Rate limit: {} runs / {}s",
        config.gateway.rate_limit_requests, config.gateway.rate_limit_window_secs
    );

    taxmate_gateway::start(config).await?;

    Ok(())
}

pub fn missing_key_message() -> String {
    format!(
        "No API key found. Set TAXMATE_API_KEY or GROQ_API_KEY, or add api_key to {}",
        AppConfig::config_dir().join("config.toml").display()
    )
}
