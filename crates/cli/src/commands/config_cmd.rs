//! `taxmate config`: Configuration commands.

use taxmate_config::AppConfig;
use taxmate_core::Result;

/// Print a commented default config file.
pub fn print_default() {
    print!("{}", AppConfig::default_toml());
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}

pub fn validate() -> Result<()> {
    println!("Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };

    println!("   Config parsed and validated");
    if !config.has_api_key() {
        println!("   Warning: no API key set (TAXMATE_API_KEY or GROQ_API_KEY)");
    }

    println!();
    println!("   Endpoint:   {}", config.provider.base_url);
    println!("   Model:      {}", config.provider.model);
    println!("   Judge:      {}", config.provider.judge_model());
    println!("   Max turns:  {}", config.agent.max_turns);
    println!("   Approval:   {} rule(s)", config.approval.rules.len());
    println!("   Blacklist:  {}", config.audit.blacklist.join(", "));
    println!(
        "   Gateway:    {}:{}",
        config.gateway.host, config.gateway.port
    );

    Ok(())
}
