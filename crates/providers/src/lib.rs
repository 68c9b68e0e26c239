//! LLM provider implementations for TaxMate.
//!
//! The pipeline consumes two opaque collaborators, the agent-proposal
//! function and the judgment function. Both are served here by one
//! OpenAI-compatible client, configured from `[provider]`.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use std::time::Duration;
use taxmate_core::{AgentError, Judge, Proposer};

/// The external functions a governed run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub proposer: Arc<dyn Proposer>,
    pub judge: Arc<dyn Judge>,
}

/// Build the proposer and judge from configuration.
///
/// Fails with `NotConfigured` when no API key is available.
pub fn build_from_config(config: &taxmate_config::AppConfig) -> Result<Collaborators, AgentError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        AgentError::NotConfigured(
            "no API key: set TAXMATE_API_KEY, GROQ_API_KEY, or api_key in config.toml".into(),
        )
    })?;

    let provider = &config.provider;
    let timeout = Duration::from_secs(provider.http_timeout_secs);

    let proposer = OpenAiCompatProvider::new("agent", &provider.base_url, &api_key, &provider.model)
        .with_temperature(provider.temperature)
        .with_timeout(timeout);

    let judge = OpenAiCompatProvider::new(
        "judgment",
        &provider.base_url,
        &api_key,
        provider.judge_model(),
    )
    .with_temperature(provider.temperature)
    .with_timeout(timeout);

    tracing::info!(
        base_url = %provider.base_url,
        model = %provider.model,
        judge_model = %provider.judge_model(),
        "Providers configured"
    );

    Ok(Collaborators {
        proposer: Arc::new(proposer),
        judge: Arc::new(judge),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxmate_config::AppConfig;

    #[test]
    fn missing_api_key_is_not_configured() {
        let config = AppConfig::default();
        assert!(matches!(
            build_from_config(&config),
            Err(AgentError::NotConfigured(_))
        ));
    }

    #[test]
    fn builds_both_collaborators() {
        let mut config = AppConfig {
            api_key: Some("gsk-test".into()),
            ..AppConfig::default()
        };
        config.provider.judge_model = Some("llama-3.1-8b-instant".into());

        let collab = build_from_config(&config).unwrap();
        assert_eq!(collab.proposer.name(), "agent");
        assert_eq!(collab.judge.name(), "judgment");
    }
}
