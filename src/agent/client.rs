//! Completion provider selection.

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
#[cfg(feature = "openai")]
use crate::agent::providers::OpenAiProvider;
use crate::error::AgentError;

/// Provider names compiled into this build.
pub const AVAILABLE_PROVIDERS: &[&str] = &[
    #[cfg(feature = "openai")]
    "openai",
];

/// Builds the completion provider named by `config.provider`.
///
/// Names are matched case-insensitively. Any `OpenAI`-compatible gateway
/// is reached through `"openai"` plus a base URL.
///
/// # Errors
///
/// [`AgentError::UnsupportedProvider`] when the name is not one of
/// [`AVAILABLE_PROVIDERS`].
pub fn create_provider(config: &AgentConfig) -> Result<Box<dyn LlmProvider>, AgentError> {
    let name = config.provider.trim().to_ascii_lowercase();
    match name.as_str() {
        #[cfg(feature = "openai")]
        "openai" => Ok(Box::new(OpenAiProvider::new(config))),
        _ => Err(AgentError::UnsupportedProvider {
            name: config.provider.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(provider: &str) -> AgentConfig {
        AgentConfig::builder()
            .api_key("sk-test")
            .provider(provider)
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_openai_name_is_case_insensitive() {
        let provider = create_provider(&config_for(" OpenAI ")).unwrap_or_else(|_| unreachable!());
        assert_eq!(provider.name(), "openai");
        assert!(AVAILABLE_PROVIDERS.contains(&"openai"));
    }

    #[test]
    fn test_unknown_provider_keeps_configured_name() {
        let result = create_provider(&config_for("Bedrock"));
        assert!(matches!(
            result,
            Err(AgentError::UnsupportedProvider { ref name }) if name == "Bedrock"
        ));
    }
}
