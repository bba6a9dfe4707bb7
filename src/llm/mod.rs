//! LLM integration for the concierge and ID checks.
//!
//! Talks to the Anthropic Messages API directly over `reqwest`; everything
//! else sees only the [`LlmProvider`] trait.

pub mod anthropic;
pub mod provider;
#[cfg(test)]
pub(crate) mod stub;

pub use anthropic::AnthropicProvider;
pub use provider::*;

use std::sync::Arc;

use crate::config::LlmSettings;

/// Create the configured provider, if AI features are enabled.
pub fn create_provider(settings: Option<&LlmSettings>) -> Option<Arc<dyn LlmProvider>> {
    match settings {
        Some(settings) => Some(Arc::new(AnthropicProvider::new(settings))),
        None => {
            tracing::info!("ANTHROPIC_API_KEY not set; AI concierge and ID checks disabled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn provider_only_when_configured() {
        assert!(create_provider(None).is_none());
        let settings = LlmSettings {
            api_key: SecretString::from("sk-test"),
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
        };
        let provider = create_provider(Some(&settings)).unwrap();
        assert_eq!(provider.model_name(), "claude-sonnet-4-20250514");
    }
}
