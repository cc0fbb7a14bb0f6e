//! Factory for creating LLM providers from configuration

use std::sync::Arc;

use crate::config::{LLMProvider as LLMProviderType, LLMProviderConfig};
use crate::error::Result;
use crate::llm::retry::RetryConfig;
use crate::llm::LLMProvider;

#[cfg(feature = "llm-openai")]
use crate::llm::providers::openai::OpenAIProvider;

/// Factory for creating LLM providers
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create an LLM provider from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be created (e.g., missing API key)
    pub fn create(config: &LLMProviderConfig, retry: &RetryConfig) -> Result<Arc<dyn LLMProvider>> {
        match config.provider {
            #[cfg(feature = "llm-openai")]
            LLMProviderType::OpenAI => {
                let model = Some(config.model.clone()).filter(|m| !m.is_empty());

                let provider = match (&config.api_key, &config.base_url) {
                    (Some(api_key), Some(base_url)) => OpenAIProvider::with_base_url(
                        api_key.clone(),
                        model.unwrap_or_else(|| "gpt-4o".to_string()),
                        base_url.clone(),
                    ),
                    (Some(api_key), None) => OpenAIProvider::new(
                        api_key.clone(),
                        model.unwrap_or_else(|| "gpt-4o".to_string()),
                    ),
                    (None, _) => OpenAIProvider::from_env(model)?,
                };

                tracing::debug!(model = %provider.model(), base_url = %provider.base_url(), "Created OpenAI provider");
                Ok(Arc::new(provider.with_retry(retry.clone())))
            }

            #[cfg(not(feature = "llm-openai"))]
            LLMProviderType::OpenAI => {
                let _ = retry;
                Err(crate::error::QuillError::Configuration(
                    "OpenAI provider requires 'llm-openai' feature".to_string(),
                ))
            }
        }
    }
}

#[cfg(all(test, feature = "llm-openai"))]
mod tests {
    use super::*;

    #[test]
    fn test_create_with_explicit_key() {
        let config = LLMProviderConfig {
            api_key: Some("sk-test".to_string()),
            model: "gpt-4o-mini".to_string(),
            ..Default::default()
        };
        let provider = LLMProviderFactory::create(&config, &RetryConfig::no_retry()).unwrap();
        let info = provider.model_info();
        assert_eq!(info.provider, "openai");
        assert_eq!(info.model_name, "gpt-4o-mini");
    }
}
