//! Provider module for Watch Pro
//!
//! This module contains the model provider abstraction and implementations
//! for OpenAI-compatible chat completion services and Ollama.

pub mod base;
pub mod ollama;
pub mod openai;
mod stream;

pub use base::{
    validate_message_sequence, CompletionResponse, FunctionCall, Message, Provider, TokenUsage,
    ToolCall,
};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::config::ProviderConfig;
use crate::error::{Result, WatchProError};
use std::sync::Arc;

/// Create the provider selected by `config.provider_type`
///
/// # Errors
///
/// Returns error if the provider type is unknown, credentials are missing,
/// or initialization fails
///
/// # Examples
///
/// ```
/// use watchpro::config::ProviderConfig;
/// use watchpro::providers::create_provider;
///
/// let config = ProviderConfig {
///     provider_type: "ollama".to_string(),
///     ..Default::default()
/// };
/// assert!(create_provider(&config).is_ok());
/// ```
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config.provider_type.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.openai.clone())?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config.ollama.clone())?)),
        other => {
            Err(WatchProError::Provider(format!("Unknown provider type: {}", other)).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenAiConfig;

    #[test]
    fn test_create_provider_invalid_type() {
        let config = ProviderConfig {
            provider_type: "invalid".to_string(),
            ..Default::default()
        };
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_create_provider_openai_without_key() {
        let config = ProviderConfig::default();
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<WatchProError>(),
            Some(WatchProError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_create_provider_openai_with_key() {
        let config = ProviderConfig {
            openai: OpenAiConfig {
                api_key: Some("sk-test".to_string()),
                model: "gpt-4o-mini".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.get_current_model().unwrap(), "gpt-4o-mini");
    }

    #[test]
    fn test_create_provider_ollama() {
        let config = ProviderConfig {
            provider_type: "ollama".to_string(),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.get_current_model().unwrap(), "llama3.2:latest");
    }
}
