//! Factory for building the provider registry from configuration.

use std::sync::Arc;

use super::{
    GenerationError, GenerationProvider, OllamaProvider, OpenAiCompatibleProvider,
    ProviderRegistry,
};
use crate::config::ProvidersConfig;

#[derive(Debug)]
pub struct ProviderFactory;

impl ProviderFactory {
    /// Instantiate every configured backend, in discovery order.
    ///
    /// 1. Ollama (unless disabled)
    /// 2. `OpenAI`-compatible endpoint (only when `base_url` is set)
    pub fn create_all(
        config: &ProvidersConfig,
    ) -> Result<Vec<Arc<dyn GenerationProvider>>, GenerationError> {
        let mut providers: Vec<Arc<dyn GenerationProvider>> = Vec::new();

        if config.ollama.enabled {
            tracing::info!(
                "Registering Ollama provider {} at {} (model: {})",
                config.ollama.name,
                config.ollama.base_url,
                config.ollama.model
            );
            providers.push(Arc::new(OllamaProvider::new(config.ollama.clone())?));
        }

        if let Some(base_url) = &config.openai.base_url {
            tracing::info!(
                "Registering OpenAI-compatible provider {} at {} (model: {})",
                config.openai.name,
                base_url,
                config.openai.model
            );
            providers.push(Arc::new(OpenAiCompatibleProvider::new(
                config.openai.clone(),
            )?));
        }

        if providers.is_empty() {
            tracing::warn!("No model providers configured");
        }
        Ok(providers)
    }

    /// Build the registry and probe every provider to choose the active one.
    pub async fn build_registry(
        config: &ProvidersConfig,
    ) -> Result<ProviderRegistry, GenerationError> {
        let providers = Self::create_all(config)?;
        Ok(ProviderRegistry::initialize(
            providers,
            Some(config.primary.as_str()),
            config.fallback.as_deref(),
        )
        .await)
    }
}
