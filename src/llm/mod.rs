//! Generation providers and the registry that fails over between them.
//!
//! Every backend implements [`GenerationProvider`]: a prompt goes in, text
//! comes out, or a typed [`GenerationError`] describes what went wrong. The
//! [`ProviderRegistry`] holds all configured backends, tracks which one is
//! active, and retries a failed call once against the fallback.
//!
//! # Providers
//!
//! - [`OllamaProvider`]: Ollama `/api/generate` (optional vision model)
//! - [`OpenAiCompatibleProvider`]: any `OpenAI`-compatible chat completions endpoint
//! - [`MockProvider`]: in-process scripted backend for tests and dry runs
//!
//! # Example
//!
//! ```rust,ignore
//! use docintel::llm::{GenerationOptions, ProviderFactory};
//!
//! let registry = ProviderFactory::build_registry(&config.providers).await?;
//! let text = registry.generate("Summarise this", &GenerationOptions::default()).await?;
//! ```

pub mod chat_completions;
pub mod factory;
pub mod mock;
pub mod ollama;
pub mod provider;
pub mod registry;

pub use chat_completions::OpenAiCompatibleProvider;
pub use factory::ProviderFactory;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use provider::ApiFlavor;
pub use registry::{
    ActiveProviderGuard, BenchmarkOutcome, BenchmarkStatus, ProviderRegistry, RegistryError,
    Route,
};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-call generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling cutoff.
    pub top_p: f32,
    /// Upper bound on generated tokens, if the caller wants one.
    pub max_tokens: Option<u32>,
    /// Ask the backend to constrain output to a JSON document.
    pub json_mode: bool,
    /// Images sent alongside the prompt (vision-capable backends only).
    pub images: Vec<ImageAttachment>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: None,
            json_mode: false,
            images: Vec::new(),
        }
    }
}

impl GenerationOptions {
    /// Low-temperature, JSON-constrained options used for structured extraction.
    #[must_use]
    pub fn extraction() -> Self {
        Self {
            temperature: 0.1,
            json_mode: true,
            ..Self::default()
        }
    }

    /// Attach an image to the request.
    #[must_use]
    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }

    /// Cap the number of generated tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A base64-encoded image sent to a vision-capable model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    /// MIME type of the image (e.g., "image/png").
    pub mime_type: String,
    /// Base64 payload without the data URL prefix.
    pub data_base64: String,
}

impl ImageAttachment {
    /// Render the attachment as a `data:` URL.
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_base64)
    }
}

/// Static model capabilities of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// Model identifier used for text generation.
    pub model: String,
    /// Context window in tokens.
    pub context_window_tokens: usize,
    /// Whether the provider accepts image input.
    pub vision_capable: bool,
}

/// Liveness of a provider at the time it was described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// The backend answered its liveness probe.
    Available,
    /// The backend could not be reached or does not serve the model.
    Unavailable,
}

/// Descriptor returned by [`GenerationProvider::describe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Registry name of the provider.
    pub name: String,
    /// Backend kind (e.g., "ollama").
    pub backend: String,
    /// Model capabilities.
    #[serde(flatten)]
    pub capabilities: ModelCapabilities,
    /// Liveness at describe time.
    pub status: ProviderStatus,
}

impl ProviderDescriptor {
    /// Context window in tokens.
    #[must_use]
    pub fn context_window_tokens(&self) -> usize {
        self.capabilities.context_window_tokens
    }

    /// Whether the provider accepts image input.
    #[must_use]
    pub fn vision_capable(&self) -> bool {
        self.capabilities.vision_capable
    }
}

/// Errors raised by a single backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The backend did not answer in time.
    #[error("{provider}: request timed out after {seconds}s")]
    Timeout {
        /// Provider name.
        provider: String,
        /// Configured timeout.
        seconds: u64,
    },

    /// The request never reached the backend or the connection broke.
    #[error("{provider}: transport error: {message}")]
    Transport {
        /// Provider name.
        provider: String,
        /// Underlying error text.
        message: String,
    },

    /// The backend answered with an error.
    #[error("{provider}: backend error: {message}")]
    Backend {
        /// Provider name.
        provider: String,
        /// Error reported by the backend.
        message: String,
    },

    /// The backend answered with something that could not be decoded.
    #[error("{provider}: malformed response: {message}")]
    MalformedResponse {
        /// Provider name.
        provider: String,
        /// What was wrong with the response.
        message: String,
    },

    /// The backend is known to be offline.
    #[error("{provider}: unavailable: {message}")]
    Unavailable {
        /// Provider name.
        provider: String,
        /// Why the backend is unavailable.
        message: String,
    },

    /// Images were attached but the model cannot see.
    #[error("{provider}: model {model} does not accept image input")]
    VisionUnsupported {
        /// Provider name.
        provider: String,
        /// Model that rejected the images.
        model: String,
    },
}

impl GenerationError {
    /// Name of the provider that raised the error.
    #[must_use]
    pub fn provider(&self) -> &str {
        match self {
            Self::Timeout { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Backend { provider, .. }
            | Self::MalformedResponse { provider, .. }
            | Self::Unavailable { provider, .. }
            | Self::VisionUnsupported { provider, .. } => provider,
        }
    }

    /// Map a `reqwest` failure, distinguishing timeouts from other transport faults.
    pub(crate) fn from_reqwest(provider: &str, timeout: Duration, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
                seconds: timeout.as_secs(),
            }
        } else {
            Self::Transport {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// A single text-generation backend.
///
/// Implementations differ only in how they reach their backend. The
/// registry treats every provider through this trait.
#[async_trait]
pub trait GenerationProvider: Send + Sync + std::fmt::Debug {
    /// Registry name of this provider.
    fn name(&self) -> &str;

    /// Backend kind used in descriptors and logs.
    fn backend(&self) -> &'static str;

    /// Static model capabilities.
    fn capabilities(&self) -> ModelCapabilities;

    /// Generate text for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`] on timeout, transport fault, backend
    /// error, or a response that cannot be decoded.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;

    /// Fast liveness probe. Never fails: any problem reads as `false`.
    async fn is_available(&self) -> bool;

    /// Describe the provider, including its current liveness.
    async fn describe(&self) -> ProviderDescriptor {
        let status = if self.is_available().await {
            ProviderStatus::Available
        } else {
            ProviderStatus::Unavailable
        };
        ProviderDescriptor {
            name: self.name().to_string(),
            backend: self.backend().to_string(),
            capabilities: self.capabilities(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_options() {
        let options = GenerationOptions::extraction();
        assert!(options.json_mode);
        assert!((options.temperature - 0.1).abs() < f32::EPSILON);
        assert!(options.images.is_empty());
    }

    #[test]
    fn test_data_url() {
        let image = ImageAttachment {
            mime_type: "image/png".to_string(),
            data_base64: "AAAA".to_string(),
        };
        assert_eq!(image.data_url(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_error_provider_name() {
        let err = GenerationError::Timeout {
            provider: "ollama".to_string(),
            seconds: 30,
        };
        assert_eq!(err.provider(), "ollama");
        assert_eq!(err.to_string(), "ollama: request timed out after 30s");
    }

    #[test]
    fn test_descriptor_serializes_flat() {
        let descriptor = ProviderDescriptor {
            name: "ollama".to_string(),
            backend: "ollama".to_string(),
            capabilities: ModelCapabilities {
                model: "phi4:latest".to_string(),
                context_window_tokens: 8192,
                vision_capable: false,
            },
            status: ProviderStatus::Available,
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["context_window_tokens"], 8192);
        assert_eq!(json["status"], "available");
    }
}
