//! Ollama backend (`/api/generate`).
//!
//! Text requests go to the configured model. Requests that carry images are
//! routed to the vision model, when one is configured.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{GenerationError, GenerationOptions, GenerationProvider, ModelCapabilities};
use crate::config::OllamaConfig;

/// Liveness probes must not stall provider selection.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Provider backed by a local or remote Ollama server.
#[derive(Debug)]
pub struct OllamaProvider {
    name: String,
    client: reqwest::Client,
    config: OllamaConfig,
    timeout: Duration,
}

impl OllamaProvider {
    /// Create a provider registered under `config.name`.
    pub fn new(config: OllamaConfig) -> Result<Self, GenerationError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Transport {
                provider: config.name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name: config.name.clone(),
            client,
            config,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn model_for(&self, options: &GenerationOptions) -> Result<&str, GenerationError> {
        if options.images.is_empty() {
            return Ok(&self.config.model);
        }
        self.config
            .vision_model
            .as_deref()
            .ok_or_else(|| GenerationError::VisionUnsupported {
                provider: self.name.clone(),
                model: self.config.model.clone(),
            })
    }

    fn request_body(&self, model: &str, prompt: &str, options: &GenerationOptions) -> serde_json::Value {
        let mut sampling = serde_json::json!({
            "temperature": options.temperature,
            "top_p": options.top_p,
        });
        if let Some(max_tokens) = options.max_tokens {
            sampling["num_predict"] = serde_json::json!(max_tokens);
        }

        let mut body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": sampling,
        });
        if options.json_mode {
            body["format"] = serde_json::json!("json");
        }
        if !options.images.is_empty() {
            let images: Vec<&str> = options
                .images
                .iter()
                .map(|image| image.data_base64.as_str())
                .collect();
            body["images"] = serde_json::json!(images);
        }
        body
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &'static str {
        "ollama"
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities {
            model: self.config.model.clone(),
            context_window_tokens: self.config.context_window,
            vision_capable: self.config.vision_model.is_some(),
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let model = self.model_for(options)?;
        let body = self.request_body(model, prompt, options);

        tracing::debug!(
            name: "provider.request",
            provider = %self.name,
            model = %model,
            images = options.images.len(),
            "Sending generate request"
        );

        let response = self
            .client
            .post(self.endpoint("/api/generate"))
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest(&self.name, self.timeout, &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::from_reqwest(&self.name, self.timeout, &e))?;

        let parsed: GenerateResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => {
                return Err(GenerationError::MalformedResponse {
                    provider: self.name.clone(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(GenerationError::Backend {
                    provider: self.name.clone(),
                    message: format!("HTTP {status}: {text}"),
                });
            }
        };

        if let Some(error) = parsed.error {
            return Err(GenerationError::Backend {
                provider: self.name.clone(),
                message: error,
            });
        }
        if !status.is_success() {
            return Err(GenerationError::Backend {
                provider: self.name.clone(),
                message: format!("HTTP {status}"),
            });
        }

        parsed.response.ok_or_else(|| GenerationError::MalformedResponse {
            provider: self.name.clone(),
            message: "missing `response` field".to_string(),
        })
    }

    async fn is_available(&self) -> bool {
        let response = match self
            .client
            .get(self.endpoint("/api/tags"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::debug!(provider = %self.name, status = %response.status(), "Liveness probe rejected");
                return false;
            }
            Err(e) => {
                tracing::debug!(provider = %self.name, error = %e, "Liveness probe failed");
                return false;
            }
        };

        match response.json::<TagsResponse>().await {
            Ok(tags) => tags
                .models
                .iter()
                .any(|entry| entry.name.contains(&self.config.model)),
            Err(_) => false,
        }
    }
}
