//! `OpenAI`-compatible Chat Completions backend.
//!
//! Works against any server that speaks `/v1/chat/completions`: Hugging Face
//! TGI, `LocalAI`, `OpenLLM`, vLLM, as well as hosted APIs. URL layout and
//! authentication follow the detected [`ApiFlavor`].

use std::time::Duration;

use async_trait::async_trait;

use super::{
    ApiFlavor, GenerationError, GenerationOptions, GenerationProvider, ModelCapabilities,
};
use crate::config::OpenAiConfig;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Provider for `OpenAI`-compatible chat completions endpoints.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    name: String,
    http: reqwest::Client,
    base_url: String,
    flavor: ApiFlavor,
    config: OpenAiConfig,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("flavor", &self.flavor)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleProvider {
    /// Create a provider from configuration.
    ///
    /// Fails when no `base_url` is configured.
    pub fn new(config: OpenAiConfig) -> Result<Self, GenerationError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| GenerationError::Unavailable {
                provider: config.name.clone(),
                message: "no base_url configured".to_string(),
            })?;

        let flavor = ApiFlavor::detect_from_url(&base_url).with_azure_deployment(
            config.deployment_name.as_deref(),
            config.api_version.as_deref(),
        );

        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Transport {
                provider: config.name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name: config.name.clone(),
            http,
            base_url,
            flavor,
            config,
            timeout,
        })
    }

    /// Detected endpoint flavour.
    #[must_use]
    pub fn flavor(&self) -> &ApiFlavor {
        &self.flavor
    }

    fn authorize(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) if self.flavor.uses_api_key_header() => rb.header("api-key", key),
            Some(key) => rb.bearer_auth(key),
            None => rb,
        }
    }

    fn request_body(&self, prompt: &str, options: &GenerationOptions) -> serde_json::Value {
        let content = if options.images.is_empty() {
            serde_json::json!(prompt)
        } else {
            let mut parts = vec![serde_json::json!({ "type": "text", "text": prompt })];
            parts.extend(options.images.iter().map(|image| {
                serde_json::json!({
                    "type": "image_url",
                    "image_url": { "url": image.data_url() }
                })
            }));
            serde_json::Value::Array(parts)
        };

        let mut body = serde_json::json!({
            "model": self.config.model,
            "stream": false,
            "temperature": options.temperature,
            "top_p": options.top_p,
            "messages": [{ "role": "user", "content": content }],
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if options.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }

    fn parse_reply(&self, v: &serde_json::Value) -> Result<String, GenerationError> {
        if let Some(message) = v
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .filter(|e| !e.is_null())
        {
            let message = message
                .as_str()
                .map_or_else(|| message.to_string(), ToString::to_string);
            return Err(GenerationError::Backend {
                provider: self.name.clone(),
                message,
            });
        }

        v["choices"][0]["message"]["content"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| GenerationError::MalformedResponse {
                provider: self.name.clone(),
                message: "missing choices[0].message.content".to_string(),
            })
    }
}

#[async_trait]
impl GenerationProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &'static str {
        "openai_compatible"
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities {
            model: self.config.model.clone(),
            context_window_tokens: self.config.context_window,
            vision_capable: self.config.vision_capable,
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        if !options.images.is_empty() && !self.config.vision_capable {
            return Err(GenerationError::VisionUnsupported {
                provider: self.name.clone(),
                model: self.config.model.clone(),
            });
        }

        let url = self.flavor.build_chat_url(&self.base_url);
        let body = self.request_body(prompt, options);

        tracing::debug!(
            name: "provider.request",
            provider = %self.name,
            model = %self.config.model,
            images = options.images.len(),
            "Sending chat completions request"
        );

        let response = self
            .authorize(self.http.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest(&self.name, self.timeout, &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::from_reqwest(&self.name, self.timeout, &e))?;

        let v: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
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

        if !status.is_success() && v.get("error").is_none() {
            return Err(GenerationError::Backend {
                provider: self.name.clone(),
                message: format!("HTTP {status}"),
            });
        }

        self.parse_reply(&v)
    }

    async fn is_available(&self) -> bool {
        let url = self.flavor.build_models_url(&self.base_url);
        match self
            .authorize(self.http.get(&url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = %self.name, error = %e, "Liveness probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImageAttachment;

    fn provider(vision_capable: bool) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(OpenAiConfig {
            base_url: Some("http://localhost:8080".to_string()),
            vision_capable,
            ..OpenAiConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_requires_base_url() {
        let result = OpenAiCompatibleProvider::new(OpenAiConfig::default());
        assert!(matches!(result, Err(GenerationError::Unavailable { .. })));
    }

    #[test]
    fn test_local_server_is_generic_flavor() {
        assert_eq!(provider(false).flavor(), &ApiFlavor::Generic);
    }

    #[test]
    fn test_request_body_text_only() {
        let body = provider(false).request_body("hi", &GenerationOptions::extraction());
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_request_body_multimodal() {
        let options = GenerationOptions::default().with_image(ImageAttachment {
            mime_type: "image/jpeg".to_string(),
            data_base64: "BBBB".to_string(),
        });
        let body = provider(true).request_body("describe", &options);
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,BBBB");
    }

    #[test]
    fn test_parse_reply_content_and_errors() {
        let provider = provider(false);
        let ok = serde_json::json!({"choices": [{"message": {"content": "{\"a\":1}"}}]});
        assert_eq!(provider.parse_reply(&ok).unwrap(), "{\"a\":1}");

        let err = serde_json::json!({"error": {"message": "model not loaded"}});
        assert!(matches!(
            provider.parse_reply(&err),
            Err(GenerationError::Backend { message, .. }) if message == "model not loaded"
        ));

        let empty = serde_json::json!({"choices": []});
        assert!(matches!(
            provider.parse_reply(&empty),
            Err(GenerationError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_images_rejected_when_not_vision_capable() {
        let options = GenerationOptions::default().with_image(ImageAttachment {
            mime_type: "image/png".to_string(),
            data_base64: "AAAA".to_string(),
        });
        let result = provider(false).generate("x", &options).await;
        assert!(matches!(result, Err(GenerationError::VisionUnsupported { .. })));
    }
}
