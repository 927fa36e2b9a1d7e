//! URL flavour detection for `OpenAI`-compatible endpoints.
//!
//! Hosted and self-hosted servers speak the same chat completions protocol
//! but differ in URL layout and authentication. This module captures those
//! differences so the provider itself stays flavour-agnostic.

/// Known `OpenAI`-compatible endpoint flavours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// Azure `OpenAI` Service
    AzureOpenAI {
        /// Deployment name (required for Azure)
        deployment_name: String,
        /// API version (e.g., "2024-08-01-preview")
        api_version: String,
    },
    /// Any other server on the standard `/v1` layout with bearer auth
    /// (TGI, vLLM, llama.cpp, `OpenRouter`, Groq, ...)
    Generic,
}

impl ApiFlavor {
    /// Default Azure API version when none is configured.
    pub const DEFAULT_AZURE_API_VERSION: &'static str = "2024-08-01-preview";

    /// Detect the flavour from a base URL.
    ///
    /// # Example
    ///
    /// ```rust
    /// use docintel::llm::ApiFlavor;
    ///
    /// let flavor = ApiFlavor::detect_from_url("https://api.openai.com");
    /// assert_eq!(flavor, ApiFlavor::OpenAI);
    /// ```
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("azure.com") {
            Self::AzureOpenAI {
                deployment_name: String::new(),
                api_version: Self::DEFAULT_AZURE_API_VERSION.to_string(),
            }
        } else if lower.contains("openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Fill in Azure deployment details; other flavours are returned unchanged.
    #[must_use]
    pub fn with_azure_deployment(
        self,
        deployment_name: Option<&str>,
        api_version: Option<&str>,
    ) -> Self {
        match (self, deployment_name) {
            (Self::AzureOpenAI { api_version: detected, .. }, Some(deployment)) => {
                Self::AzureOpenAI {
                    deployment_name: deployment.to_string(),
                    api_version: api_version.map_or(detected, ToString::to_string),
                }
            }
            (other, _) => other,
        }
    }

    /// Build the chat completions URL.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL (trailing slash tolerated)
    #[must_use]
    pub fn build_chat_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::AzureOpenAI {
                deployment_name,
                api_version,
            } => {
                format!(
                    "{base}/openai/deployments/{deployment_name}/chat/completions?api-version={api_version}"
                )
            }
            _ => format!("{base}/v1/chat/completions"),
        }
    }

    /// Build the model listing URL used as a liveness probe.
    #[must_use]
    pub fn build_models_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::AzureOpenAI { api_version, .. } => {
                format!("{base}/openai/models?api-version={api_version}")
            }
            _ => format!("{base}/v1/models"),
        }
    }

    /// Azure authenticates with an `api-key` header instead of a bearer token.
    #[must_use]
    pub fn uses_api_key_header(&self) -> bool {
        matches!(self, Self::AzureOpenAI { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_openai() {
        let flavor = ApiFlavor::detect_from_url("https://api.openai.com");
        assert_eq!(flavor, ApiFlavor::OpenAI);
    }

    #[test]
    fn test_detect_azure() {
        let flavor = ApiFlavor::detect_from_url("https://my-resource.openai.azure.com");
        assert!(matches!(flavor, ApiFlavor::AzureOpenAI { .. }));
        assert!(flavor.uses_api_key_header());
    }

    #[test]
    fn test_detect_local_server_is_generic() {
        let flavor = ApiFlavor::detect_from_url("http://localhost:8080");
        assert_eq!(flavor, ApiFlavor::Generic);
        assert!(!flavor.uses_api_key_header());
    }

    #[test]
    fn test_hosted_compatible_servers_are_generic() {
        let flavor = ApiFlavor::detect_from_url("https://api.groq.com/openai");
        assert_eq!(flavor, ApiFlavor::Generic);
        assert_eq!(
            flavor.build_chat_url("https://api.groq.com/openai"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_build_url_generic() {
        let url = ApiFlavor::Generic.build_chat_url("http://localhost:8080/");
        assert_eq!(url, "http://localhost:8080/v1/chat/completions");
        let models = ApiFlavor::Generic.build_models_url("http://localhost:8080");
        assert_eq!(models, "http://localhost:8080/v1/models");
    }

    #[test]
    fn test_build_url_azure() {
        let flavor = ApiFlavor::detect_from_url("https://my-resource.openai.azure.com")
            .with_azure_deployment(Some("gpt-4o"), None);
        let url = flavor.build_chat_url("https://my-resource.openai.azure.com");
        assert_eq!(
            url,
            "https://my-resource.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-08-01-preview"
        );
    }

    #[test]
    fn test_azure_deployment_ignored_for_other_flavors() {
        let flavor = ApiFlavor::OpenAI.with_azure_deployment(Some("x"), Some("y"));
        assert_eq!(flavor, ApiFlavor::OpenAI);
    }
}
