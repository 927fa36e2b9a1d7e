//! Layered configuration.
//!
//! Priority (lowest to highest): built-in defaults, config file, `DOCINTEL_`
//! environment variables, legacy environment variables, CLI flags.

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;

use crate::document::DEFAULT_SUPPORTED_FORMATS;

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Primary model provider (e.g. "ollama", "openai")
    #[arg(long, env = "MODEL_PROVIDER")]
    pub provider: Option<String>,

    /// Provider to retry against when the primary fails
    #[arg(long, env = "FALLBACK_PROVIDER")]
    pub fallback_provider: Option<String>,

    /// Context window of the configured models, in tokens
    #[arg(long, env = "MAX_CONTEXT_TOKENS")]
    pub max_context_tokens: Option<usize>,

    /// Send page images to vision-capable models
    #[arg(long)]
    pub vision: bool,

    /// Do not mask PII in extracted values
    #[arg(long)]
    pub no_pii_masking: bool,

    /// Print provider information and exit
    #[arg(long)]
    pub list_providers: bool,

    /// Benchmark every available provider with this prompt and exit
    #[arg(long, value_name = "PROMPT")]
    pub benchmark: Option<String>,

    /// Documents to process
    pub paths: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub processing: ProcessingConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Provider made active at startup when it is available.
    pub primary: String,
    /// Provider retried once when the active provider fails.
    pub fallback: Option<String>,
    pub ollama: OllamaConfig,
    pub openai: OpenAiConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            primary: "ollama".to_string(),
            fallback: Some("openai".to_string()),
            ollama: OllamaConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub enabled: bool,
    pub name: String,
    pub base_url: String,
    pub model: String,
    /// Model used for requests that carry images. Unset means text only.
    pub vision_model: Option<String>,
    pub context_window: usize,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "phi4:latest".to_string(),
            vision_model: None,
            context_window: 8192,
            timeout_secs: 120,
        }
    }
}

/// Any `OpenAI`-compatible endpoint: Hugging Face TGI, `LocalAI`, `OpenLLM`,
/// vLLM, or a hosted API. Registered only when `base_url` is set.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub name: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub context_window: usize,
    pub vision_capable: bool,
    pub timeout_secs: u64,
    /// Azure deployment name (Azure endpoints only).
    pub deployment_name: Option<String>,
    /// Azure API version (Azure endpoints only).
    pub api_version: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            name: "openai".to_string(),
            base_url: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            context_window: 128_000,
            vision_capable: false,
            timeout_secs: 120,
            deployment_name: None,
            api_version: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Context windows at or below this size always use text chunking.
    pub low_context_threshold: usize,
    /// Tokens kept free for the schema instructions.
    pub prompt_reserve_tokens: usize,
    /// Tokens kept free for the model's answer.
    pub response_reserve_tokens: usize,
    /// Smallest text chunk ever produced, whatever the window.
    pub min_chunk_tokens: usize,
    /// Pages grouped into one request under image chunking.
    pub pages_per_request: usize,
    /// Documents processed concurrently by a batch.
    pub batch_concurrency: usize,
    /// Install the PII redactor.
    pub enable_pii_masking: bool,
    /// Accepted file extensions, with leading dot.
    pub supported_formats: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            low_context_threshold: 8192,
            prompt_reserve_tokens: 1024,
            response_reserve_tokens: 1024,
            min_chunk_tokens: 512,
            pages_per_request: 1,
            batch_concurrency: 4,
            enable_pii_masking: true,
            supported_formats: DEFAULT_SUPPORTED_FORMATS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Emit JSON log lines instead of the compact formatter.
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::from_cli(&cli)
    }

    pub fn from_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // 1. Config file: explicit path must exist, ./config.* is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 2. Prefixed environment, e.g. DOCINTEL_PROVIDERS__OLLAMA__MODEL=llama3
        builder = builder.add_source(
            Environment::with_prefix("DOCINTEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 3. Legacy environment names
        if let Ok(val) = env::var("OLLAMA_API_BASE") {
            builder = builder.set_override("providers.ollama.base_url", val)?;
        }
        if let Ok(val) = env::var("OLLAMA_MODEL") {
            builder = builder.set_override("providers.ollama.model", val)?;
        }
        if let Ok(val) = env::var("OLLAMA_VISION_MODEL") {
            builder = builder.set_override("providers.ollama.vision_model", val)?;
        }
        if let Ok(val) = env::var("ENABLE_PII_MASKING") {
            if let Ok(bool_val) = val.parse::<bool>() {
                builder = builder.set_override("processing.enable_pii_masking", bool_val)?;
            }
        }

        // 4. CLI flags (clap already folded their env vars in)
        if let Some(primary) = &cli.provider {
            builder = builder.set_override("providers.primary", primary.as_str())?;
        }
        if let Some(fallback) = &cli.fallback_provider {
            builder = builder.set_override("providers.fallback", fallback.as_str())?;
        }
        if let Some(tokens) = cli.max_context_tokens {
            let tokens = i64::try_from(tokens)
                .map_err(|e| config::ConfigError::Message(e.to_string()))?;
            builder = builder
                .set_override("providers.ollama.context_window", tokens)?
                .set_override("providers.openai.context_window", tokens)?;
        }
        if cli.no_pii_masking {
            builder = builder.set_override("processing.enable_pii_masking", false)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_legacy_settings() {
        let config = AppConfig::default();
        assert_eq!(config.providers.primary, "ollama");
        assert_eq!(config.providers.fallback.as_deref(), Some("openai"));
        assert_eq!(config.providers.ollama.base_url, "http://localhost:11434");
        assert_eq!(config.processing.low_context_threshold, 8192);
        assert!(config.processing.enable_pii_masking);
        assert!(config.processing.supported_formats.contains(&".pdf".to_string()));
    }

    #[test]
    fn test_cli_parses_paths_and_flags() {
        let cli = Cli::try_parse_from(["docintel", "--vision", "a.pdf", "b.txt"]).unwrap();
        assert!(cli.vision);
        assert_eq!(cli.paths, vec!["a.pdf".to_string(), "b.txt".to_string()]);
    }
}
