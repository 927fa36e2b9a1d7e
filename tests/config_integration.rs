use docintel::config::AppConfig;
use serial_test::serial;
use std::env;
use std::fs;

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        for key in [
            "CONFIG_FILE",
            "MODEL_PROVIDER",
            "FALLBACK_PROVIDER",
            "MAX_CONTEXT_TOKENS",
            "OLLAMA_API_BASE",
            "OLLAMA_MODEL",
            "OLLAMA_VISION_MODEL",
            "ENABLE_PII_MASKING",
            "DOCINTEL_PROVIDERS__PRIMARY",
            "DOCINTEL_PROCESSING__LOW_CONTEXT_THRESHOLD",
        ] {
            env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(["docintel"]).expect("defaults should load");
    assert_eq!(config.providers.primary, "ollama");
    assert_eq!(config.providers.ollama.model, "phi4:latest");
    assert_eq!(config.processing.low_context_threshold, 8192);
    assert!(config.processing.enable_pii_masking);
}

#[test]
#[serial]
fn test_prefixed_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("DOCINTEL_PROCESSING__LOW_CONTEXT_THRESHOLD", "4096");
        env::set_var("DOCINTEL_PROVIDERS__PRIMARY", "openai");
    }

    let config = AppConfig::load_from_args(["docintel"]).expect("Failed to load config");
    assert_eq!(config.processing.low_context_threshold, 4096);
    assert_eq!(config.providers.primary, "openai");

    clear_env_vars();
}

#[test]
#[serial]
fn test_legacy_env_names() {
    clear_env_vars();
    unsafe {
        env::set_var("OLLAMA_API_BASE", "http://gpu-box:11434");
        env::set_var("OLLAMA_MODEL", "llama3.2");
        env::set_var("OLLAMA_VISION_MODEL", "llava");
        env::set_var("ENABLE_PII_MASKING", "false");
        env::set_var("MAX_CONTEXT_TOKENS", "32768");
    }

    let config = AppConfig::load_from_args(["docintel"]).expect("Failed to load config");
    assert_eq!(config.providers.ollama.base_url, "http://gpu-box:11434");
    assert_eq!(config.providers.ollama.model, "llama3.2");
    assert_eq!(config.providers.ollama.vision_model.as_deref(), Some("llava"));
    assert_eq!(config.providers.ollama.context_window, 32768);
    assert_eq!(config.providers.openai.context_window, 32768);
    assert!(!config.processing.enable_pii_masking);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_flags_win_over_env() {
    clear_env_vars();
    unsafe {
        env::set_var("DOCINTEL_PROVIDERS__PRIMARY", "openai");
    }

    let config = AppConfig::load_from_args([
        "docintel",
        "--provider",
        "ollama",
        "--fallback-provider",
        "tgi",
        "--no-pii-masking",
    ])
    .expect("Failed to load config");
    assert_eq!(config.providers.primary, "ollama");
    assert_eq!(config.providers.fallback.as_deref(), Some("tgi"));
    assert!(!config.processing.enable_pii_masking);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().expect("tempdir");
    let file_path = dir.path().join("docintel.yaml");
    let config_content = r#"
providers:
  primary: openai
  openai:
    base_url: http://localhost:8080
    model: mistral-7b
    context_window: 4096
processing:
  batch_concurrency: 2
  supported_formats: [".txt", ".pdf"]
"#;
    fs::write(&file_path, config_content).expect("Failed to write temp config");

    let path = file_path.to_string_lossy().into_owned();
    let config = AppConfig::load_from_args(["docintel", "--config", path.as_str()])
        .expect("Failed to load config from file");
    assert_eq!(config.providers.primary, "openai");
    assert_eq!(
        config.providers.openai.base_url.as_deref(),
        Some("http://localhost:8080")
    );
    assert_eq!(config.providers.openai.context_window, 4096);
    assert_eq!(config.processing.batch_concurrency, 2);
    assert_eq!(config.processing.supported_formats, vec![".txt", ".pdf"]);
    // Untouched keys keep their defaults
    assert_eq!(config.providers.ollama.base_url, "http://localhost:11434");

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_explicit_config_file_fails() {
    clear_env_vars();

    let result = AppConfig::load_from_args(["docintel", "--config", "/nonexistent/docintel.yaml"]);
    assert!(result.is_err());
}
