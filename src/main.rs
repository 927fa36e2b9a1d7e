//! Command-line entry point.
//!
//! Loads configuration, probes the configured model backends and runs every
//! path given on the command line through the pipeline, printing the result
//! records as JSON.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;

use docintel::config::{AppConfig, Cli};
use docintel::llm::ProviderFactory;
use docintel::{DocumentPipeline, ProcessingOptions, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli).context("Configuration error")?;

    if let Err(e) = telemetry::init(&config.telemetry) {
        eprintln!("Logging already initialised: {e}");
    }

    info!(
        name: "app.starting",
        primary = %config.providers.primary,
        fallback = ?config.providers.fallback,
        "Starting document intelligence"
    );

    let registry = Arc::new(
        ProviderFactory::build_registry(&config.providers)
            .await
            .context("Failed to create model providers")?,
    );

    if cli.list_providers {
        let info = registry.provider_info(None).await?;
        let report = serde_json::json!({
            "active": registry.active_name(),
            "fallback": registry.fallback_name(),
            "providers": info,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(prompt) = &cli.benchmark {
        let outcomes = registry.benchmark(prompt).await;
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No documents given. Pass one or more paths, or --list-providers.");
    }

    let pipeline = DocumentPipeline::new(Arc::clone(&registry), &config.processing)
        .context("Failed to build pipeline")?;
    let options = ProcessingOptions {
        use_vision: cli.vision,
        enable_pii_masking: config.processing.enable_pii_masking,
    };

    let results = pipeline.batch_process(cli.paths.iter().cloned(), options).await;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
