//! Document intelligence pipeline.
//!
//! Classifies documents (invoices, driver licenses, passports, business
//! cards) and extracts structured records from them through interchangeable
//! generation backends, failing over between backends and sizing content to
//! each model's context window.
//!
//! # Architecture
//!
//! - **Providers**: one trait over Ollama, `OpenAI`-compatible servers and a mock
//! - **Registry**: active/fallback selection, one-hop failover, scoped switching
//! - **Extraction**: split strategy selection, schema prompts, first-writer-wins merge
//! - **Pipeline**: `pending → validated → classified → completed | error`
//!
//! # Modules
//!
//! - [`config`]: layered configuration and CLI flags
//! - [`llm`]: generation providers and the provider registry
//! - [`document`]: document classes, classifier and loader
//! - [`extraction`]: strategy selection and the extraction engine
//! - [`pii`]: PII redaction
//! - [`pipeline`]: the document state machine
//! - [`telemetry`]: logging initialisation

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod document;
pub mod extraction;
pub mod llm;
pub mod pii;
pub mod pipeline;
pub mod telemetry;

pub use config::AppConfig;
pub use document::{DocumentClass, DocumentClassifier, DocumentLoader};
pub use extraction::{ExtractedRecord, SplitStrategy};
pub use llm::{GenerationOptions, GenerationProvider, ProviderRegistry};
pub use pii::PiiRedactor;
pub use pipeline::{DocumentPipeline, ProcessingOptions, ProcessingResult, ProcessingStatus};
