//! The document state machine: validate, classify, extract.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{error, info, warn};

use super::state::{
    ProcessingOptions, ProcessingResult, ProcessingState, ProcessingStatus, ValidationError,
};
use crate::config::ProcessingConfig;
use crate::document::{
    DocumentClass, DocumentClassifier, DocumentLoader, HeuristicClassifier, LocalDocumentLoader,
    normalized_extension,
};
use crate::extraction::{ExtractedRecord, ExtractionEngine, ExtractionError, SplitStrategySelector};
use crate::llm::{GenerationProvider, ProviderDescriptor, ProviderRegistry, RegistryError};
use crate::pii::{PatternRedactor, PiiRedactor, RedactionError, redact_record};

/// Failure inside the `classified → completed` step.
#[derive(Debug, thiserror::Error)]
enum ExtractStageError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Redaction(#[from] RedactionError),
}

/// Processes documents through validation, classification and extraction.
///
/// Every call produces a [`ProcessingResult`]; faults never escape as
/// errors. The registry is shared, so concurrent documents see the same
/// active provider.
#[derive(Debug)]
pub struct DocumentPipeline {
    registry: Arc<ProviderRegistry>,
    classifier: Arc<dyn DocumentClassifier>,
    engine: ExtractionEngine,
    selector: SplitStrategySelector,
    redactor: Option<Arc<dyn PiiRedactor>>,
    supported_formats: Vec<String>,
    batch_concurrency: usize,
}

impl DocumentPipeline {
    /// Build a pipeline with the local loader and heuristic classifier.
    ///
    /// A [`PatternRedactor`] is installed when `config.enable_pii_masking` is set.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: &ProcessingConfig,
    ) -> Result<Self, RedactionError> {
        let redactor: Option<Arc<dyn PiiRedactor>> = if config.enable_pii_masking {
            Some(Arc::new(PatternRedactor::new()?))
        } else {
            None
        };

        let supported_formats = config
            .supported_formats
            .iter()
            .map(|ext| {
                let ext = ext.trim().to_lowercase();
                if ext.starts_with('.') { ext } else { format!(".{ext}") }
            })
            .collect();

        let selector = SplitStrategySelector::from_config(config);
        Ok(Self {
            engine: ExtractionEngine::new(
                Arc::clone(&registry),
                Arc::new(LocalDocumentLoader::new()),
            )
            .with_selector(selector.clone()),
            registry,
            classifier: Arc::new(HeuristicClassifier::new()),
            selector,
            redactor,
            supported_formats,
            batch_concurrency: config.batch_concurrency.max(1),
        })
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn DocumentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.engine = ExtractionEngine::new(Arc::clone(&self.registry), loader)
            .with_selector(self.selector.clone());
        self
    }

    /// Install (or with `None`, remove) the PII redactor.
    #[must_use]
    pub fn with_redactor(mut self, redactor: Option<Arc<dyn PiiRedactor>>) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Run one document to a terminal state.
    pub async fn process_document(&self, path: &str, options: ProcessingOptions) -> ProcessingResult {
        let mut state = ProcessingState::new(path, options);
        info!(name: "pipeline.started", path = %path, "Processing document");

        // pending → validated
        if let Err(e) = self.validate(path).await {
            fail(&mut state, e.to_string());
            return state.into_result();
        }
        let file_name = state
            .path()
            .file_name()
            .map_or_else(|| path.to_string(), |n| n.to_string_lossy().into_owned());
        step(
            &mut state,
            ProcessingStatus::Validated,
            format!("Document validated successfully: {file_name}"),
        );

        // validated → classified
        let class = match self.classifier.classify(state.path()).await {
            Ok(class) => class,
            Err(fault) => {
                fail(&mut state, format!("Classification failed: {fault}"));
                return state.into_result();
            }
        };
        state.set_document_class(class);
        step(
            &mut state,
            ProcessingStatus::Classified,
            format!("Document classified as: {class}"),
        );

        // classified → completed
        match self.extract(state.path(), class, options).await {
            Ok((records, label)) => {
                let count = records.len();
                state.set_extracted(records);
                step(
                    &mut state,
                    ProcessingStatus::Completed,
                    format!(
                        "Document processed successfully using {label}. Extracted {count} data items."
                    ),
                );
            }
            Err(e) => fail(&mut state, format!("Processing failed: {e}")),
        }

        let result = state.into_result();
        info!(
            name: "pipeline.finished",
            path = %result.document_path,
            status = ?result.status,
            document_type = %result.document_type,
            "Document processing finished"
        );
        result
    }

    /// Process one document with `provider` active, restoring the previous
    /// active provider afterwards.
    ///
    /// Concurrent calls run one at a time, each under its own provider.
    pub async fn process_with_provider(
        &self,
        path: &str,
        provider: &str,
        options: ProcessingOptions,
    ) -> ProcessingResult {
        let guard = match self.registry.scoped_switch(provider).await {
            Ok(guard) => guard,
            Err(e) => {
                let mut state = ProcessingState::new(path, options);
                fail(&mut state, format!("Processing failed: {e}"));
                return state.into_result();
            }
        };
        let result = self.process_document(path, options).await;
        drop(guard);
        result
    }

    /// Process `paths` concurrently. Results are keyed by path.
    pub async fn batch_process<I, S>(
        &self,
        paths: I,
        options: ProcessingOptions,
    ) -> BTreeMap<String, ProcessingResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        stream::iter(paths.into_iter().map(Into::into))
            .map(|path: String| async move {
                let result = self.process_document(&path, options).await;
                (path, result)
            })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await
    }

    pub async fn list_available_providers(&self) -> Vec<String> {
        self.registry.list_available().await
    }

    pub fn active_provider_name(&self) -> Option<String> {
        self.registry.active_name()
    }

    pub async fn provider_info(
        &self,
        name: Option<&str>,
    ) -> Result<Vec<ProviderDescriptor>, RegistryError> {
        self.registry.provider_info(name).await
    }

    /// Accepted extensions, lower-case with a leading dot.
    pub fn supported_formats(&self) -> &[String] {
        &self.supported_formats
    }

    async fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if path.trim().is_empty() {
            return Err(ValidationError::EmptyPath);
        }
        let is_file = tokio::fs::metadata(path)
            .await
            .is_ok_and(|meta| meta.is_file());
        if !is_file {
            return Err(ValidationError::NotFound(path.to_string()));
        }
        let ext = normalized_extension(Path::new(path));
        if !self.supported_formats.contains(&ext) {
            let shown = if ext.is_empty() { "(none)".to_string() } else { ext };
            return Err(ValidationError::UnsupportedFormat(shown));
        }
        Ok(())
    }

    async fn extract(
        &self,
        path: &Path,
        class: DocumentClass,
        options: ProcessingOptions,
    ) -> Result<(Vec<ExtractedRecord>, &'static str), ExtractStageError> {
        let route = self.registry.route()?;
        let descriptor = route.active.describe().await;
        let strategy = self.selector.select(&descriptor, options.use_vision);
        info!(
            name: "pipeline.strategy",
            provider = %descriptor.name,
            context_window = descriptor.context_window_tokens(),
            strategy = strategy.label(),
            "Split strategy selected"
        );

        let mut records = self
            .engine
            .extract_routed(&route, path, class, &strategy, options.use_vision)
            .await?;

        if options.enable_pii_masking {
            match &self.redactor {
                Some(redactor) => {
                    for record in &mut records {
                        redact_record(redactor.as_ref(), record).await?;
                    }
                }
                None => warn!(
                    path = %path.display(),
                    "PII masking requested but no redactor is installed"
                ),
            }
        }
        Ok((records, strategy.label()))
    }
}

fn step(state: &mut ProcessingState, next: ProcessingStatus, message: String) {
    if let Err(e) = state.advance(next, message) {
        error!(path = %state.document_path(), error = %e, "Rejected state transition");
    }
}

fn fail(state: &mut ProcessingState, message: String) {
    if let Err(e) = state.fail(message) {
        error!(path = %state.document_path(), error = %e, "Rejected state transition");
    }
}
