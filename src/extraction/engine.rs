//! Segment-by-segment extraction through the provider registry.
//!
//! Each segment goes to the active provider first. When that fails and a
//! fallback is routed, the split strategy is re-selected for the fallback.
//! With an identical strategy only the failed segment is retried there;
//! otherwise the fallback re-splits the document and serves all of it.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::merge::{ExtractedRecord, RecordMerger, parse_reply};
use super::prompt::extraction_prompt;
use super::strategy::{SplitStrategy, SplitStrategySelector};
use super::tokens::TokenEstimator;
use crate::document::{DocumentClass, DocumentLoader, LoaderError, Segment};
use crate::llm::{
    GenerationError, GenerationOptions, GenerationProvider, ImageAttachment, ProviderRegistry,
    Route,
};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// Every segment failed; `last_error` describes the final failure.
    #[error("Extraction failed for all {attempted} segment(s): {last_error}")]
    Failed {
        attempted: usize,
        last_error: String,
    },

    #[error(transparent)]
    Load(#[from] LoaderError),

    #[error("No model provider available")]
    NoProvider,
}

/// Per-document segment accounting.
#[derive(Debug, Default)]
struct Tally {
    attempted: usize,
    failed: usize,
    last_error: String,
}

impl Tally {
    fn absorb(&mut self, merger: &mut RecordMerger, segment: usize, reply: &str) {
        self.attempted += 1;
        match parse_reply(reply) {
            Some(objects) => {
                let filled: usize = objects.into_iter().map(|o| merger.absorb(o)).sum();
                debug!(segment, filled, "Segment merged");
            }
            None => {
                warn!(
                    name: "extraction.unparseable_reply",
                    segment,
                    "Model reply contained no JSON object"
                );
                self.failed += 1;
                self.last_error = format!("segment {segment}: reply contained no JSON object");
            }
        }
    }

    fn fail(&mut self, segment: usize, error: String) {
        warn!(
            name: "extraction.segment_failed",
            segment,
            error = %error,
            "Segment failed"
        );
        self.attempted += 1;
        self.failed += 1;
        self.last_error = error;
    }
}

/// Runs extraction over a document's segments and merges the results.
#[derive(Debug)]
pub struct ExtractionEngine {
    registry: Arc<ProviderRegistry>,
    loader: Arc<dyn DocumentLoader>,
    selector: SplitStrategySelector,
}

impl ExtractionEngine {
    pub fn new(registry: Arc<ProviderRegistry>, loader: Arc<dyn DocumentLoader>) -> Self {
        Self {
            registry,
            loader,
            selector: SplitStrategySelector::default(),
        }
    }

    /// Selector used to re-plan the split when a fallback serves the document.
    #[must_use]
    pub fn with_selector(mut self, selector: SplitStrategySelector) -> Self {
        self.selector = selector;
        self
    }

    /// Extract records of `class` from the document at `path`.
    ///
    /// `strategy` is the split chosen for the currently active provider.
    /// Segments are processed in order and merged first-writer-wins into a
    /// single record. Failed segments are skipped as long as at least one
    /// succeeds. An empty document yields no records.
    pub async fn extract(
        &self,
        path: &Path,
        class: DocumentClass,
        strategy: &SplitStrategy,
        use_vision: bool,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        let Ok(route) = self.registry.route() else {
            return Err(ExtractionError::NoProvider);
        };
        self.extract_routed(&route, path, class, strategy, use_vision)
            .await
    }

    /// Like [`extract`](Self::extract), against an already resolved route.
    /// `strategy` must have been selected for `route.active`.
    pub async fn extract_routed(
        &self,
        route: &Route,
        path: &Path,
        class: DocumentClass,
        strategy: &SplitStrategy,
        use_vision: bool,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        let segments = self.loader.load(path, strategy).await?;
        if segments.is_empty() {
            info!(path = %path.display(), "Document has no content to extract");
            return Ok(Vec::new());
        }

        let total = segments.len();
        let mut merger = RecordMerger::new(class);
        let mut tally = Tally::default();
        let mut fallback_strategy: Option<SplitStrategy> = None;

        for segment in &segments {
            let err = match self
                .generate_segment(&route.active, class, segment, total, strategy, use_vision)
                .await
            {
                Ok(reply) => {
                    tally.absorb(&mut merger, segment.index(), &reply);
                    continue;
                }
                Err(err) => err,
            };

            let Some(fallback) = &route.fallback else {
                tally.fail(segment.index(), err.to_string());
                continue;
            };

            let replanned = match fallback_strategy {
                Some(planned) => planned,
                None => {
                    let planned = self
                        .selector
                        .select(&fallback.describe().await, use_vision);
                    fallback_strategy = Some(planned);
                    planned
                }
            };
            let resplit = replanned != *strategy;
            warn!(
                name: "provider.failover",
                from = %route.active.name(),
                to = %fallback.name(),
                segment = segment.index(),
                resplit,
                strategy = replanned.label(),
                error = %err,
                "Segment generation failed, retrying on fallback"
            );

            if !resplit {
                match self
                    .generate_segment(fallback, class, segment, total, strategy, use_vision)
                    .await
                {
                    Ok(reply) => tally.absorb(&mut merger, segment.index(), &reply),
                    Err(e) => tally.fail(segment.index(), e.to_string()),
                }
                continue;
            }

            // The fallback cannot take these segments; it serves the whole
            // document under its own split. One hop, so no further failover.
            self.serve_resplit(fallback, path, class, &replanned, use_vision, &mut merger, &mut tally)
                .await;
            break;
        }

        if tally.failed == tally.attempted {
            return Err(ExtractionError::Failed {
                attempted: tally.attempted,
                last_error: tally.last_error,
            });
        }

        let records: Vec<ExtractedRecord> = merger.finish().into_iter().collect();
        info!(
            name: "extraction.completed",
            path = %path.display(),
            segments = tally.attempted,
            failed = tally.failed,
            records = records.len(),
            "Extraction finished"
        );
        Ok(records)
    }

    #[allow(clippy::too_many_arguments)]
    async fn serve_resplit(
        &self,
        provider: &Arc<dyn GenerationProvider>,
        path: &Path,
        class: DocumentClass,
        strategy: &SplitStrategy,
        use_vision: bool,
        merger: &mut RecordMerger,
        tally: &mut Tally,
    ) {
        let segments = match self.loader.load(path, strategy).await {
            Ok(segments) => segments,
            Err(e) => {
                tally.fail(0, format!("{}: {e}", provider.name()));
                return;
            }
        };
        info!(
            name: "extraction.resplit",
            provider = %provider.name(),
            strategy = strategy.label(),
            segments = segments.len(),
            "Document re-split for fallback provider"
        );

        let total = segments.len();
        for segment in &segments {
            match self
                .generate_segment(provider, class, segment, total, strategy, use_vision)
                .await
            {
                Ok(reply) => tally.absorb(merger, segment.index(), &reply),
                Err(e) => tally.fail(segment.index(), e.to_string()),
            }
        }
    }

    async fn generate_segment(
        &self,
        provider: &Arc<dyn GenerationProvider>,
        class: DocumentClass,
        segment: &Segment,
        total: usize,
        strategy: &SplitStrategy,
        use_vision: bool,
    ) -> Result<String, GenerationError> {
        let prompt = extraction_prompt(class, segment, total);
        check_budget(&prompt, strategy, segment.index());

        let mut options = GenerationOptions::extraction();
        if let Segment::Image {
            mime_type,
            data_base64,
            ..
        } = segment
        {
            if !use_vision {
                debug!(segment = segment.index(), "Image segment sent despite vision being off");
            }
            options = options.with_image(ImageAttachment {
                mime_type: mime_type.clone(),
                data_base64: data_base64.clone(),
            });
        }
        provider.generate(&prompt, &options).await
    }
}

fn check_budget(prompt: &str, strategy: &SplitStrategy, segment: usize) {
    if let SplitStrategy::Text { context_window, .. } = strategy {
        let tokens = TokenEstimator::estimate(prompt);
        if tokens > *context_window {
            warn!(
                segment,
                tokens,
                context_window = *context_window,
                "Prompt exceeds the model context window"
            );
        }
    }
}
