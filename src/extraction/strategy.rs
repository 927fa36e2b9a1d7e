//! Choosing how a document is cut into model-sized pieces.

use serde::Serialize;
use text_splitter::{Characters, ChunkConfig, TextSplitter};

use crate::config::ProcessingConfig;
use crate::llm::ProviderDescriptor;

/// Rough chars-per-token ratio used to size character-based chunks.
pub const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Text chunks of at most `chunk_tokens`, for a model with `context_window` tokens.
    Text {
        chunk_tokens: usize,
        context_window: usize,
    },
    /// Page or image segments sent to a vision model.
    Image { pages_per_request: usize },
}

impl SplitStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text chunking",
            Self::Image { .. } => "image chunking",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }
}

/// Pure mapping from provider capabilities to a [`SplitStrategy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitStrategySelector {
    pub low_context_threshold: usize,
    pub prompt_reserve_tokens: usize,
    pub response_reserve_tokens: usize,
    pub min_chunk_tokens: usize,
    pub pages_per_request: usize,
}

impl Default for SplitStrategySelector {
    fn default() -> Self {
        Self::from_config(&ProcessingConfig::default())
    }
}

impl SplitStrategySelector {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            low_context_threshold: config.low_context_threshold,
            prompt_reserve_tokens: config.prompt_reserve_tokens,
            response_reserve_tokens: config.response_reserve_tokens,
            min_chunk_tokens: config.min_chunk_tokens,
            pages_per_request: config.pages_per_request.max(1),
        }
    }

    /// Pick a strategy for `descriptor`.
    ///
    /// Small windows always get text chunking. Larger windows get image
    /// chunking only when the model can see and the caller asked for it.
    pub fn select(&self, descriptor: &ProviderDescriptor, use_vision: bool) -> SplitStrategy {
        let window = descriptor.context_window_tokens();
        if window > self.low_context_threshold && descriptor.vision_capable() && use_vision {
            return SplitStrategy::Image {
                pages_per_request: self.pages_per_request,
            };
        }
        SplitStrategy::Text {
            chunk_tokens: self.chunk_budget(window),
            context_window: window,
        }
    }

    /// Tokens left for document text once prompt and response are reserved.
    pub fn chunk_budget(&self, context_window: usize) -> usize {
        context_window
            .saturating_sub(self.prompt_reserve_tokens)
            .saturating_sub(self.response_reserve_tokens)
            .max(self.min_chunk_tokens)
    }
}

/// Split `text` into trimmed chunks of roughly `max_tokens` each.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<String> {
    let size = max_tokens.max(1) * CHARS_PER_TOKEN;
    let config = ChunkConfig::new(size).with_sizer(Characters).with_trim(true);
    let splitter = TextSplitter::new(config);
    splitter
        .chunks(text)
        .filter(|s| !s.is_empty())
        .map(|s: &str| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelCapabilities, ProviderStatus};

    fn descriptor(window: usize, vision: bool) -> ProviderDescriptor {
        ProviderDescriptor {
            name: "p".to_string(),
            backend: "mock".to_string(),
            capabilities: ModelCapabilities {
                model: "m".to_string(),
                context_window_tokens: window,
                vision_capable: vision,
            },
            status: ProviderStatus::Available,
        }
    }

    #[test]
    fn test_small_window_always_text() {
        let selector = SplitStrategySelector::default();
        let strategy = selector.select(&descriptor(8192, true), true);
        assert_eq!(
            strategy,
            SplitStrategy::Text {
                chunk_tokens: 8192 - 2048,
                context_window: 8192
            }
        );
    }

    #[test]
    fn test_large_vision_window_uses_images() {
        let selector = SplitStrategySelector::default();
        assert_eq!(
            selector.select(&descriptor(32_768, true), true),
            SplitStrategy::Image {
                pages_per_request: 1
            }
        );
    }

    #[test]
    fn test_large_window_without_vision_intent_is_text() {
        let selector = SplitStrategySelector::default();
        assert!(!selector.select(&descriptor(32_768, true), false).is_image());
        assert!(!selector.select(&descriptor(32_768, false), true).is_image());
    }

    #[test]
    fn test_budget_floor() {
        let selector = SplitStrategySelector::default();
        assert_eq!(selector.chunk_budget(1000), 512);
    }

    #[test]
    fn test_chunk_text_respects_budget() {
        let text = "word ".repeat(400);
        let chunks = chunk_text(&text, 50);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 200));
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("   ", 100).is_empty());
    }
}
