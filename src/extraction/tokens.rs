use std::sync::LazyLock;

use tiktoken_rs::{CoreBPE, cl100k_base};

static CL100K: LazyLock<Option<CoreBPE>> = LazyLock::new(|| match cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        tracing::warn!(error = %e, "cl100k_base unavailable, estimating tokens from length");
        None
    }
});

#[derive(Debug)]
pub struct TokenEstimator;

impl TokenEstimator {
    /// Estimate tokens for a string using `cl100k_base`.
    pub fn estimate(content: &str) -> usize {
        match CL100K.as_ref() {
            Some(bpe) => bpe.encode_with_special_tokens(content).len(),
            None => content.chars().count().div_ceil(super::strategy::CHARS_PER_TOKEN),
        }
    }
}
