//! Structured extraction: split strategy selection, prompting, reply parsing
//! and merging.

pub mod engine;
pub mod merge;
pub mod prompt;
pub mod strategy;
pub mod tokens;

pub use engine::{ExtractionEngine, ExtractionError};
pub use merge::{ExtractedRecord, RecordMerger, parse_reply};
pub use strategy::{SplitStrategy, SplitStrategySelector, chunk_text};
pub use tokens::TokenEstimator;
