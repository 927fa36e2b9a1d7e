//! Document-intelligence pipeline.
//!
//! ```text
//! pending ──► validated ──► classified ──► completed
//!    │            │             │
//!    └────────────┴─────────────┴──────► error
//! ```
//!
//! Each attempted transition appends exactly one trace message. `completed`
//! and `error` are terminal.

pub mod machine;
pub mod state;

pub use machine::DocumentPipeline;
pub use state::{
    ProcessingOptions, ProcessingResult, ProcessingState, ProcessingStatus, TransitionError,
    ValidationError,
};
