//! Per-document processing state and the result record it produces.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::DocumentClass;
use crate::extraction::ExtractedRecord;

/// Lifecycle of one document.
///
/// Status only moves forward through `pending → validated → classified →
/// completed`, or sidesteps to `error` from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Validated,
    Classified,
    Completed,
    Error,
}

impl ProcessingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Validated)
                | (Self::Validated, Self::Classified)
                | (Self::Classified, Self::Completed)
                | (Self::Pending | Self::Validated | Self::Classified, Self::Error)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    /// Send page images to a vision-capable model when the window allows it.
    pub use_vision: bool,
    /// Mask PII in every extracted string value.
    pub enable_pii_masking: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            use_vision: false,
            enable_pii_masking: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid transition from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: ProcessingStatus,
    pub to: ProcessingStatus,
}

/// Why a document was rejected before classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No document path provided")]
    EmptyPath,

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
}

/// Mutable state of one pipeline run.
#[derive(Debug)]
pub struct ProcessingState {
    document_path: String,
    options: ProcessingOptions,
    status: ProcessingStatus,
    document_class: Option<DocumentClass>,
    extracted: Vec<ExtractedRecord>,
    error_message: Option<String>,
    trace: Vec<String>,
}

impl ProcessingState {
    pub fn new(document_path: impl Into<String>, options: ProcessingOptions) -> Self {
        Self {
            document_path: document_path.into(),
            options,
            status: ProcessingStatus::Pending,
            document_class: None,
            extracted: Vec::new(),
            error_message: None,
            trace: Vec::new(),
        }
    }

    pub fn document_path(&self) -> &str {
        &self.document_path
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.document_path)
    }

    pub fn options(&self) -> ProcessingOptions {
        self.options
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    pub fn document_class(&self) -> Option<DocumentClass> {
        self.document_class
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// Move to `next` and record `message` in the trace.
    pub fn advance(
        &mut self,
        next: ProcessingStatus,
        message: impl Into<String>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        let message = message.into();
        tracing::debug!(
            name: "pipeline.transition",
            path = %self.document_path,
            from = ?self.status,
            to = ?next,
            "{message}"
        );
        self.status = next;
        self.trace.push(message);
        Ok(())
    }

    /// Move to `error` with `message`, recorded once in the trace.
    ///
    /// A blank message is replaced so the error record never lacks one.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "Processing failed".to_string();
        }
        self.advance(ProcessingStatus::Error, message.clone())?;
        tracing::warn!(
            name: "pipeline.failed",
            path = %self.document_path,
            error = %message,
            "Document processing failed"
        );
        self.error_message = Some(message);
        Ok(())
    }

    pub fn set_document_class(&mut self, class: DocumentClass) {
        self.document_class = Some(class);
    }

    pub fn set_extracted(&mut self, records: Vec<ExtractedRecord>) {
        self.extracted = records;
    }

    pub fn into_result(self) -> ProcessingResult {
        ProcessingResult {
            status: self.status,
            document_path: self.document_path,
            document_type: self.document_class.unwrap_or(DocumentClass::Unknown),
            extracted_data: self.extracted,
            error_message: self.error_message,
            trace_messages: self.trace,
        }
    }
}

/// Terminal record for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub status: ProcessingStatus,
    pub document_path: String,
    pub document_type: DocumentClass,
    pub extracted_data: Vec<ExtractedRecord>,
    pub error_message: Option<String>,
    pub trace_messages: Vec<String>,
}
