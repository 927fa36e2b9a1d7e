//! PII masking for extracted values.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::extraction::ExtractedRecord;

/// The redactor could not process its input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("PII redaction failed: {0}")]
pub struct RedactionError(pub String);

/// Text in, redacted text out.
#[async_trait]
pub trait PiiRedactor: Send + Sync + std::fmt::Debug {
    async fn redact(&self, text: &str) -> Result<String, RedactionError>;
}

/// Replace every string value in `record`, at any depth, with its redacted form.
pub async fn redact_record(
    redactor: &dyn PiiRedactor,
    record: &mut ExtractedRecord,
) -> Result<usize, RedactionError> {
    let mut changed = 0;
    let mut stack: Vec<&mut Value> = record.values_mut().collect();

    while let Some(value) = stack.pop() {
        match value {
            Value::String(text) => {
                let redacted = redactor.redact(text).await?;
                if redacted != *text {
                    *text = redacted;
                    changed += 1;
                }
            }
            Value::Array(items) => stack.extend(items.iter_mut()),
            Value::Object(map) => stack.extend(map.values_mut()),
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }
    Ok(changed)
}

/// Regex-based redactor for common PII shapes.
///
/// Patterns are applied in order, so card numbers are masked before the
/// looser phone pattern can claim their digits.
#[derive(Debug)]
pub struct PatternRedactor {
    patterns: Vec<(Regex, &'static str)>,
}

impl PatternRedactor {
    pub fn new() -> Result<Self, RedactionError> {
        let specs: [(&str, &'static str); 4] = [
            (
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
                "<EMAIL_ADDRESS>",
            ),
            (r"\b(?:\d[ -]?){12,18}\d\b", "<CREDIT_CARD>"),
            (r"\b\d{3}-\d{2}-\d{4}\b", "<US_SSN>"),
            (
                r"(?:\+\d{1,3}[\s.-]?)?\(?\b\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b",
                "<PHONE_NUMBER>",
            ),
        ];

        let patterns = specs
            .into_iter()
            .map(|(pattern, label)| {
                Regex::new(pattern)
                    .map(|re| (re, label))
                    .map_err(|e| RedactionError(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn redact_str(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (re, label) in &self.patterns {
            if re.is_match(&out) {
                out = re.replace_all(&out, *label).into_owned();
            }
        }
        out
    }
}

#[async_trait]
impl PiiRedactor for PatternRedactor {
    async fn redact(&self, text: &str) -> Result<String, RedactionError> {
        Ok(self.redact_str(text))
    }
}
