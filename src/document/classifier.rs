//! Document classification.
//!
//! [`HeuristicClassifier`] looks at the file name first and only falls back
//! to scanning content when the name says nothing. It is best-effort: an
//! unreadable file classifies as [`DocumentClass::Unknown`], not as a fault.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use super::DocumentClass;

/// A classifier could not run at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ClassificationFault(pub String);

#[async_trait]
pub trait DocumentClassifier: Send + Sync + std::fmt::Debug {
    async fn classify(&self, path: &Path) -> Result<DocumentClass, ClassificationFault>;
}

const NAME_KEYWORDS: &[(DocumentClass, &[&str])] = &[
    (DocumentClass::Invoice, &["invoice", "bill"]),
    (DocumentClass::DriverLicense, &["license", "licence", "dl"]),
    (DocumentClass::Passport, &["passport"]),
    (DocumentClass::BusinessCard, &["business", "card"]),
];

const CONTENT_KEYWORDS: &[(DocumentClass, &[&str])] = &[
    (
        DocumentClass::Invoice,
        &["invoice", "amount due", "bill to", "invoice number"],
    ),
    (
        DocumentClass::DriverLicense,
        &["driver license", "driver's license", "driving licence"],
    ),
    (
        DocumentClass::Passport,
        &["passport", "nationality", "place of birth"],
    ),
    (
        DocumentClass::BusinessCard,
        &["business card"],
    ),
];

/// File-name and content keyword classifier.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    content_probe_bytes: usize,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self {
            content_probe_bytes: 4096,
        }
    }
}

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_content_probe_bytes(mut self, bytes: usize) -> Self {
        self.content_probe_bytes = bytes;
        self
    }

    /// Classify from the file stem alone. `None` when no keyword matched.
    pub fn classify_name(path: &Path) -> Option<DocumentClass> {
        let stem = path.file_stem()?.to_str()?.to_lowercase();
        let tokens: Vec<&str> = stem
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let matched: Vec<DocumentClass> = NAME_KEYWORDS
            .iter()
            .filter(|(_, keywords)| tokens.iter().any(|t| keywords.contains(t)))
            .map(|(class, _)| *class)
            .collect();
        decide(&matched)
    }

    /// Classify from a text sample. `None` when no keyword matched.
    pub fn classify_content(sample: &str) -> Option<DocumentClass> {
        let lower = sample.to_lowercase();
        let matched: Vec<DocumentClass> = CONTENT_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(class, _)| *class)
            .collect();
        decide(&matched)
    }

    async fn read_sample(&self, path: &Path) -> std::io::Result<String> {
        let file = tokio::fs::File::open(path).await?;
        let mut buf = Vec::with_capacity(self.content_probe_bytes);
        file.take(self.content_probe_bytes as u64)
            .read_to_end(&mut buf)
            .await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// One class wins outright; several make the document ambiguous.
fn decide(matched: &[DocumentClass]) -> Option<DocumentClass> {
    match matched {
        [] => None,
        [class] => Some(*class),
        _ => Some(DocumentClass::Unknown),
    }
}

#[async_trait]
impl DocumentClassifier for HeuristicClassifier {
    async fn classify(&self, path: &Path) -> Result<DocumentClass, ClassificationFault> {
        if let Some(class) = Self::classify_name(path) {
            tracing::debug!(path = %path.display(), class = %class, "Classified by file name");
            return Ok(class);
        }

        let mime = mime_guess::from_path(path).first_or_octet_stream();
        if mime.type_() != mime_guess::mime::TEXT {
            return Ok(DocumentClass::Unknown);
        }

        match self.read_sample(path).await {
            Ok(sample) => Ok(Self::classify_content(&sample).unwrap_or(DocumentClass::Unknown)),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Content probe failed");
                Ok(DocumentClass::Unknown)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_name_keywords() {
        let cases = [
            ("invoice_2024.pdf", DocumentClass::Invoice),
            ("electric-bill.txt", DocumentClass::Invoice),
            ("dl_scan.png", DocumentClass::DriverLicense),
            ("Driver_Licence.jpg", DocumentClass::DriverLicense),
            ("passport.jpeg", DocumentClass::Passport),
            ("business_card.png", DocumentClass::BusinessCard),
        ];
        for (name, expected) in cases {
            assert_eq!(
                HeuristicClassifier::classify_name(Path::new(name)),
                Some(expected),
                "{name}"
            );
        }
    }

    #[test]
    fn test_keywords_match_whole_tokens() {
        // "handle" contains "dl" but is not the token "dl"
        assert_eq!(HeuristicClassifier::classify_name(Path::new("handle.txt")), None);
    }

    #[test]
    fn test_ambiguous_name_is_unknown() {
        assert_eq!(
            HeuristicClassifier::classify_name(Path::new("passport_invoice.pdf")),
            Some(DocumentClass::Unknown)
        );
    }

    #[tokio::test]
    async fn test_content_fallback() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        writeln!(file, "ACME Corp\nInvoice Number: 42\nAmount due: 100.00").unwrap();

        let class = HeuristicClassifier::new().classify(file.path()).await.unwrap();
        assert_eq!(class, DocumentClass::Invoice);
    }

    #[tokio::test]
    async fn test_unmatched_document_is_unknown() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        writeln!(file, "Meeting notes, nothing to see here").unwrap();

        let class = HeuristicClassifier::new().classify(file.path()).await.unwrap();
        assert_eq!(class, DocumentClass::Unknown);
    }

    #[tokio::test]
    async fn test_missing_file_is_unknown() {
        let class = HeuristicClassifier::new()
            .classify(Path::new("/nonexistent/notes.txt"))
            .await
            .unwrap();
        assert_eq!(class, DocumentClass::Unknown);
    }
}
