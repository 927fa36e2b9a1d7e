//! Document loading and segmentation.
//!
//! A loader turns a file into an ordered list of [`Segment`]s, each small
//! enough for one generation call under the chosen [`SplitStrategy`].

use std::path::Path;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::extraction::strategy::{SplitStrategy, chunk_text};

/// One unit of work for the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text {
        index: usize,
        text: String,
    },
    Image {
        index: usize,
        mime_type: String,
        data_base64: String,
    },
}

impl Segment {
    pub fn index(&self) -> usize {
        match self {
            Self::Text { index, .. } | Self::Image { index, .. } => *index,
        }
    }
}

/// Errors that can occur while loading a document.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The file type cannot be read by this loader.
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    /// The document is an image but the strategy is text-only.
    #[error("{0} is an image and needs a vision-capable model")]
    RequiresVision(String),

    /// The file could not be parsed.
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    /// An I/O error occurred while reading the file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait DocumentLoader: Send + Sync + std::fmt::Debug {
    /// Read `path` and cut it into segments for `strategy`.
    async fn load(
        &self,
        path: &Path,
        strategy: &SplitStrategy,
    ) -> Result<Vec<Segment>, LoaderError>;
}

/// Loader for local files.
///
/// - Text formats (`text/*`, JSON, XML) are read as UTF-8.
/// - PDFs contribute their text layer, one page per form feed.
/// - Raster images become a single image segment.
///
/// PDFs have no rasteriser here, so under image chunking their pages are
/// grouped into text segments instead.
#[derive(Debug, Default)]
pub struct LocalDocumentLoader;

impl LocalDocumentLoader {
    pub fn new() -> Self {
        Self
    }

    fn is_text_mime(mime_type: &str) -> bool {
        mime_type.starts_with("text/")
            || matches!(mime_type, "application/json" | "application/xml")
    }

    async fn read_text(path: &Path) -> Result<String, LoaderError> {
        tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                LoaderError::UnsupportedType(format!(
                    "File is not valid UTF-8 text: {}",
                    path.display()
                ))
            } else {
                LoaderError::Io(e)
            }
        })
    }

    async fn read_pdf_pages(path: &Path) -> Result<Vec<String>, LoaderError> {
        let bytes = tokio::fs::read(path).await?;
        let display = path.display().to_string();

        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| LoaderError::Parse {
                path: display.clone(),
                message: e.to_string(),
            })?
            .map_err(|e| LoaderError::Parse {
                path: display,
                message: e.to_string(),
            })?;

        Ok(text
            .split('\x0c')
            .map(str::trim)
            .filter(|page| !page.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    fn segment_pages(pages: &[String], strategy: &SplitStrategy) -> Vec<Segment> {
        let texts: Vec<String> = match strategy {
            SplitStrategy::Text { chunk_tokens, .. } => pages
                .iter()
                .flat_map(|page| chunk_text(page, *chunk_tokens))
                .collect(),
            SplitStrategy::Image { pages_per_request } => pages
                .chunks((*pages_per_request).max(1))
                .map(|group| group.join("\n\n"))
                .collect(),
        };
        texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| Segment::Text { index, text })
            .collect()
    }
}

#[async_trait]
impl DocumentLoader for LocalDocumentLoader {
    async fn load(
        &self,
        path: &Path,
        strategy: &SplitStrategy,
    ) -> Result<Vec<Segment>, LoaderError> {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let mime_type = mime.essence_str();

        if mime.type_() == mime_guess::mime::IMAGE {
            if !strategy.is_image() {
                return Err(LoaderError::RequiresVision(path.display().to_string()));
            }
            let bytes = tokio::fs::read(path).await?;
            return Ok(vec![Segment::Image {
                index: 0,
                mime_type: mime_type.to_string(),
                data_base64: STANDARD.encode(&bytes),
            }]);
        }

        let pages = if mime_type == "application/pdf" {
            let pages = Self::read_pdf_pages(path).await?;
            if strategy.is_image() {
                tracing::debug!(
                    path = %path.display(),
                    pages = pages.len(),
                    "No rasteriser for PDF pages, sending text layer"
                );
            }
            pages
        } else if Self::is_text_mime(mime_type) {
            vec![Self::read_text(path).await?]
        } else {
            return Err(LoaderError::UnsupportedType(format!(
                "Local loader cannot read {mime_type}"
            )));
        };

        let segments = Self::segment_pages(&pages, strategy);
        tracing::debug!(
            path = %path.display(),
            strategy = strategy.label(),
            segments = segments.len(),
            "Document segmented"
        );
        Ok(segments)
    }
}
