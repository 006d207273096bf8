//! Text extraction from uploaded documents.
//!
//! Uploaded PDFs are read with `pdf-extract`; photos of packaging labels go
//! through OCR. Whatever text comes out is added to the conversation as an
//! ordinary user turn.

mod ocr;
mod pdf;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub use ocr::{OcrExtractor, DEFAULT_OCR_BINARY, DEFAULT_OCR_LANGUAGE};
pub use pdf::PdfExtractor;

/// Errors that can occur while extracting text from an upload.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The file is neither a PDF nor a supported image.
    #[error("unsupported file type: {0}")]
    Unsupported(String),

    /// The PDF could not be parsed.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    /// The image could not be decoded.
    #[error("image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    /// The OCR engine could not be started.
    #[error("OCR engine `{binary}` unavailable: {source}")]
    OcrUnavailable {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The OCR engine ran but failed.
    #[error("OCR failed: {0}")]
    Ocr(String),

    /// Extraction succeeded but produced no text.
    #[error("no text could be extracted from {0}")]
    Empty(String),

    /// IO error reading the upload.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking extraction task panicked or was cancelled.
    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Result type for extraction operations.
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// A file handed over by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read an upload from disk.
    pub async fn from_path(path: &Path) -> ExtractionResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { file_name, bytes })
    }

    fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

/// Supported upload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
}

impl DocumentKind {
    /// Detect the kind from magic bytes, falling back to the file extension.
    pub fn detect(upload: &Upload) -> Option<Self> {
        let bytes = upload.bytes.as_slice();
        if bytes.starts_with(b"%PDF") {
            return Some(Self::Pdf);
        }
        if bytes.starts_with(&[0x89, b'P', b'N', b'G']) || bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Image);
        }
        match upload.extension().as_deref() {
            Some("pdf") => Some(Self::Pdf),
            Some("png" | "jpg" | "jpeg") => Some(Self::Image),
            _ => None,
        }
    }
}

/// Turns an upload into plain text.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, upload: &Upload) -> ExtractionResult<String>;
}

/// Dispatches uploads to the PDF or OCR extractor by kind.
#[derive(Debug, Clone, Default)]
pub struct DocumentExtractor {
    pdf: PdfExtractor,
    ocr: OcrExtractor,
}

impl DocumentExtractor {
    pub fn new(pdf: PdfExtractor, ocr: OcrExtractor) -> Self {
        Self { pdf, ocr }
    }
}

#[async_trait]
impl Extractor for DocumentExtractor {
    async fn extract(&self, upload: &Upload) -> ExtractionResult<String> {
        let kind = DocumentKind::detect(upload)
            .ok_or_else(|| ExtractionError::Unsupported(upload.file_name.clone()))?;

        let text = match kind {
            DocumentKind::Pdf => self.pdf.extract(upload).await?,
            DocumentKind::Image => self.ocr.extract(upload).await?,
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(ExtractionError::Empty(upload.file_name.clone()));
        }
        debug!(file = %upload.file_name, kind = ?kind, chars = text.len(), "Extracted upload text");
        Ok(text.to_string())
    }
}
