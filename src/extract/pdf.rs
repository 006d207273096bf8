//! PDF text extraction.

use async_trait::async_trait;

use super::{ExtractionError, ExtractionResult, Extractor, Upload};

/// Extracts the text layer of a PDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for PdfExtractor {
    async fn extract(&self, upload: &Upload) -> ExtractionResult<String> {
        let bytes = upload.bytes.clone();
        // pdf-extract is synchronous and may panic on malformed input
        let result = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ExtractionError::Task(e.to_string()))?;

        result.map_err(|e| ExtractionError::Pdf(e.to_string()))
    }
}
