use std::panic::{catch_unwind, AssertUnwindSafe};

use super::types::PdfTextLayer;
use super::ExtractionError;

/// PDF text-layer extractor using the pdf-extract crate.
/// Handles born-digital PDFs; scanned pages come back empty.
pub struct PdfTextExtractor;

impl PdfTextLayer for PdfTextExtractor {
    fn page_texts(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        if !pdf_bytes.starts_with(b"%PDF") {
            return Err(ExtractionError::CorruptInput(
                "missing %PDF header".into(),
            ));
        }

        // pdf-extract panics on some malformed font tables
        let result = catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
        }))
        .map_err(|_| ExtractionError::CorruptInput("PDF parser panicked".into()))?;

        let pages = result.map_err(|e| ExtractionError::CorruptInput(e.to_string()))?;

        tracing::debug!(pages = pages.len(), "PDF text layer read");
        Ok(pages)
    }
}
