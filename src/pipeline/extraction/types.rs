use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ExtractionError;

/// Result of text extraction from a single document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub method: ExtractionMethod,
    /// Native text: fixed high value. OCR: length-weighted mean of page confidences.
    pub confidence: f32,
    pub pages: Vec<PageText>,
    pub artifacts: BTreeMap<ArtifactKind, Vec<String>>,
    pub language_detected: Option<String>,
    pub warnings: Vec<ExtractionWarning>,
}

/// How text was extracted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    NativeText,
    DocxText,
    PlainText,
    Ocr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativeText => "native_text",
            Self::DocxText => "docx_text",
            Self::PlainText => "plain_text",
            Self::Ocr => "ocr",
        }
    }
}

/// Per-page extraction result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: usize,
    pub text: String,
    pub confidence: f32,
    pub ocr: bool,
}

/// Kinds of key patterns picked out of the final text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Date,
    Amount,
    Email,
    Phone,
}

/// Non-fatal problems noticed during extraction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ExtractionWarning {
    LowConfidencePage { page: usize, confidence: f32 },
    PreprocessingSkipped { reason: String },
    SkewCorrected { angle_degrees: f32 },
    EmptyText,
}

/// One recognized token with its engine confidence in [0,1]
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub confidence: f32,
}

/// Raw OCR result from the engine
#[derive(Debug, Clone)]
pub struct OcrPage {
    pub text: String,
    pub tokens: Vec<OcrToken>,
}

/// OCR engine failures. Only `Unavailable` is worth retrying.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    #[error("OCR could not read the image: {0}")]
    Unreadable(String),
}

/// OCR engine abstraction (allows stubbing for tests)
pub trait OcrEngine: Send + Sync {
    /// Recognize text in an encoded image (PNG, JPEG, TIFF).
    fn recognize(&self, image_bytes: &[u8]) -> Result<OcrPage, OcrError>;
}

/// PDF text-layer extraction abstraction
pub trait PdfTextLayer: Send + Sync {
    /// Text of each page, in page order.
    fn page_texts(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError>;
}

/// Renders one PDF page (0-based) to encoded image bytes for OCR
pub trait PdfPageRenderer: Send + Sync {
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError>;
}
