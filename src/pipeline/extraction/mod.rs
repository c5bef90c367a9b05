pub mod artifacts;
pub mod confidence;
pub mod docx;
pub mod language_detect;
pub mod ocr;
pub mod orchestrator;
pub mod pdf;
pub mod pdf_renderer;
pub mod preprocess;
pub mod sanitize;
pub mod spool;
pub mod types;

pub use orchestrator::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Corrupt input: {0}")]
    CorruptInput(String),

    #[error("Extraction engine unavailable: {0}")]
    EngineUnavailable(String),
}

impl From<OcrError> for ExtractionError {
    fn from(e: OcrError) -> Self {
        match e {
            OcrError::Unavailable(msg) => Self::EngineUnavailable(msg),
            OcrError::Unreadable(msg) => Self::CorruptInput(msg),
        }
    }
}
