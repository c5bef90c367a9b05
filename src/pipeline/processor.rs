//! Document pipeline: extract → encode → classify → organize.
//!
//! Every stage is reached through an injected dependency (OCR engine, PDF
//! backends, model, clock), so tests drive the whole flow with stubs.
//! Per-document failures come back as data; nothing here aborts a batch.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::batch::CancelFlag;
use crate::config::{ConfigError, PipelineConfig};
use crate::models::SourceDocument;
use crate::pipeline::classification::{ClassificationResult, ClassifyError};
use crate::pipeline::encoding::EncodeError;
use crate::pipeline::extraction::pdf::PdfTextExtractor;
use crate::pipeline::extraction::pdf_renderer::LopdfImageExtractor;
use crate::pipeline::extraction::{
    ArtifactKind, DocumentExtractor, ExtractedText, ExtractionError, ExtractionWarning,
    ExtractorSettings, OcrEngine,
};
use crate::pipeline::import::{content_hash, load_source, ImportError};
use crate::pipeline::model::{ensure_labels_configured, DocumentModel};
use crate::pipeline::organization::{
    Clock, OrganizationDecision, OrganizationError, Organizer, Routing,
};

/// Characters of extracted text echoed back in a filed outcome.
const TEXT_PREVIEW_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Encoding,
    Classification,
    Organization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedFormat,
    CorruptInput,
    ExtractionEngineUnavailable,
    EncoderNotLoaded,
    ClassifierNotLoaded,
    DimensionMismatch,
    OrganizationIoError,
}

/// A stage error reduced to what the caller reports.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub detail: String,
}

impl From<ExtractionError> for StageFailure {
    fn from(e: ExtractionError) -> Self {
        let kind = match &e {
            ExtractionError::CorruptInput(_) => FailureKind::CorruptInput,
            ExtractionError::EngineUnavailable(_) => FailureKind::ExtractionEngineUnavailable,
        };
        Self {
            stage: Stage::Extraction,
            kind,
            detail: e.to_string(),
        }
    }
}

/// Loading happens before extraction and is reported as part of it.
impl From<ImportError> for StageFailure {
    fn from(e: ImportError) -> Self {
        let kind = match &e {
            ImportError::UnsupportedFormat(_) | ImportError::FileTooLarge { .. } => {
                FailureKind::UnsupportedFormat
            }
            ImportError::Io { .. } => FailureKind::CorruptInput,
        };
        Self {
            stage: Stage::Extraction,
            kind,
            detail: e.to_string(),
        }
    }
}

impl From<EncodeError> for StageFailure {
    fn from(e: EncodeError) -> Self {
        let kind = match e {
            EncodeError::EncoderNotLoaded => FailureKind::EncoderNotLoaded,
        };
        Self {
            stage: Stage::Encoding,
            kind,
            detail: e.to_string(),
        }
    }
}

impl From<ClassifyError> for StageFailure {
    fn from(e: ClassifyError) -> Self {
        let kind = match e {
            ClassifyError::ClassifierNotLoaded => FailureKind::ClassifierNotLoaded,
            ClassifyError::DimensionMismatch { .. } => FailureKind::DimensionMismatch,
        };
        Self {
            stage: Stage::Classification,
            kind,
            detail: e.to_string(),
        }
    }
}

impl From<OrganizationError> for StageFailure {
    fn from(e: OrganizationError) -> Self {
        Self {
            stage: Stage::Organization,
            kind: FailureKind::OrganizationIoError,
            detail: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Extraction stage summary.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub method: String,
    pub confidence: f32,
    pub page_count: usize,
    pub text_length: usize,
    pub language: Option<String>,
    pub warnings: Vec<ExtractionWarning>,
}

impl From<&ExtractedText> for ExtractionSummary {
    fn from(extracted: &ExtractedText) -> Self {
        Self {
            method: extracted.method.as_str().to_string(),
            confidence: extracted.confidence,
            page_count: extracted.pages.len(),
            text_length: extracted.text.chars().count(),
            language: extracted.language_detected.clone(),
            warnings: extracted.warnings.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FiledDocument {
    pub document_id: Uuid,
    pub filename: String,
    pub classification: ClassificationResult,
    pub decision: OrganizationDecision,
    pub artifacts: BTreeMap<ArtifactKind, Vec<String>>,
    pub extraction: ExtractionSummary,
    /// SHA-256 of the source bytes, base64.
    pub content_hash: String,
    pub text_preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDocument {
    pub filename: String,
    pub stage: Stage,
    pub kind: FailureKind,
    pub detail: String,
}

/// How one document ended. Every processed document gets exactly one.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Filed(FiledDocument),
    Failed(FailedDocument),
}

impl PipelineOutcome {
    fn failed(filename: &str, failure: StageFailure) -> Self {
        Self::Failed(FailedDocument {
            filename: filename.to_string(),
            stage: failure.stage,
            kind: failure.kind,
            detail: failure.detail,
        })
    }

    pub fn filename(&self) -> &str {
        match self {
            Self::Filed(f) => &f.filename,
            Self::Failed(f) => &f.filename,
        }
    }

    pub fn routing(&self) -> Option<Routing> {
        match self {
            Self::Filed(f) => Some(f.decision.routing),
            Self::Failed(_) => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Filed(_) => None,
            Self::Failed(f) => Some(f.kind),
        }
    }
}

/// Outcomes in input order, plus the documents cancellation kept from starting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<PipelineOutcome>,
    pub skipped: Vec<String>,
}

impl BatchReport {
    pub fn filed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PipelineOutcome::Filed(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.filed_count()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Pipeline {
    extractor: DocumentExtractor,
    model: Arc<dyn DocumentModel>,
    organizer: Organizer,
    workers: usize,
}

impl Pipeline {
    pub fn new(
        extractor: DocumentExtractor,
        model: Arc<dyn DocumentModel>,
        organizer: Organizer,
    ) -> Self {
        Self {
            extractor,
            model,
            organizer,
            workers: 1,
        }
    }

    /// Maximum documents in flight for the parallel batch.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Validate the configuration and wire the production PDF backends.
    /// Fails once, before any document, on a bad config or model.
    pub fn from_config(
        config: &PipelineConfig,
        ocr_engine: Box<dyn OcrEngine>,
        model: Arc<dyn DocumentModel>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        config.ensure_destination_writable()?;
        ensure_labels_configured(model.as_ref(), &config.categories)?;

        let extractor = DocumentExtractor::new(
            ocr_engine,
            Box::new(PdfTextExtractor),
            Box::new(LopdfImageExtractor),
            ExtractorSettings::from_config(config),
        );
        let organizer = Organizer::from_config(config, clock);

        tracing::info!(
            destination = %config.destination_root.display(),
            workers = config.workers,
            high = config.high_threshold,
            low = config.low_threshold,
            "Pipeline ready"
        );
        Ok(Self::new(extractor, model, organizer).with_workers(config.workers))
    }

    /// Run one document through every stage, stopping at the first failure.
    pub fn process(&self, doc: &SourceDocument) -> PipelineOutcome {
        let document_id = Uuid::new_v4();
        tracing::info!(%document_id, file = %doc.original_filename, "Processing document");

        match self.run(document_id, doc) {
            Ok(filed) => PipelineOutcome::Filed(filed),
            Err(failure) => {
                tracing::warn!(
                    %document_id,
                    file = %doc.original_filename,
                    stage = ?failure.stage,
                    kind = ?failure.kind,
                    detail = %failure.detail,
                    "Document failed"
                );
                PipelineOutcome::failed(&doc.original_filename, failure)
            }
        }
    }

    /// Load a file from disk, then `process` it.
    pub fn process_path(&self, path: &Path) -> PipelineOutcome {
        match load_source(path) {
            Ok(doc) => self.process(&doc),
            Err(e) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                tracing::warn!(file = %filename, error = %e, "Could not load document");
                PipelineOutcome::failed(&filename, e.into())
            }
        }
    }

    /// Sequential batch. Cancellation is checked before each document.
    pub fn process_batch(&self, docs: &[SourceDocument], cancel: &CancelFlag) -> BatchReport {
        let mut report = BatchReport::default();
        for (i, doc) in docs.iter().enumerate() {
            if cancel.is_cancelled() {
                report.skipped = docs[i..]
                    .iter()
                    .map(|d| d.original_filename.clone())
                    .collect();
                tracing::info!(skipped = report.skipped.len(), "Batch cancelled");
                break;
            }
            report.outcomes.push(self.process(doc));
        }
        report
    }

    fn run(&self, document_id: Uuid, doc: &SourceDocument) -> Result<FiledDocument, StageFailure> {
        let extracted = self.extractor.extract(doc)?;
        let features = self.model.vectorize(&extracted.text)?;
        let classification = self.model.predict(&features)?;
        let decision = self.organizer.organize(doc, &classification)?;

        Ok(FiledDocument {
            document_id,
            filename: doc.original_filename.clone(),
            extraction: ExtractionSummary::from(&extracted),
            text_preview: extracted.text.chars().take(TEXT_PREVIEW_CHARS).collect(),
            artifacts: extracted.artifacts,
            content_hash: content_hash(&doc.bytes),
            classification,
            decision,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
