use std::path::PathBuf;
use std::time::Duration;

use super::artifacts::extract_artifacts;
use super::confidence::{
    compute_overall_confidence, low_confidence_warnings, mean_token_confidence,
    NATIVE_TEXT_CONFIDENCE,
};
use super::docx::extract_docx_text;
use super::language_detect::detect_language;
use super::preprocess::OcrPreprocessor;
use super::sanitize::sanitize_extracted_text;
use super::spool::PageSpool;
use super::types::{
    ExtractedText, ExtractionMethod, ExtractionWarning, OcrEngine, OcrError, OcrPage, PageText,
    PdfPageRenderer, PdfTextLayer,
};
use super::ExtractionError;
use crate::config::PipelineConfig;
use crate::models::{DocumentFormat, SourceDocument};
use crate::pipeline::import::signature_matches;

/// Knobs the extractor reads from the pipeline configuration.
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub min_native_text_len: usize,
    pub render_dpi: u32,
    pub deskew: bool,
    pub ocr_retries: u32,
    pub ocr_retry_backoff: Duration,
    pub scratch_dir: Option<PathBuf>,
}

impl ExtractorSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            min_native_text_len: config.min_native_text_len,
            render_dpi: config.render_dpi,
            deskew: config.deskew,
            ocr_retries: config.ocr_retries,
            ocr_retry_backoff: Duration::from_millis(config.ocr_retry_backoff_ms),
            scratch_dir: config.scratch_dir.clone(),
        }
    }
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Pages plus the method that produced them, before sanitizing.
struct RawExtraction {
    method: ExtractionMethod,
    pages: Vec<PageText>,
    warnings: Vec<ExtractionWarning>,
}

/// Text extraction for every supported format.
/// OCR and PDF access go through trait objects so tests can stub them.
pub struct DocumentExtractor {
    ocr_engine: Box<dyn OcrEngine>,
    text_layer: Box<dyn PdfTextLayer>,
    renderer: Box<dyn PdfPageRenderer>,
    preprocessor: OcrPreprocessor,
    settings: ExtractorSettings,
}

impl DocumentExtractor {
    pub fn new(
        ocr_engine: Box<dyn OcrEngine>,
        text_layer: Box<dyn PdfTextLayer>,
        renderer: Box<dyn PdfPageRenderer>,
        settings: ExtractorSettings,
    ) -> Self {
        Self {
            ocr_engine,
            text_layer,
            renderer,
            preprocessor: OcrPreprocessor::new(settings.deskew),
            settings,
        }
    }

    pub fn extract(&self, doc: &SourceDocument) -> Result<ExtractedText, ExtractionError> {
        tracing::debug!(
            file = %doc.original_filename,
            format = doc.format.as_str(),
            size = doc.bytes.len(),
            "Starting text extraction"
        );

        if !signature_matches(&doc.bytes, doc.format) {
            return Err(ExtractionError::CorruptInput(format!(
                "content does not look like {}",
                doc.format.as_str()
            )));
        }

        let raw = match doc.format {
            DocumentFormat::Pdf => self.extract_pdf(&doc.bytes)?,
            DocumentFormat::Docx => single_page(
                ExtractionMethod::DocxText,
                extract_docx_text(&doc.bytes)?,
            ),
            DocumentFormat::Jpeg | DocumentFormat::Png | DocumentFormat::Tiff => {
                let (page, warnings) = self.ocr_page(&doc.bytes, 1)?;
                RawExtraction {
                    method: ExtractionMethod::Ocr,
                    pages: vec![page],
                    warnings,
                }
            }
            DocumentFormat::PlainText => {
                let text = std::str::from_utf8(&doc.bytes)
                    .map_err(|e| ExtractionError::CorruptInput(format!("not UTF-8: {e}")))?;
                single_page(
                    ExtractionMethod::PlainText,
                    text.trim_start_matches('\u{feff}').to_string(),
                )
            }
        };

        let RawExtraction {
            method,
            mut pages,
            mut warnings,
        } = raw;

        for page in &mut pages {
            page.text = sanitize_extracted_text(&page.text);
        }

        let text = pages
            .iter()
            .map(|p| p.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        let confidence = compute_overall_confidence(&pages, method);
        warnings.extend(low_confidence_warnings(&pages));
        if text.is_empty() {
            warnings.push(ExtractionWarning::EmptyText);
        }

        let artifacts = extract_artifacts(&text);
        let language_detected = (!text.is_empty()).then(|| detect_language(&text));

        tracing::info!(
            file = %doc.original_filename,
            method = method.as_str(),
            pages = pages.len(),
            confidence,
            language = ?language_detected,
            text_length = text.len(),
            warnings = warnings.len(),
            "Text extraction complete"
        );

        Ok(ExtractedText {
            text,
            method,
            confidence,
            pages,
            artifacts,
            language_detected,
            warnings,
        })
    }

    /// Text layer first; OCR every page when the layer is too thin.
    fn extract_pdf(&self, bytes: &[u8]) -> Result<RawExtraction, ExtractionError> {
        let layer = self.text_layer.page_texts(bytes)?;
        if layer.is_empty() {
            return Err(ExtractionError::CorruptInput("PDF has no pages".into()));
        }

        let native_len: usize = layer.iter().map(|p| p.trim().chars().count()).sum();
        let native_pages = || RawExtraction {
            method: ExtractionMethod::NativeText,
            pages: layer
                .iter()
                .enumerate()
                .map(|(i, text)| PageText {
                    page_number: i + 1,
                    confidence: if text.trim().is_empty() {
                        0.0
                    } else {
                        NATIVE_TEXT_CONFIDENCE
                    },
                    text: text.clone(),
                    ocr: false,
                })
                .collect(),
            warnings: Vec::new(),
        };

        if native_len >= self.settings.min_native_text_len {
            return Ok(native_pages());
        }

        tracing::debug!(
            native_len,
            threshold = self.settings.min_native_text_len,
            pages = layer.len(),
            "Text layer too thin, falling back to OCR"
        );

        // Spool dropped on every exit path below
        let mut spool = PageSpool::create(self.settings.scratch_dir.as_deref())?;
        let mut rendered = Vec::with_capacity(layer.len());
        for index in 0..layer.len() {
            match self
                .renderer
                .render_page(bytes, index, self.settings.render_dpi)
            {
                Ok(image) => {
                    spool.push(&image)?;
                    rendered.push(true);
                }
                Err(e) => {
                    tracing::debug!(page = index + 1, error = %e, "No page image, keeping text layer");
                    rendered.push(false);
                }
            }
        }

        if spool.is_empty() {
            return Ok(native_pages());
        }

        let mut pages = Vec::with_capacity(layer.len());
        let mut warnings = Vec::new();
        let mut spooled = 0;
        for (index, has_image) in rendered.into_iter().enumerate() {
            if has_image {
                let image = spool.read(spooled)?;
                spooled += 1;
                let (page, page_warnings) = self.ocr_page(&image, index + 1)?;
                pages.push(page);
                warnings.extend(page_warnings);
            } else {
                let text = layer[index].clone();
                let confidence = if text.trim().is_empty() {
                    0.0
                } else {
                    NATIVE_TEXT_CONFIDENCE
                };
                pages.push(PageText {
                    page_number: index + 1,
                    text,
                    confidence,
                    ocr: false,
                });
            }
        }

        Ok(RawExtraction {
            method: ExtractionMethod::Ocr,
            pages,
            warnings,
        })
    }

    fn ocr_page(
        &self,
        image_bytes: &[u8],
        page_number: usize,
    ) -> Result<(PageText, Vec<ExtractionWarning>), ExtractionError> {
        let prepared = self.preprocessor.prepare(image_bytes);
        let result = self.recognize_with_retry(&prepared.bytes)?;
        let confidence = mean_token_confidence(&result.tokens);

        tracing::debug!(
            page = page_number,
            tokens = result.tokens.len(),
            confidence,
            "Page OCR complete"
        );

        Ok((
            PageText {
                page_number,
                text: result.text,
                confidence,
                ocr: true,
            },
            prepared.warnings,
        ))
    }

    /// Retry only engine unavailability, with a fixed backoff.
    fn recognize_with_retry(&self, image_bytes: &[u8]) -> Result<OcrPage, ExtractionError> {
        let mut attempt = 0u32;
        loop {
            match self.ocr_engine.recognize(image_bytes) {
                Ok(page) => return Ok(page),
                Err(OcrError::Unavailable(reason)) if attempt < self.settings.ocr_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, %reason, "OCR engine unavailable, retrying");
                    std::thread::sleep(self.settings.ocr_retry_backoff);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn single_page(method: ExtractionMethod, text: String) -> RawExtraction {
    let confidence = if text.trim().is_empty() {
        0.0
    } else {
        NATIVE_TEXT_CONFIDENCE
    };
    RawExtraction {
        method,
        pages: vec![PageText {
            page_number: 1,
            text,
            confidence,
            ocr: false,
        }],
        warnings: Vec::new(),
    }
}
