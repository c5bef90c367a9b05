use super::types::{OcrEngine, OcrError, OcrPage, OcrToken};

/// Bundled Tesseract OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct BundledTesseract {
    tessdata_dir: Option<std::path::PathBuf>,
    languages: String,
}

#[cfg(feature = "ocr")]
impl BundledTesseract {
    /// Initialize with an optional tessdata directory and a fixed language
    /// string (e.g. "fra+eng"). Each language needs its traineddata file.
    pub fn new(
        tessdata_dir: Option<&std::path::Path>,
        languages: &str,
    ) -> Result<Self, OcrError> {
        if let Some(dir) = tessdata_dir {
            for lang in languages.split('+') {
                let data = dir.join(format!("{lang}.traineddata"));
                if !data.exists() {
                    return Err(OcrError::Unavailable(format!(
                        "missing traineddata {}",
                        data.display()
                    )));
                }
            }
        }
        tracing::info!(languages, "Tesseract engine configured");
        Ok(Self {
            tessdata_dir: tessdata_dir.map(|d| d.to_path_buf()),
            languages: languages.to_string(),
        })
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for BundledTesseract {
    fn recognize(&self, image_bytes: &[u8]) -> Result<OcrPage, OcrError> {
        let datapath = match &self.tessdata_dir {
            Some(dir) => Some(
                dir.to_str()
                    .ok_or_else(|| OcrError::Unavailable("Invalid tessdata path".into()))?,
            ),
            None => None,
        };

        let tess = tesseract::Tesseract::new(datapath, Some(&self.languages))
            .map_err(|e| OcrError::Unavailable(format!("{e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| OcrError::Unreadable(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| OcrError::Unavailable(format!("{e:?}")))?;

        // TSV gives per-word confidence; fall back to the page mean per word.
        let tokens = match tess.get_tsv_text(0) {
            Ok(tsv) => parse_tsv_tokens(&tsv),
            Err(_) => {
                let mean = tess.mean_text_conf().max(0) as f32 / 100.0;
                text.split_whitespace()
                    .map(|w| OcrToken {
                        text: w.to_string(),
                        confidence: mean,
                    })
                    .collect()
            }
        };

        Ok(OcrPage { text, tokens })
    }
}

/// Engine returning the same text for every image. Used for dry runs and tests.
pub struct FixedOcrEngine {
    pub text: String,
    pub confidence: f32,
}

impl FixedOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

impl OcrEngine for FixedOcrEngine {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<OcrPage, OcrError> {
        let tokens = self
            .text
            .split_whitespace()
            .map(|w| OcrToken {
                text: w.to_string(),
                confidence: self.confidence,
            })
            .collect();

        Ok(OcrPage {
            text: self.text.clone(),
            tokens,
        })
    }
}

/// Stand-in when no OCR backend was compiled in. Image documents fail
/// with an engine-unavailable outcome instead of aborting the batch.
pub struct NoOcrEngine;

impl OcrEngine for NoOcrEngine {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<OcrPage, OcrError> {
        Err(OcrError::Unavailable(
            "built without the `ocr` feature".into(),
        ))
    }
}

/// Parse Tesseract TSV output into word tokens.
/// TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
/// Level 5 = individual word entries. Confidence is 0-100, scaled to 0.0-1.0.
pub fn parse_tsv_tokens(tsv: &str) -> Vec<OcrToken> {
    let mut tokens = Vec::new();

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = match fields[0].parse() {
            Ok(l) => l,
            Err(_) => continue,
        };
        if level != 5 {
            continue;
        }

        let conf: f32 = match fields[10].parse() {
            Ok(c) => c,
            Err(_) => continue,
        };

        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }

        // Tesseract reports -1 for words it can't score
        let confidence = (conf / 100.0).clamp(0.0, 1.0);

        tokens.push(OcrToken {
            text: word.to_string(),
            confidence,
        });
    }

    tokens
}
