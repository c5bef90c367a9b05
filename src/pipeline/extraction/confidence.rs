use super::types::{ExtractionMethod, ExtractionWarning, OcrToken, PageText};

/// Confidence reported for text read from a native text layer.
pub const NATIVE_TEXT_CONFIDENCE: f32 = 0.99;

/// OCR pages below this are flagged in the extraction warnings.
pub const LOW_PAGE_CONFIDENCE: f32 = 0.50;

/// Aggregate OCR confidence for one page: arithmetic mean of token
/// confidences, clamped to [0,1]. A page with no tokens scores 0.
pub fn mean_token_confidence(tokens: &[OcrToken]) -> f32 {
    if tokens.is_empty() {
        return 0.0;
    }
    let sum: f32 = tokens.iter().map(|t| t.confidence).sum();
    (sum / tokens.len() as f32).clamp(0.0, 1.0)
}

/// Compute overall document confidence from per-page results
pub fn compute_overall_confidence(pages: &[PageText], method: ExtractionMethod) -> f32 {
    if pages.is_empty() {
        return 0.0;
    }

    if method != ExtractionMethod::Ocr {
        let with_text = pages.iter().filter(|p| !p.text.trim().is_empty()).count();
        return NATIVE_TEXT_CONFIDENCE * with_text as f32 / pages.len() as f32;
    }

    // OCR (possibly mixed with native pages): weighted by text length
    let total_chars: usize = pages.iter().map(|p| p.text.len()).sum();
    if total_chars == 0 {
        return 0.0;
    }

    let weighted: f32 = pages
        .iter()
        .map(|p| p.confidence * p.text.len() as f32)
        .sum();

    (weighted / total_chars as f32).clamp(0.0, 1.0)
}

/// Flag OCR pages whose confidence is below `LOW_PAGE_CONFIDENCE`
pub fn low_confidence_warnings(pages: &[PageText]) -> Vec<ExtractionWarning> {
    pages
        .iter()
        .filter(|p| p.ocr && p.confidence < LOW_PAGE_CONFIDENCE)
        .map(|p| ExtractionWarning::LowConfidencePage {
            page: p.page_number,
            confidence: p.confidence,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(conf: f32) -> OcrToken {
        OcrToken {
            text: "w".into(),
            confidence: conf,
        }
    }

    fn page(text: &str, confidence: f32, ocr: bool) -> PageText {
        PageText {
            page_number: 1,
            text: text.to_string(),
            confidence,
            ocr,
        }
    }

    #[test]
    fn mean_is_arithmetic() {
        let conf = mean_token_confidence(&[token(0.9), token(0.5), token(0.7)]);
        assert!((conf - 0.7).abs() < 1e-6, "got {conf}");
    }

    #[test]
    fn mean_of_nothing_is_zero() {
        assert_eq!(mean_token_confidence(&[]), 0.0);
    }

    #[test]
    fn mean_is_clamped() {
        assert_eq!(mean_token_confidence(&[token(1.4), token(1.2)]), 1.0);
        assert_eq!(mean_token_confidence(&[token(-0.5)]), 0.0);
    }

    #[test]
    fn native_text_confidence_scales_with_pages_with_text() {
        let pages = vec![page("Page with text.", 0.99, false), page("", 0.0, false)];
        let conf = compute_overall_confidence(&pages, ExtractionMethod::NativeText);
        assert!((conf - 0.495).abs() < 0.01, "Expected ~0.495, got {conf}");
    }

    #[test]
    fn ocr_weighted_by_text_length() {
        let pages = vec![
            page(&"clear text ".repeat(10), 0.9, true),
            page("blur", 0.3, true),
        ];
        let conf = compute_overall_confidence(&pages, ExtractionMethod::Ocr);
        assert!(conf > 0.85, "Long clear page should dominate, got {conf}");
    }

    #[test]
    fn empty_ocr_document_has_zero_confidence() {
        let pages = vec![page("", 0.8, true)];
        assert_eq!(compute_overall_confidence(&pages, ExtractionMethod::Ocr), 0.0);
        assert_eq!(compute_overall_confidence(&[], ExtractionMethod::Ocr), 0.0);
    }

    #[test]
    fn only_low_ocr_pages_are_flagged() {
        let pages = vec![page("a", 0.3, true), page("b", 0.3, false), page("c", 0.9, true)];
        let warnings = low_confidence_warnings(&pages);
        assert_eq!(warnings.len(), 1);
    }
}
