//! French vs English guess for extracted text.
//!
//! Keyword frequency plus a diacritic bonus. Returns Tesseract-style codes
//! so the result can be fed back as an OCR language hint.

const FRENCH_INDICATORS: &[&str] = &[
    "le ", "la ", "les ", "un ", "une ", "des ", "du ", "de ", "et ", "est ",
    "au ", "aux ", "pour ", "par ", "sur ", "dans ", "avec ", "qui ", "que ",
    "pas ", "ce ", "cette ", "entre ",
    // contracts, invoices, rulings
    "contrat", "facture", "montant", "société", "présent", "parties",
    "tribunal", "jugement", "arrêt", "attendu", "considérant", "article",
    "échéance", "règlement", "paiement", "prestataire",
    "d'", "l'", "n'", "s'", "qu'",
];

const ENGLISH_INDICATORS: &[&str] = &[
    "the ", "and ", "was ", "for ", "are ", "but ", "not ", "you ",
    "all ", "can ", "has ", "its ", "may ", "shall ", "who ", "been ",
    "from ", "have ", "this ", "that ", "with ", "they ", "will ",
    "agreement", "invoice", "amount", "payment", "court", "hereby",
    "party", "parties", "pursuant", "due ", "total",
];

/// Guess the primary language: "fra" or "eng".
/// Very short text and ties fall back to French.
pub fn detect_language(text: &str) -> String {
    if text.trim().chars().count() < 20 {
        return "fra".to_string();
    }

    let lower = text.to_lowercase();
    let french = count_indicators(&lower, FRENCH_INDICATORS) + count_french_diacritics(&lower);
    let english = count_indicators(&lower, ENGLISH_INDICATORS);

    if french >= english {
        "fra".to_string()
    } else {
        "eng".to_string()
    }
}

fn count_indicators(lower_text: &str, indicators: &[&str]) -> u32 {
    indicators
        .iter()
        .map(|ind| lower_text.matches(ind).count() as u32)
        .sum()
}

/// Every two French diacritics count as one indicator.
fn count_french_diacritics(lower_text: &str) -> u32 {
    let count = lower_text
        .chars()
        .filter(|c| {
            matches!(
                c,
                'é' | 'è' | 'ê' | 'ë' | 'ç' | 'ù' | 'û' | 'î' | 'ï' | 'ô' | 'à' | 'â' | 'œ'
            )
        })
        .count() as u32;
    count / 2
}
