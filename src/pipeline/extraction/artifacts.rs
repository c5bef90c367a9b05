use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::types::ArtifactKind;

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:\d{4}-\d{2}-\d{2}|\d{1,2}[/-]\d{1,2}[/-]\d{4}|\d{1,2}(?:er)?\s+(?:janvier|f[ée]vrier|mars|avril|mai|juin|juillet|ao[ûu]t|septembre|octobre|novembre|d[ée]cembre)\s+\d{4})\b",
    )
    .unwrap()
});

// "1 250,00 €", "EUR 300", "12500 euros"
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:€|\beur(?:os?)?\b)\s*(?:\d{1,3}(?:[ \u{a0}.]\d{3})+|\d+)(?:,\d{2})?|\b(?:\d{1,3}(?:[ \u{a0}.]\d{3})+|\d+)(?:,\d{2})?\s*(?:€|euros?\b|eur\b)",
    )
    .unwrap()
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

// French numbers: +33 or leading 0, then nine digits in pairs
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+33\s?|\b0)[1-9](?:[\s.-]?\d{2}){4}\b").unwrap()
});

/// Pick dates, euro amounts, emails and French phone numbers out of text.
/// Matches keep their order of first appearance; duplicates are dropped.
/// Kinds with no match are absent from the map.
pub fn extract_artifacts(text: &str) -> BTreeMap<ArtifactKind, Vec<String>> {
    let patterns: [(ArtifactKind, &Regex); 4] = [
        (ArtifactKind::Date, &DATE_RE),
        (ArtifactKind::Amount, &AMOUNT_RE),
        (ArtifactKind::Email, &EMAIL_RE),
        (ArtifactKind::Phone, &PHONE_RE),
    ];

    let mut artifacts = BTreeMap::new();
    for (kind, re) in patterns {
        let mut found: Vec<String> = Vec::new();
        for m in re.find_iter(text) {
            let value = m.as_str().trim().to_string();
            if !found.contains(&value) {
                found.push(value);
            }
        }
        if !found.is_empty() {
            artifacts.insert(kind, found);
        }
    }
    artifacts
}
