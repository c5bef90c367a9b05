//! DOCX text: paragraphs and runs from `word/document.xml`.
//!
//! A DOCX is a zip archive of WordprocessingML parts. Body text lives in
//! `<w:t>` runs grouped under `<w:p>` paragraphs; no OCR is ever needed.

use std::io::{Cursor, Read};

use super::ExtractionError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extract the body text of a DOCX, one line per paragraph.
pub fn extract_docx_text(docx_bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(docx_bytes))
        .map_err(|e| ExtractionError::CorruptInput(format!("DOCX is not a zip archive: {e}")))?;

    let mut part = archive.by_name(DOCUMENT_PART).map_err(|e| {
        ExtractionError::CorruptInput(format!("DOCX has no {DOCUMENT_PART}: {e}"))
    })?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| ExtractionError::CorruptInput(format!("cannot read {DOCUMENT_PART}: {e}")))?;

    Ok(body_text(&xml))
}

/// Walk the XML tag by tag, keeping character data inside `<w:t>` only.
fn body_text(xml: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_run_text = false;
    let mut rest = xml;

    while let Some(open) = rest.find('<') {
        if in_run_text {
            current.push_str(&unescape(&rest[..open]));
        }
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        let tag = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];

        match tag_name(tag) {
            // `<w:t/>` is an empty run and opens nothing
            "w:t" => in_run_text = !tag.ends_with('/'),
            "/w:t" => in_run_text = false,
            "w:tab" => current.push('\t'),
            "w:br" | "w:cr" => current.push('\n'),
            "/w:p" => paragraphs.push(std::mem::take(&mut current)),
            // self-closing empty paragraph
            "w:p" if tag.ends_with('/') => paragraphs.push(String::new()),
            _ => {}
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs.join("\n")
}

fn tag_name(tag: &str) -> &str {
    let end = tag
        .find(|c: char| c.is_whitespace() || (c == '/' && !tag.starts_with('/')))
        .unwrap_or(tag.len());
    tag[..end].trim_end_matches('/')
}

fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        match after.find(';') {
            Some(semi) => {
                let entity = &after[1..semi];
                match decode_entity(entity) {
                    Some(c) => out.push(c),
                    None => out.push_str(&after[..=semi]),
                }
                rest = &after[semi + 1..];
            }
            None => {
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_docx, make_docx_from_xml};

    #[test]
    fn paragraphs_become_lines() {
        let docx = make_docx(&["Le présent contrat", "est conclu entre les parties."]);
        let text = extract_docx_text(&docx).unwrap();
        assert_eq!(text, "Le présent contrat\nest conclu entre les parties.");
    }

    #[test]
    fn runs_in_one_paragraph_are_concatenated() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Fact</w:t></w:r><w:r><w:t xml:space="preserve">ure n° </w:t></w:r><w:r><w:t>42</w:t></w:r></w:p></w:body></w:document>"#;
        let text = extract_docx_text(&make_docx_from_xml(xml)).unwrap();
        assert_eq!(text, "Facture n° 42");
    }

    #[test]
    fn entities_tabs_and_breaks() {
        let xml = "<w:p><w:r><w:t>A &amp; B &lt;SARL&gt;</w:t><w:tab/><w:t>&#233;t&#xE9;</w:t><w:br/><w:t>fin</w:t></w:r></w:p>";
        assert_eq!(body_text(xml), "A & B <SARL>\tété\nfin");
    }

    #[test]
    fn table_tags_are_not_text_runs() {
        let xml = "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>";
        assert_eq!(body_text(xml), "cell");
    }

    #[test]
    fn text_outside_runs_is_ignored() {
        let xml = "<w:p><w:pPr>style</w:pPr><w:r><w:t>kept</w:t></w:r></w:p>";
        assert_eq!(body_text(xml), "kept");
    }

    #[test]
    fn empty_run_does_not_capture_following_markup() {
        let xml = r#"<w:p><w:r><w:t/></w:r><w:r><w:instrText>PAGE</w:instrText></w:r><w:r><w:t xml:space="preserve"/></w:r><w:r><w:t>Total</w:t></w:r></w:p>"#;
        assert_eq!(body_text(xml), "Total");
    }

    #[test]
    fn unknown_entity_is_kept_verbatim() {
        assert_eq!(unescape("a &nbsp; b & c"), "a &nbsp; b & c");
    }

    #[test]
    fn not_a_zip_is_corrupt_input() {
        let result = extract_docx_text(b"PK but not really a zip");
        assert!(matches!(result, Err(ExtractionError::CorruptInput(_))));
    }

    #[test]
    fn zip_without_document_part_is_corrupt_input() {
        let docx = crate::test_support::make_zip(&[("word/styles.xml", "<w:styles/>")]);
        let result = extract_docx_text(&docx);
        assert!(matches!(result, Err(ExtractionError::CorruptInput(_))));
    }
}
