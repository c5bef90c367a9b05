use std::path::Path;

use crate::models::{DocumentFormat, SourceDocument};

use super::ImportError;

const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024; // 100MB

/// PDF headers may be preceded by junk; readers accept %PDF within the first 1KB.
const PDF_HEADER_WINDOW: usize = 1024;

/// Identify a format from magic bytes alone.
pub fn sniff_format(bytes: &[u8]) -> Option<DocumentFormat> {
    match bytes {
        [0x25, 0x50, 0x44, 0x46, ..] => Some(DocumentFormat::Pdf),
        [0x50, 0x4B, 0x03, 0x04, ..] => Some(DocumentFormat::Docx),
        [0xFF, 0xD8, 0xFF, ..] => Some(DocumentFormat::Jpeg),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(DocumentFormat::Png),
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Some(DocumentFormat::Tiff),
        _ if is_likely_text(bytes) => Some(DocumentFormat::PlainText),
        _ => None,
    }
}

/// Whether the bytes carry the signature of the declared format.
/// Plain text has no signature; its UTF-8 check happens at extraction.
pub fn signature_matches(bytes: &[u8], declared: DocumentFormat) -> bool {
    match declared {
        DocumentFormat::Pdf => {
            let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
            window.windows(4).any(|w| w == b"%PDF")
        }
        DocumentFormat::PlainText => true,
        other => sniff_format(bytes) == Some(other),
    }
}

/// Format declared by the file extension, if it names one we handle.
pub fn format_from_extension(path: &Path) -> Option<DocumentFormat> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|e| e.parse().ok())
}

/// Read a file into a `SourceDocument`. The extension declares the
/// format; files without a usable extension are sniffed.
pub fn load_source(path: &Path) -> Result<SourceDocument, ImportError> {
    let io_err = |source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let size = std::fs::metadata(path).map_err(io_err)?.len();
    if size > MAX_FILE_SIZE {
        return Err(ImportError::FileTooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            max_mb: MAX_FILE_SIZE / (1024 * 1024),
        });
    }

    let bytes = std::fs::read(path).map_err(io_err)?;
    let filename = sanitize_filename(&path.to_string_lossy());

    let format = match format_from_extension(path) {
        Some(format) => format,
        None if path.extension().is_some() => {
            return Err(ImportError::UnsupportedFormat(filename));
        }
        None => sniff_format(&bytes).ok_or_else(|| ImportError::UnsupportedFormat(filename.clone()))?,
    };

    tracing::debug!(file = %filename, format = format.as_str(), size, "Source loaded");
    Ok(SourceDocument::new(bytes, format, &filename).with_origin(path))
}

/// Valid UTF-8 (ignoring a cut-off final character) and mostly printable.
fn is_likely_text(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(4096)];
    if head.is_empty() {
        return false;
    }

    let text = match std::str::from_utf8(head) {
        Ok(t) => t,
        Err(e) if e.error_len().is_none() => {
            // truncated multi-byte sequence at the window edge
            match std::str::from_utf8(&head[..e.valid_up_to()]) {
                Ok(t) => t,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };

    let total = text.chars().count().max(1);
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    printable as f64 / total as f64 > 0.80
}

/// Strip path components and NULs, cap the length at 255 bytes.
pub fn sanitize_filename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");

    let mut clean = String::new();
    for c in name.chars().filter(|c| !matches!(c, '/' | '\\' | '\0')) {
        if clean.len() + c.len_utf8() > 255 {
            break;
        }
        clean.push(c);
    }

    if clean.is_empty() {
        "document".to_string()
    } else {
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_by_magic_bytes() {
        assert_eq!(sniff_format(b"%PDF-1.7\n"), Some(DocumentFormat::Pdf));
        assert_eq!(sniff_format(&[0x50, 0x4B, 0x03, 0x04, 0x14]), Some(DocumentFormat::Docx));
        assert_eq!(sniff_format(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(DocumentFormat::Jpeg));
        assert_eq!(
            sniff_format(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            Some(DocumentFormat::Png)
        );
        assert_eq!(sniff_format(&[0x49, 0x49, 0x2A, 0x00, 0x08]), Some(DocumentFormat::Tiff));
        assert_eq!(sniff_format(&[0x4D, 0x4D, 0x00, 0x2A, 0x00]), Some(DocumentFormat::Tiff));
    }

    #[test]
    fn sniff_text_and_binary() {
        assert_eq!(
            sniff_format("Facture n° 12 du 15/01/2024".as_bytes()),
            Some(DocumentFormat::PlainText)
        );
        assert_eq!(sniff_format(&[0x4D, 0x5A, 0x90, 0x00, 0x03, 0x00]), None);
        assert_eq!(sniff_format(&[]), None);
    }

    #[test]
    fn text_cut_inside_a_multibyte_char_is_still_text() {
        let mut bytes = "é".repeat(2047).into_bytes();
        bytes.push(b'a'); // 4095 bytes, so the 4096-byte window splits the next é
        bytes.extend_from_slice("éé".as_bytes());
        assert!(is_likely_text(&bytes));
    }

    #[test]
    fn declared_pdf_needs_header() {
        assert!(signature_matches(b"%PDF-1.4 ...", DocumentFormat::Pdf));
        assert!(signature_matches(b"\r\n%PDF-1.4 ...", DocumentFormat::Pdf));
        assert!(!signature_matches(b"hello world", DocumentFormat::Pdf));
    }

    #[test]
    fn declared_image_must_match_its_own_signature() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00];
        assert!(signature_matches(&jpeg, DocumentFormat::Jpeg));
        assert!(!signature_matches(&jpeg, DocumentFormat::Png));
        assert!(!signature_matches(&jpeg, DocumentFormat::Docx));
    }

    #[test]
    fn extension_declares_format() {
        assert_eq!(format_from_extension(Path::new("a/scan.JPG")), Some(DocumentFormat::Jpeg));
        assert_eq!(format_from_extension(Path::new("x.tif")), Some(DocumentFormat::Tiff));
        assert_eq!(format_from_extension(Path::new("notes.txt")), Some(DocumentFormat::PlainText));
        assert_eq!(format_from_extension(Path::new("sheet.xlsx")), None);
        assert_eq!(format_from_extension(Path::new("noext")), None);
    }

    #[test]
    fn load_source_uses_extension_and_records_origin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facture.txt");
        std::fs::write(&path, "Facture").unwrap();

        let doc = load_source(&path).unwrap();
        assert_eq!(doc.format, DocumentFormat::PlainText);
        assert_eq!(doc.original_filename, "facture.txt");
        assert_eq!(doc.bytes, b"Facture");
        assert_eq!(doc.origin.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn load_source_keeps_declared_format_even_if_bytes_disagree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("misleading.pdf");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0, 0x00]).unwrap();
        let doc = load_source(&path).unwrap();
        assert_eq!(doc.format, DocumentFormat::Pdf);
        assert!(!signature_matches(&doc.bytes, doc.format));
    }

    #[test]
    fn load_source_sniffs_extensionless_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan");
        std::fs::write(&path, [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]).unwrap();
        assert_eq!(load_source(&path).unwrap().format, DocumentFormat::Png);
    }

    #[test]
    fn load_source_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budget.xlsx");
        std::fs::write(&path, [0x50, 0x4B, 0x03, 0x04]).unwrap();
        assert!(matches!(
            load_source(&path),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn load_source_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_source(&dir.path().join("absent.pdf")),
            Err(ImportError::Io { .. })
        ));
    }

    #[test]
    fn oversized_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.pdf");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(101 * 1024 * 1024).unwrap();
        assert!(matches!(
            load_source(&path),
            Err(ImportError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn sanitize_path_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(""), "document");
        assert_eq!(sanitize_filename("file\0name.pdf"), "filename.pdf");
        assert_eq!(sanitize_filename("contrat bail (1).pdf"), "contrat bail (1).pdf");
    }

    #[test]
    fn sanitize_caps_bytes_not_chars() {
        let clean = sanitize_filename(&"é".repeat(200));
        assert_eq!(clean.len(), 254);
        assert_eq!(clean.chars().count(), 127);
    }
}
