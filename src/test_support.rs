//! Fixture builders shared by unit tests: real PDFs, DOCX archives and
//! images generated in memory, plus model bundles and stubs.

use std::io::{Cursor, Write};

use image::{DynamicImage, GenericImageView, ImageOutputFormat, Rgb, RgbImage};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::models::Category;
use crate::pipeline::classification::{ClassificationResult, ClassifyError};
use crate::pipeline::encoding::{EncodeError, FeatureVector};
use crate::pipeline::model::DocumentModel;

/// Text-layer PDF, one page, one line of Helvetica per entry.
pub fn make_text_pdf(lines: &[&str]) -> Vec<u8> {
    let mut content = b"BT /F1 12 Tf 72 720 Td ".to_vec();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            content.extend_from_slice(b" 0 -16 Td ");
        }
        content.push(b'(');
        content.extend(pdf_string_bytes(line));
        content.extend_from_slice(b") Tj");
    }
    content.extend_from_slice(b" ET");

    let mut doc = Document::with_version("1.4");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let resources = dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    };

    finish_pdf(doc, vec![(content_id, resources)])
}

/// Scanned PDF: one JPEG per page drawn over the whole media box, no text layer.
pub fn make_scanned_pdf(jpeg_pages: &[Vec<u8>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.4");
    let mut pages = Vec::new();

    for jpeg in jpeg_pages {
        let (width, height) = image::load_from_memory(jpeg).unwrap().dimensions();
        let mut img_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg.clone(),
        );
        img_stream.allows_compression = false;
        let img_id = doc.add_object(img_stream);

        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"q 612 0 0 792 0 0 cm /Img1 Do Q".to_vec(),
        ));
        let resources = dictionary! {
            "XObject" => dictionary! { "Img1" => img_id },
        };
        pages.push((content_id, resources));
    }

    finish_pdf(doc, pages)
}

fn finish_pdf(mut doc: Document, pages: Vec<(ObjectId, lopdf::Dictionary)>) -> Vec<u8> {
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for (content_id, resources) in pages {
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// WinAnsi bytes for a PDF literal string, with delimiters escaped.
fn pdf_string_bytes(text: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(c as u8);
            }
            c if (c as u32) < 256 => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out
}

pub fn make_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let v = if (x / 8 + y / 8) % 2 == 0 { 40 } else { 220 };
        Rgb([v, v, v])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageOutputFormat::Jpeg(85))
        .unwrap();
    buf.into_inner()
}

pub fn make_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(color));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    buf.into_inner()
}

pub fn make_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn make_docx_from_xml(document_xml: &str) -> Vec<u8> {
    make_zip(&[
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#,
        ),
        ("word/document.xml", document_xml),
    ])
}

/// Minimal DOCX with one single-run paragraph per entry.
pub fn make_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| {
            let escaped = p
                .replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;");
            format!(r#"<w:p><w:r><w:t xml:space="preserve">{escaped}</w:t></w:r></w:p>"#)
        })
        .collect();

    make_docx_from_xml(&format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    ))
}

// ═══════════════════════════════════════════
// Model fixtures
// ═══════════════════════════════════════════

/// Small valid bundle with French labels over an eight-term vocabulary:
/// two indicative words per category, a naive Bayes member and a
/// one-leaf forest.
pub fn sample_bundle() -> serde_json::Value {
    let words = [
        "contrat", "bail", "facture", "montant", "tribunal", "jugement", "rapport", "analyse",
    ];
    let vocabulary: serde_json::Map<String, serde_json::Value> = words
        .iter()
        .enumerate()
        .map(|(i, w)| (w.to_string(), i.into()))
        .collect();

    let own = 0.45f64.ln();
    let other = (0.1f64 / 6.0).ln();
    let feature_log_prob: Vec<Vec<f64>> = (0..4)
        .map(|class| {
            (0..words.len())
                .map(|j| if j / 2 == class { own } else { other })
                .collect()
        })
        .collect();

    serde_json::json!({
        "format_version": 1,
        "version": "test-1",
        "labels": ["contrat", "facture", "jugement", "rapport"],
        "encoder": {
            "vocabulary": vocabulary,
            "idf": vec![1.0; words.len()],
        },
        "classifier": {
            "n_features": words.len(),
            "members": [
                {
                    "weight": 2.0,
                    "model": {
                        "type": "naive_bayes",
                        "class_log_prior": vec![0.25f64.ln(); 4],
                        "feature_log_prob": feature_log_prob,
                    }
                },
                {
                    "weight": 0.5,
                    "model": {
                        "type": "random_forest",
                        "trees": [{"nodes": [{"node": "leaf", "value": [1.0, 1.0, 1.0, 1.0]}]}]
                    }
                }
            ]
        }
    })
}

/// Model stub: the first rule whose keyword appears in the text decides
/// the category and its exact confidence. The rest of the mass is spread
/// evenly over the other categories.
pub struct KeywordModel {
    rules: Vec<(&'static str, Category, f64)>,
}

impl KeywordModel {
    pub fn new(rules: &[(&'static str, Category, f64)]) -> Self {
        Self {
            rules: rules.to_vec(),
        }
    }
}

impl DocumentModel for KeywordModel {
    fn labels(&self) -> &[Category] {
        Category::ALL
    }

    fn vectorize(&self, text: &str) -> Result<FeatureVector, EncodeError> {
        let lowered = text.to_lowercase();
        let mut values = vec![0.0; self.rules.len()];
        if let Some(i) = self.rules.iter().position(|(k, _, _)| lowered.contains(k)) {
            values[i] = 1.0;
        }
        Ok(FeatureVector::new(values))
    }

    fn predict(&self, features: &FeatureVector) -> Result<ClassificationResult, ClassifyError> {
        if features.len() != self.rules.len() {
            return Err(ClassifyError::DimensionMismatch {
                expected: self.rules.len(),
                actual: features.len(),
            });
        }
        let labels = Category::ALL;
        let probabilities: Vec<f64> = match features.as_slice().iter().position(|v| *v > 0.0) {
            Some(i) => {
                let (_, category, confidence) = self.rules[i];
                let rest = (1.0 - confidence) / (labels.len() - 1) as f64;
                labels
                    .iter()
                    .map(|c| if *c == category { confidence } else { rest })
                    .collect()
            }
            None => vec![1.0 / labels.len() as f64; labels.len()],
        };
        Ok(ClassificationResult::from_probabilities(labels, &probabilities))
    }
}
