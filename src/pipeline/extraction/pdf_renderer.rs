//! Page images for scanned PDFs.
//!
//! A scanned page is a single image XObject drawn over the whole media box.
//! We pull the largest image off the page and hand it to OCR as PNG. Scans
//! finer than the requested DPI are scaled down to it; coarser ones are kept.

use image::imageops::FilterType;
use image::{GenericImageView, ImageOutputFormat};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::types::PdfPageRenderer;
use super::ExtractionError;

pub struct LopdfImageExtractor;

impl PdfPageRenderer for LopdfImageExtractor {
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        let doc = Document::load_mem(pdf_bytes)
            .map_err(|e| corrupt(format!("cannot parse PDF: {e}")))?;

        let page_ids: Vec<ObjectId> = doc.page_iter().collect();
        let &page_id = page_ids.get(page_index).ok_or_else(|| {
            corrupt(format!(
                "page {} not found (PDF has {} pages)",
                page_index + 1,
                page_ids.len()
            ))
        })?;

        let raw = largest_page_image(&doc, page_id)?;
        let mut img = image::load_from_memory(&raw)
            .map_err(|e| corrupt(format!("page image does not decode: {e}")))?;

        if let Some((max_w, max_h)) = page_pixel_bounds(&doc, page_id, dpi) {
            let (w, h) = img.dimensions();
            if w > max_w || h > max_h {
                tracing::debug!(page = page_index + 1, from = ?(w, h), dpi, "Scaling page image down");
                img = img.resize(max_w, max_h, FilterType::Triangle);
            }
        }

        let png = encode_png(&img)?;
        tracing::debug!(
            page = page_index + 1,
            raw_size = raw.len(),
            png_size = png.len(),
            "Page image pulled from PDF"
        );
        Ok(png)
    }
}

/// Pixel size of the page's /MediaBox at `dpi`. None when the box is missing
/// or degenerate.
fn page_pixel_bounds(doc: &Document, page_id: ObjectId, dpi: u32) -> Option<(u32, u32)> {
    let page = doc.get_dictionary(page_id).ok()?;
    let media_box = resolve(doc, page.get(b"MediaBox").ok()?).as_array().ok()?;
    let coords: Vec<f64> = media_box
        .iter()
        .filter_map(|o| match resolve(doc, o) {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r as f64),
            _ => None,
        })
        .collect();
    let [x0, y0, x1, y1] = coords[..] else {
        return None;
    };

    let to_px = |points: f64| (points.abs() / 72.0 * dpi as f64).round() as u32;
    match (to_px(x1 - x0), to_px(y1 - y0)) {
        (0, _) | (_, 0) => None,
        bounds => Some(bounds),
    }
}

fn corrupt(msg: String) -> ExtractionError {
    ExtractionError::CorruptInput(msg)
}

fn encode_png(img: &image::DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(|e| corrupt(format!("PNG encode failed: {e}")))?;
    Ok(buf.into_inner())
}

/// Page dict → /Resources → /XObject → every /Subtype /Image stream.
/// The largest payload is taken to be the page scan.
fn largest_page_image(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, ExtractionError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| corrupt(format!("page object: {e}")))?;

    let resources = dict_entry(doc, page, b"Resources")?;
    let xobjects = dict_entry(doc, resources, b"XObject")?;

    let mut largest: Option<Vec<u8>> = None;
    for (_name, entry) in xobjects.iter() {
        let stream = match resolve(doc, entry) {
            Object::Stream(s) => s,
            _ => continue,
        };
        if !is_image(&stream.dict) {
            continue;
        }

        let bytes = image_bytes(doc, stream)?;
        if largest.as_ref().map_or(true, |prev| bytes.len() > prev.len()) {
            largest = Some(bytes);
        }
    }

    largest.ok_or_else(|| corrupt("no image on page".into()))
}

fn is_image(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image")
}

fn has_filter(dict: &Dictionary, name: &[u8]) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => n == name,
        Ok(Object::Array(arr)) => arr
            .iter()
            .any(|o| matches!(o, Object::Name(n) if n == name)),
        _ => false,
    }
}

fn image_bytes(doc: &Document, stream: &Stream) -> Result<Vec<u8>, ExtractionError> {
    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    // DCTDecode streams are JPEG files; some Flate streams wrap a whole PNG or TIFF
    if has_filter(&stream.dict, b"DCTDecode") || image::load_from_memory(&content).is_ok() {
        return Ok(content);
    }

    raw_pixels_to_png(doc, &stream.dict, &content)
}

/// Rebuild an image from raw samples using /Width, /Height and /ColorSpace.
fn raw_pixels_to_png(
    doc: &Document,
    dict: &Dictionary,
    samples: &[u8],
) -> Result<Vec<u8>, ExtractionError> {
    let width = int_entry(dict, b"Width")? as u32;
    let height = int_entry(dict, b"Height")? as u32;
    let bpc = int_entry(dict, b"BitsPerComponent").unwrap_or(8) as u32;
    if bpc != 8 {
        return Err(corrupt(format!("unsupported bits per component: {bpc}")));
    }

    let channels = channel_count(doc, dict);
    let expected = (width * height * channels) as usize;
    if samples.len() < expected {
        return Err(corrupt(format!(
            "pixel buffer too small: {} bytes, expected {expected}",
            samples.len()
        )));
    }
    let samples = samples[..expected].to_vec();

    let img = match channels {
        1 => image::GrayImage::from_raw(width, height, samples).map(image::DynamicImage::ImageLuma8),
        3 => image::RgbImage::from_raw(width, height, samples).map(image::DynamicImage::ImageRgb8),
        4 => image::RgbaImage::from_raw(width, height, samples).map(image::DynamicImage::ImageRgba8),
        n => return Err(corrupt(format!("unsupported channel count: {n}"))),
    }
    .ok_or_else(|| corrupt("pixel buffer does not match dimensions".into()))?;

    encode_png(&img)
}

fn channel_count(doc: &Document, dict: &Dictionary) -> u32 {
    let cs = match dict.get(b"ColorSpace") {
        Ok(obj) => resolve(doc, obj),
        Err(_) => return 3,
    };

    match cs {
        Object::Name(n) => match n.as_slice() {
            b"DeviceGray" => 1,
            b"DeviceCMYK" => 4,
            _ => 3,
        },
        Object::Array(arr) => match arr.first() {
            Some(Object::Name(n)) if n == b"Indexed" => 1,
            Some(Object::Name(n)) if n == b"ICCBased" => match arr.get(1).map(|o| resolve(doc, o)) {
                Some(Object::Stream(s)) => int_entry(&s.dict, b"N").unwrap_or(3) as u32,
                _ => 3,
            },
            _ => 3,
        },
        _ => 3,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn dict_entry<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Result<&'a Dictionary, ExtractionError> {
    let name = String::from_utf8_lossy(key);
    let obj = dict
        .get(key)
        .map_err(|_| corrupt(format!("missing /{name}")))?;
    resolve(doc, obj)
        .as_dict()
        .map_err(|_| corrupt(format!("/{name} is not a dictionary")))
}

fn int_entry(dict: &Dictionary, key: &[u8]) -> Result<i64, ExtractionError> {
    let name = String::from_utf8_lossy(key);
    dict.get(key)
        .map_err(|_| corrupt(format!("missing /{name} in image dictionary")))?
        .as_i64()
        .map_err(|_| corrupt(format!("/{name} is not an integer")))
}
