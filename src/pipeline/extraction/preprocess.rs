//! Image cleanup ahead of OCR.
//!
//! Steps, in order: EXIF orientation, grayscale, median denoise (noisy
//! scans only), linear contrast stretch, optional deskew, Otsu binarization.
//! The whole pass is best effort: if anything fails the OCR engine gets the
//! original bytes and the extraction carries a `PreprocessingSkipped` warning.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma};
use thiserror::Error;
use tracing::debug;

use super::types::ExtractionWarning;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Upper bound on encoded input, guards against decompression bombs.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// Smallest valid PNG is ~67 bytes.
const MIN_IMAGE_BYTES: usize = 67;

/// Noise score (std dev of smooth blocks) above which the median filter runs.
/// Clean scans score 2-8, photocopies 15-30, faxes 25-50.
const NOISE_THRESHOLD: f32 = 12.0;

/// Share of pixels clipped at each end of the histogram by the stretch.
const STRETCH_CLIP: f64 = 0.01;

/// Gray level below which a pixel counts as ink for skew detection.
const INK_THRESHOLD: u8 = 128;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("image data too small to be valid")]
    TooSmall,

    #[error("image data exceeds {}MB", MAX_IMAGE_BYTES / (1024 * 1024))]
    TooLarge,

    #[error("cannot decode image: {0}")]
    Decode(String),

    #[error("cannot encode PNG: {0}")]
    Encode(String),
}

/// Bytes to hand to the OCR engine plus whatever the pass noticed.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    pub warnings: Vec<ExtractionWarning>,
}

#[derive(Debug, Clone, Copy)]
pub struct OcrPreprocessor {
    deskew: bool,
}

impl OcrPreprocessor {
    pub fn new(deskew: bool) -> Self {
        Self { deskew }
    }

    /// Never fails: on error the original bytes go through untouched.
    pub fn prepare(&self, raw: &[u8]) -> PreparedImage {
        match self.try_prepare(raw) {
            Ok(prepared) => prepared,
            Err(e) => {
                debug!(error = %e, "Preprocessing skipped, OCR runs on original image");
                PreparedImage {
                    bytes: raw.to_vec(),
                    warnings: vec![ExtractionWarning::PreprocessingSkipped {
                        reason: e.to_string(),
                    }],
                }
            }
        }
    }

    fn try_prepare(&self, raw: &[u8]) -> Result<PreparedImage, PreprocessError> {
        validate_image_bytes(raw)?;

        let decoded =
            image::load_from_memory(raw).map_err(|e| PreprocessError::Decode(e.to_string()))?;
        let oriented = apply_orientation(decoded, read_exif_orientation(raw));

        let mut gray = oriented.to_luma8();
        let mut warnings = Vec::new();

        let noise = assess_noise_level(&gray);
        if noise >= NOISE_THRESHOLD {
            debug!(noise, "Noisy scan, applying median filter");
            gray = median_filter_3x3(&gray);
        }

        stretch_contrast(&mut gray);

        if self.deskew {
            if let Some(angle) = detect_skew_angle(&gray) {
                debug!(angle, "Correcting skew");
                gray = shear_rows(&gray, angle);
                warnings.push(ExtractionWarning::SkewCorrected {
                    angle_degrees: angle,
                });
            }
        }

        let threshold = otsu_threshold(&gray);
        binarize(&mut gray, threshold);

        Ok(PreparedImage {
            bytes: encode_png(gray)?,
            warnings,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Orientation
// ═══════════════════════════════════════════════════════════

/// EXIF orientation tag, 1 (normal) when absent.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// 1 normal, 2 mirrored, 3 180°, 4 flipped, 5 mirrored+90° CW,
/// 6 90° CW, 7 mirrored+270° CW, 8 270° CW.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

// ═══════════════════════════════════════════════════════════
// Gray-level operations
// ═══════════════════════════════════════════════════════════

/// Noise estimate: std dev of the median block among the smoothest
/// quarter of 5x5 blocks.
pub fn assess_noise_level(img: &GrayImage) -> f32 {
    let (w, h) = img.dimensions();
    let block = 5u32;
    if w < block || h < block {
        return 0.0;
    }

    let mut variances = Vec::new();
    for by in (0..=h - block).step_by(block as usize) {
        for bx in (0..=w - block).step_by(block as usize) {
            let mut sum = 0.0f64;
            let mut sum_sq = 0.0f64;
            for y in by..by + block {
                for x in bx..bx + block {
                    let v = img.get_pixel(x, y).0[0] as f64;
                    sum += v;
                    sum_sq += v * v;
                }
            }
            let n = (block * block) as f64;
            let mean = sum / n;
            variances.push(((sum_sq / n) - mean * mean).max(0.0) as f32);
        }
    }

    variances.sort_by(|a, b| a.total_cmp(b));
    let quartile = &variances[..(variances.len() / 4).max(1)];
    quartile[quartile.len() / 2].sqrt()
}

/// 3x3 median, edges clamped.
pub fn median_filter_3x3(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    let mut window = [0u8; 9];

    for y in 0..h {
        for x in 0..w {
            let mut i = 0;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                    let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                    window[i] = img.get_pixel(sx, sy).0[0];
                    i += 1;
                }
            }
            window.sort_unstable();
            out.put_pixel(x, y, Luma([window[4]]));
        }
    }
    out
}

/// Linear histogram stretch between the 1st and 99th percentiles.
/// Flat images are left alone.
pub fn stretch_contrast(img: &mut GrayImage) {
    let total = img.width() as usize * img.height() as usize;
    if total == 0 {
        return;
    }

    let hist = histogram(img);
    let clip = (total as f64 * STRETCH_CLIP) as usize;

    let low = percentile_level(&hist, clip);
    let high = percentile_level(&hist, total.saturating_sub(clip + 1));
    if high <= low {
        return;
    }

    let span = (high - low) as f32;
    for p in img.pixels_mut() {
        let v = p.0[0].clamp(low, high);
        p.0[0] = ((v - low) as f32 * 255.0 / span).round() as u8;
    }
}

fn histogram(img: &GrayImage) -> [usize; 256] {
    let mut hist = [0usize; 256];
    for p in img.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    hist
}

/// Gray level of the pixel at `rank` in sorted order.
fn percentile_level(hist: &[usize; 256], rank: usize) -> u8 {
    let mut seen = 0usize;
    for (level, &count) in hist.iter().enumerate() {
        seen += count;
        if seen > rank {
            return level as u8;
        }
    }
    255
}

/// Otsu's threshold: the level maximizing between-class variance.
pub fn otsu_threshold(img: &GrayImage) -> u8 {
    let hist = histogram(img);
    let total = img.width() as f64 * img.height() as f64;
    if total == 0.0 {
        return 127;
    }

    let weighted_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut background = 0.0f64;
    let mut background_sum = 0.0f64;
    let mut best = (0u8, -1.0f64);

    for (level, &count) in hist.iter().enumerate() {
        background += count as f64;
        if background == 0.0 {
            continue;
        }
        let foreground = total - background;
        if foreground == 0.0 {
            break;
        }

        background_sum += level as f64 * count as f64;
        let mean_b = background_sum / background;
        let mean_f = (weighted_total - background_sum) / foreground;
        let between = background * foreground * (mean_b - mean_f).powi(2);

        if between > best.1 {
            best = (level as u8, between);
        }
    }
    best.0
}

/// Pixels above the threshold become white, the rest black.
pub fn binarize(img: &mut GrayImage, threshold: u8) {
    for p in img.pixels_mut() {
        p.0[0] = if p.0[0] > threshold { 255 } else { 0 };
    }
}

// ═══════════════════════════════════════════════════════════
// Deskew
// ═══════════════════════════════════════════════════════════

/// Projection-profile skew estimate over -5..=5 degrees in 0.25 steps.
/// `None` when the image is tiny, nearly blank, or the angle is under 0.5°.
pub fn detect_skew_angle(img: &GrayImage) -> Option<f32> {
    let (w, h) = img.dimensions();
    if w < 50 || h < 50 {
        return None;
    }

    let ink = img.pixels().filter(|p| p.0[0] < INK_THRESHOLD).count();
    if (ink as f32 / (w * h) as f32) < 0.02 {
        return None;
    }

    let mut best_angle = 0.0f32;
    let mut best_score = f64::NEG_INFINITY;
    for step in -20..=20 {
        let angle = step as f32 * 0.25;
        let score = projection_variance(img, angle);
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    (best_angle.abs() >= 0.5).then_some(best_angle)
}

/// Sum of squared differences between adjacent row ink counts after
/// shearing rows by `angle_deg`. Crisp text lines score highest.
fn projection_variance(img: &GrayImage, angle_deg: f32) -> f64 {
    let (w, h) = img.dimensions();
    let tan_a = (angle_deg.to_radians()).tan() as f64;

    let projection: Vec<u32> = (0..h)
        .map(|y| {
            let shift = (y as f64 * tan_a).round() as i64;
            (0..w)
                .step_by(4)
                .filter(|&x| {
                    let sx = x as i64 + shift;
                    sx >= 0 && sx < w as i64 && img.get_pixel(sx as u32, y).0[0] < INK_THRESHOLD
                })
                .count() as u32
        })
        .collect();

    projection
        .windows(2)
        .map(|pair| {
            let diff = pair[1] as f64 - pair[0] as f64;
            diff * diff
        })
        .sum()
}

/// Undo skew the same way `projection_variance` measures it: row `y` reads
/// from `x + y·tan(angle)`. Pixels shifted in from outside are white.
pub fn shear_rows(img: &GrayImage, angle_deg: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let tan_a = (angle_deg.to_radians()).tan() as f64;
    let mut out = GrayImage::from_pixel(w, h, Luma([255]));

    for y in 0..h {
        let shift = (y as f64 * tan_a).round() as i64;
        for x in 0..w {
            let sx = x as i64 + shift;
            if sx >= 0 && sx < w as i64 {
                out.put_pixel(x, y, *img.get_pixel(sx as u32, y));
            }
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════

pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), PreprocessError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(PreprocessError::TooSmall);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(PreprocessError::TooLarge);
    }
    Ok(())
}

fn encode_png(gray: GrayImage) -> Result<Vec<u8>, PreprocessError> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(gray)
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(cursor.into_inner())
}
