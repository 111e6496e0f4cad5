//! Text recognition abstraction.
//!
//! Defines the [`Recognizer`] trait so the engine (local tesseract, a remote
//! service, a test double) can be swapped without touching the pipeline, plus
//! the language bundle type and the shared pre-recognition image enhancement.

pub mod tesseract;

use std::fmt;
use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat};
use imageproc::contrast::equalize_histogram;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// Images smaller than this on either side are upscaled before recognition.
const UPSCALE_BELOW: u32 = 1500;
const UPSCALE_FACTOR: f64 = 3.0;
/// Upscaling never pushes the longer side past this.
const MAX_UPSCALED_SIDE: u32 = 4500;

/// Async trait implemented by each recognition backend.
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Recognize text in `image`. Fails with [`PipelineError::Decode`] when the
    /// bytes are not an image.
    async fn recognize(&self, image: &[u8], languages: &OcrLanguages) -> PipelineResult<String>;
}

/// A '+'-joined set of recognizer language codes, e.g. `rus+eng`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrLanguages(Vec<String>);

impl OcrLanguages {
    /// Parse `hint`, falling back to `default` when the hint names nothing usable.
    pub fn parse(hint: Option<&str>, default: &str) -> Self {
        let parsed = hint.map(split_codes).unwrap_or_default();
        if parsed.is_empty() {
            Self(split_codes(default))
        } else {
            Self(parsed)
        }
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }
}

fn split_codes(s: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for code in s.split('+').map(str::trim) {
        let valid = !code.is_empty()
            && code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid && !codes.iter().any(|c| c == code) {
            codes.push(code.to_string());
        }
    }
    codes
}

impl fmt::Display for OcrLanguages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("+"))
    }
}

/// Decode `bytes` and, if `enhance` is set, prepare them for dense printed text:
/// grayscale, upscale small photos and equalize the histogram. Returns PNG bytes.
pub fn prepare_for_ocr(bytes: &[u8], enhance: bool) -> PipelineResult<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| PipelineError::Decode(e.to_string()))?;
    if !enhance {
        return encode_png(decoded);
    }

    let mut gray = decoded.to_luma8();
    let (w, h) = gray.dimensions();
    if w < UPSCALE_BELOW || h < UPSCALE_BELOW {
        let longest = w.max(h).max(1) as f64;
        let factor = UPSCALE_FACTOR.min(MAX_UPSCALED_SIDE as f64 / longest);
        if factor > 1.0 {
            let (nw, nh) = ((w as f64 * factor) as u32, (h as f64 * factor) as u32);
            debug!("Upscaled image for OCR: {}x{} -> {}x{}", w, h, nw, nh);
            gray = image::imageops::resize(&gray, nw, nh, FilterType::CatmullRom);
        }
    }

    encode_png(DynamicImage::ImageLuma8(equalize_histogram(&gray)))
}

fn encode_png(image: DynamicImage) -> PipelineResult<Vec<u8>> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .map_err(|e| PipelineError::Recognition(format!("failed to encode OCR input: {}", e)))?;
    Ok(buf)
}
