//! Tesseract recognizer (drives the `tesseract` executable over stdin/stdout).

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{prepare_for_ocr, OcrLanguages, Recognizer};
use crate::config::OcrConfig;
use crate::error::{PipelineError, PipelineResult};

/// Fully automatic page segmentation, no orientation detection.
const PAGE_SEG_MODE: &str = "3";
/// LSTM engine only.
const ENGINE_MODE: &str = "1";

pub struct TesseractRecognizer {
    config: OcrConfig,
}

impl TesseractRecognizer {
    pub fn new(config: OcrConfig) -> Self {
        match &config.tessdata_dir {
            Some(dir) => {
                info!("Using tessdata path: {}", dir.display());
                log_traineddata(dir);
            }
            None => info!("TESSDATA_PREFIX not set, using default Tesseract locations"),
        }
        Self { config }
    }
}

fn log_traineddata(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read tessdata directory {}: {}", dir.display(), e);
            return;
        }
    };
    let models: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".traineddata"))
        .collect();
    if models.is_empty() {
        warn!("No .traineddata files found in {}", dir.display());
    } else {
        info!("Available tessdata files: {:?}", models);
    }
}

#[async_trait::async_trait]
impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &[u8], languages: &OcrLanguages) -> PipelineResult<String> {
        // decode, resize and equalize are CPU-bound
        let owned = image.to_vec();
        let enhance = self.config.enhance;
        let input = tokio::task::spawn_blocking(move || prepare_for_ocr(&owned, enhance))
            .await
            .map_err(|e| PipelineError::Recognition(format!("image preparation failed: {}", e)))??;

        let mut cmd = Command::new(&self.config.tesseract_cmd);
        cmd.arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(languages.to_string())
            .arg("--psm")
            .arg(PAGE_SEG_MODE)
            .arg("--oem")
            .arg(ENGINE_MODE);
        if let Some(dir) = &self.config.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "Tesseract: recognizing {} bytes, languages={}",
            input.len(),
            languages
        );

        let mut child = cmd.spawn().map_err(|e| {
            PipelineError::Recognition(format!(
                "failed to run {}: {}",
                self.config.tesseract_cmd, e
            ))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PipelineError::Recognition("tesseract stdin unavailable".to_string()))?;
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| PipelineError::Recognition(e.to_string()))?;
        if let Ok(Err(e)) = writer.await {
            warn!("Tesseract: writing image to stdin failed: {}", e);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        info!("OCR completed, extracted {} characters", text.chars().count());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_garbage_bytes_fail_with_decode_before_spawning() {
        let recognizer = TesseractRecognizer::new(OcrConfig {
            tesseract_cmd: "/nonexistent/tesseract".to_string(),
            ..OcrConfig::default()
        });
        let langs = OcrLanguages::parse(Some("rus"), "eng");
        let err = recognizer.recognize(b"not an image", &langs).await.unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_missing_binary_is_recognition_error() {
        use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([255, 255, 255])))
            .write_to(&mut std::io::Cursor::new(&mut png), ImageOutputFormat::Png)
            .unwrap();

        let recognizer = TesseractRecognizer::new(OcrConfig {
            tesseract_cmd: "/nonexistent/tesseract".to_string(),
            ..OcrConfig::default()
        });
        let langs = OcrLanguages::parse(None, "eng");
        let err = recognizer.recognize(&png, &langs).await.unwrap_err();
        assert!(matches!(err, PipelineError::Recognition(_)), "got {:?}", err);
    }
}
