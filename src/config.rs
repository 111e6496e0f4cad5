//! Pipeline configuration.
//!
//! Everything is read from the process environment (after `.env` is loaded by
//! the binary). [`PipelineConfig::from_lookup`] takes the lookup as a closure so
//! tests never touch the real environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Languages used when a request does not name any.
pub const DEFAULT_LANGUAGES: &str = "rus+eng+ukr+bel+deu+fra";

/// Reference bound on pending extraction jobs.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Top-level configuration consumed by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub bind_addr: String,
    pub ocr: OcrConfig,
    pub semantic: SemanticConfig,
    pub rectifier: RectifierConfig,
    /// Maximum number of jobs waiting behind the one being processed.
    pub queue_capacity: usize,
    /// Optional JSON file overriding the built-in city/publisher lexicon.
    #[serde(default)]
    pub lexicon_path: Option<PathBuf>,
}

/// Text recognizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Language-data directory. `None` leaves the engine on its built-in search path.
    #[serde(default)]
    pub tessdata_dir: Option<PathBuf>,
    pub tesseract_cmd: String,
    pub default_languages: String,
    /// Grayscale, upscale and equalize images before recognition.
    pub enhance: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tessdata_dir: None,
            tesseract_cmd: "tesseract".to_string(),
            default_languages: DEFAULT_LANGUAGES.to_string(),
            enhance: true,
        }
    }
}

/// Semantic (LLM-backed) extraction service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConfig {
    pub base_url: String,
    pub enabled: bool,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            enabled: true,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Page boundary detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RectifierConfig {
    /// Minimum contour area (px²) for a 4-vertex approximation to count as the page.
    pub min_quad_area: f64,
    /// Minimum contour area (px²) for the bounding-box fallback.
    pub min_box_area: f64,
    /// Polygon approximation tolerance as a fraction of the contour perimeter.
    pub approx_epsilon_ratio: f64,
}

impl Default for RectifierConfig {
    fn default() -> Self {
        Self {
            min_quad_area: 1000.0,
            min_box_area: 5000.0,
            approx_epsilon_ratio: 0.02,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            ocr: OcrConfig::default(),
            semantic: SemanticConfig::default(),
            rectifier: RectifierConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            lexicon_path: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Unset or blank keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = addr;
        }

        config.ocr.tessdata_dir = get("TESSDATA_PREFIX").map(PathBuf::from);
        if let Some(cmd) = get("TESSERACT_CMD") {
            config.ocr.tesseract_cmd = cmd;
        }
        if let Some(langs) = get("OCR_LANGUAGES") {
            config.ocr.default_languages = langs;
        }
        if let Some(v) = get("OCR_ENHANCE") {
            config.ocr.enhance = parse_bool("OCR_ENHANCE", &v)?;
        }

        if let Some(url) = get("SEMANTIC_SERVICE_URL") {
            config.semantic.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("SEMANTIC_SERVICE_ENABLED") {
            config.semantic.enabled = parse_bool("SEMANTIC_SERVICE_ENABLED", &v)?;
        }
        if let Some(v) = get("SEMANTIC_TIMEOUT_SECS") {
            let secs: u64 = v
                .parse()
                .with_context(|| format!("SEMANTIC_TIMEOUT_SECS is not a number: {}", v))?;
            config.semantic.timeout = Duration::from_secs(secs);
        }

        if let Some(v) = get("QUEUE_CAPACITY") {
            let capacity: usize = v
                .parse()
                .with_context(|| format!("QUEUE_CAPACITY is not a number: {}", v))?;
            if capacity == 0 {
                anyhow::bail!("QUEUE_CAPACITY must be at least 1");
            }
            config.queue_capacity = capacity;
        }

        if let Some(v) = get("RECTIFY_MIN_QUAD_AREA") {
            config.rectifier.min_quad_area = v
                .parse()
                .with_context(|| format!("RECTIFY_MIN_QUAD_AREA is not a number: {}", v))?;
        }
        if let Some(v) = get("RECTIFY_MIN_BOX_AREA") {
            config.rectifier.min_box_area = v
                .parse()
                .with_context(|| format!("RECTIFY_MIN_BOX_AREA is not a number: {}", v))?;
        }

        config.lexicon_path = get("LEXICON_PATH").map(PathBuf::from);

        info!(
            "Pipeline config: semantic={} ({}), queue_capacity={}, languages={}",
            config.semantic.base_url,
            if config.semantic.enabled { "enabled" } else { "disabled" },
            config.queue_capacity,
            config.ocr.default_languages
        );

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{} must be a boolean, got '{}'", key, other),
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = PipelineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.queue_capacity, 100);
        assert!(config.semantic.enabled);
        assert!(config.ocr.tessdata_dir.is_none());
        assert_eq!(config.ocr.default_languages, DEFAULT_LANGUAGES);
        assert_eq!(config.rectifier.min_quad_area, 1000.0);
    }

    #[test]
    fn test_empty_tessdata_falls_back_to_default() {
        let config = PipelineConfig::from_lookup(lookup(&[("TESSDATA_PREFIX", "  ")])).unwrap();
        assert!(config.ocr.tessdata_dir.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("TESSDATA_PREFIX", "/opt/tessdata"),
            ("SEMANTIC_SERVICE_URL", "http://llm:5000/"),
            ("SEMANTIC_SERVICE_ENABLED", "false"),
            ("SEMANTIC_TIMEOUT_SECS", "5"),
            ("QUEUE_CAPACITY", "7"),
        ]))
        .unwrap();
        assert_eq!(config.ocr.tessdata_dir, Some(PathBuf::from("/opt/tessdata")));
        assert_eq!(config.semantic.base_url, "http://llm:5000");
        assert!(!config.semantic.enabled);
        assert_eq!(config.semantic.timeout, Duration::from_secs(5));
        assert_eq!(config.queue_capacity, 7);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(PipelineConfig::from_lookup(lookup(&[("QUEUE_CAPACITY", "0")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("QUEUE_CAPACITY", "many")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("OCR_ENHANCE", "maybe")])).is_err());
    }
}
