//! Client for the LLM-backed structured-extraction service.
//!
//! The service takes the three role texts and answers with a flat metadata
//! object. Every failure (disabled, transport, timeout, non-2xx, malformed
//! body) ends up as [`SemanticOutcome::NoResult`] so the caller can fall back
//! to pattern parsing without any error handling of its own.

use std::collections::HashSet;

use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::config::SemanticConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::schema::{CandidateRecord, ClassificationCodes, Provenance, RoleTexts, PLAUSIBLE_YEARS};

/// Sentences shorter than this are never treated as repeats.
const MIN_REPEATED_SENTENCE_CHARS: usize = 15;

/// Result of one semantic extraction attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticOutcome {
    Extracted(CandidateRecord),
    /// Nothing usable; the reason is for logs only.
    NoResult(String),
}

/// Capability: structured extraction from role texts.
#[async_trait::async_trait]
pub trait SemanticExtractor: Send + Sync {
    async fn extract(&self, texts: &RoleTexts) -> SemanticOutcome;
}

#[derive(Debug, Serialize)]
struct ExtractionRequest<'a> {
    cover_text: &'a str,
    back_text: &'a str,
    info_text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    authors: Option<Vec<String>>,
    #[serde(default)]
    isbn: Option<String>,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default, deserialize_with = "lenient_year")]
    year: Option<u16>,
    #[serde(default, deserialize_with = "lenient_year")]
    publication_year: Option<u16>,
    #[serde(default)]
    udk: Option<String>,
    #[serde(default)]
    bbk: Option<String>,
    #[serde(default)]
    annotation: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

impl ExtractionResponse {
    fn into_candidate(self) -> CandidateRecord {
        let listed: Vec<String> = self
            .authors
            .unwrap_or_default()
            .into_iter()
            .filter(|a| !crate::schema::is_placeholder(a))
            .collect();
        let authors = if listed.is_empty() {
            self.author.into_iter().collect()
        } else {
            listed
        };

        CandidateRecord {
            provenance: Provenance::Semantic,
            title: self.title,
            authors,
            isbn: self.isbn,
            publisher: self.publisher,
            city: self.city,
            year: self.year.or(self.publication_year),
            classification: ClassificationCodes {
                udk: self.udk,
                bbk: self.bbk,
            },
            annotation: self.annotation.map(|a| dedupe_sentences(&a)),
            confidence: self.confidence,
        }
        .normalized()
    }
}

/// Accept a year as a number or a numeric string. Anything else, or a year
/// outside [`PLAUSIBLE_YEARS`], is absent.
fn lenient_year<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u16>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    let year = match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|y| u16::try_from(y).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(year.filter(|y| PLAUSIBLE_YEARS.contains(y)))
}

/// Drop sentences that repeat an earlier one verbatim (case and spacing aside).
fn dedupe_sentences(text: &str) -> String {
    let mut sentences: Vec<&str> = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '…') {
            let end = i + c.len_utf8();
            sentences.push(&text[start..end]);
            start = end;
        }
    }
    sentences.push(&text[start..]);

    let mut seen: HashSet<String> = HashSet::new();
    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| {
            let key = s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
            key.chars().count() < MIN_REPEATED_SENTENCE_CHARS || seen.insert(key)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Semantic extractor backed by the HTTP extraction service.
#[derive(Clone)]
pub struct HttpSemanticExtractor {
    client: Client,
    config: SemanticConfig,
}

impl HttpSemanticExtractor {
    pub fn new(config: SemanticConfig) -> PipelineResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// True when the service is enabled and answers its health endpoint with 2xx.
    pub async fn is_healthy(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = format!("{}/health", self.config.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Semantic service health check failed: {}", e);
                false
            }
        }
    }

    async fn request(&self, texts: &RoleTexts) -> PipelineResult<ExtractionResponse> {
        let url = format!("{}/extract-metadata", self.config.base_url);
        debug!(
            "Sending texts to semantic service: cover={} back={} info={} chars",
            texts.cover.chars().count(),
            texts.back.chars().count(),
            texts.info.chars().count()
        );

        let response = self
            .client
            .post(&url)
            .json(&ExtractionRequest {
                cover_text: &texts.cover,
                back_text: &texts.back,
                info_text: &texts.info,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(PipelineError::Transport(format!(
                "service returned {}: {}",
                status, snippet
            )));
        }

        Ok(response.json::<ExtractionResponse>().await?)
    }
}

#[async_trait::async_trait]
impl SemanticExtractor for HttpSemanticExtractor {
    async fn extract(&self, texts: &RoleTexts) -> SemanticOutcome {
        if !self.config.enabled {
            info!("Semantic extraction is disabled, skipping");
            return SemanticOutcome::NoResult("disabled".to_string());
        }

        info!("Calling semantic service at {}", self.config.base_url);
        match self.request(texts).await {
            Ok(response) => {
                let candidate = response.into_candidate();
                if candidate.field_count() == 0 {
                    warn!("Semantic service returned no usable fields");
                    return SemanticOutcome::NoResult("empty response".to_string());
                }
                info!(
                    "Semantic service extracted {} fields: title={:?}, authors={:?}, isbn={:?}, confidence={:?}",
                    candidate.field_count(),
                    candidate.title,
                    candidate.authors,
                    candidate.isbn,
                    candidate.confidence
                );
                SemanticOutcome::Extracted(candidate)
            }
            Err(e) => {
                warn!("Semantic extraction failed, falling back to pattern parsing: {}", e);
                SemanticOutcome::NoResult(e.to_string())
            }
        }
    }
}
