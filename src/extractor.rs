//! Extraction orchestration: semantic extractor first, pattern parser as the
//! fallback, then a merge of the adopted candidate into the book record.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::pattern::PatternExtractor;
use crate::schema::{normalize_field, BookRecord, CandidateRecord, Provenance, RoleTexts};
use crate::semantic::{SemanticExtractor, SemanticOutcome};

/// Steps of the fallback chain, in the order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionState {
    Init,
    SemanticAttempted,
    PatternAttempted,
    Resolved(Provenance),
}

/// The adopted candidate plus the states visited to reach it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub candidate: CandidateRecord,
    pub trail: Vec<ExtractionState>,
}

/// Runs the fallback chain. Owns no storage.
pub struct Orchestrator {
    semantic: Arc<dyn SemanticExtractor>,
    pattern: PatternExtractor,
}

impl Orchestrator {
    pub fn new(semantic: Arc<dyn SemanticExtractor>, pattern: PatternExtractor) -> Self {
        Self { semantic, pattern }
    }

    /// Try semantic extraction; on `NoResult` accept the pattern candidate,
    /// however sparse. There is no third tier.
    pub async fn resolve(&self, texts: &RoleTexts) -> Resolution {
        let mut trail = vec![ExtractionState::Init];

        let outcome = self.semantic.extract(texts).await;
        trail.push(ExtractionState::SemanticAttempted);

        let candidate = match outcome {
            SemanticOutcome::Extracted(candidate) => candidate,
            SemanticOutcome::NoResult(reason) => {
                info!("No semantic result ({}), using pattern extraction", reason);
                let candidate = self.pattern.parse(&texts.cover, &texts.back, &texts.info);
                trail.push(ExtractionState::PatternAttempted);
                candidate
            }
        };

        trail.push(ExtractionState::Resolved(candidate.provenance));
        info!(
            "Extraction resolved by {} with {} fields",
            candidate.provenance,
            candidate.field_count()
        );
        Resolution { candidate, trail }
    }
}

/// Adopt `candidate` into `record`.
///
/// Present, non-placeholder fields overwrite; absent ones leave the record's
/// value alone. A non-empty author list replaces the existing one wholesale.
pub fn merge_into(record: &mut BookRecord, candidate: &CandidateRecord) {
    fn adopt(target: &mut Option<String>, value: &Option<String>) {
        if let Some(v) = normalize_field(value.clone()) {
            *target = Some(v);
        }
    }

    adopt(&mut record.title, &candidate.title);
    adopt(&mut record.isbn, &candidate.isbn);
    adopt(&mut record.publisher, &candidate.publisher);
    adopt(&mut record.city, &candidate.city);
    adopt(&mut record.annotation, &candidate.annotation);
    adopt(&mut record.classification.udk, &candidate.classification.udk);
    adopt(&mut record.classification.bbk, &candidate.classification.bbk);

    if let Some(year) = candidate.year.filter(|y| *y != 0) {
        record.year = Some(year);
    }

    let authors: Vec<String> = candidate
        .authors
        .iter()
        .filter_map(|a| normalize_field(Some(a.clone())))
        .collect();
    if !authors.is_empty() {
        record.authors = authors;
    }

    record.provenance = Some(candidate.provenance);
}
