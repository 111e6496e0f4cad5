//! Bibliographic data model shared by every pipeline stage.
//!
//! Captures flow in as [`RawCapture`]s, are rectified into [`RectifiedImage`]s,
//! recognized into [`ExtractedText`]s, parsed into [`CandidateRecord`]s and
//! finally merged into a [`BookRecord`] owned by the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Literal some extractors emit instead of leaving a field empty.
pub const UNKNOWN_SENTINEL: &str = "unknown";

/// Classification of a photographed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Cover,
    Back,
    InfoPage,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Cover, Role::Back, Role::InfoPage];

    /// Parse a multipart field / query string name into a role.
    pub fn from_field(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cover" => Some(Self::Cover),
            "back" => Some(Self::Back),
            "info" | "info_page" => Some(Self::InfoPage),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Cover => "COVER",
            Role::Back => "BACK",
            Role::InfoPage => "INFO_PAGE",
        };
        f.write_str(s)
    }
}

/// A photographed page as delivered by the capture client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCapture {
    pub role: Role,
    /// Ordering among several INFO_PAGE captures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_index: Option<u32>,
    #[serde(default, skip_serializing)]
    pub data: Vec<u8>,
}

impl RawCapture {
    pub fn new(role: Role, data: Vec<u8>) -> Self {
        Self {
            role,
            page_index: None,
            data,
        }
    }

    pub fn with_page_index(mut self, index: u32) -> Self {
        self.page_index = Some(index);
        self
    }
}

/// Image bytes after crop/warp, used only as recognition input.
#[derive(Debug, Clone)]
pub struct RectifiedImage {
    pub role: Role,
    pub page_index: Option<u32>,
    pub data: Vec<u8>,
}

/// Recognized text for a single capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub role: Role,
    pub page_index: Option<u32>,
    pub text: String,
    pub languages: String,
}

/// Text per role, ready for the extractors. INFO_PAGE texts are already joined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleTexts {
    pub cover: String,
    pub back: String,
    pub info: String,
}

impl RoleTexts {
    /// Group recognized texts by role, concatenating INFO_PAGE texts in page order.
    pub fn from_extracted(texts: &[ExtractedText]) -> Self {
        let mut info_pages: Vec<&ExtractedText> =
            texts.iter().filter(|t| t.role == Role::InfoPage).collect();
        // stable: captures without an index keep arrival order, after indexed ones
        info_pages.sort_by_key(|t| t.page_index.unwrap_or(u32::MAX));

        let join_role = |role: Role| {
            texts
                .iter()
                .filter(|t| t.role == role)
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        };

        Self {
            cover: join_role(Role::Cover),
            back: join_role(Role::Back),
            info: info_pages
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.cover.trim().is_empty() && self.back.trim().is_empty() && self.info.trim().is_empty()
    }
}

/// Which extractor produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Pattern,
    Semantic,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Pattern => f.write_str("pattern"),
            Provenance::Semantic => f.write_str("semantic"),
        }
    }
}

/// National cataloguing codes printed on the imprint page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCodes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbk: Option<String>,
}

impl ClassificationCodes {
    pub fn is_empty(&self) -> bool {
        self.udk.is_none() && self.bbk.is_none()
    }
}

/// Partial bibliographic record produced by one extractor.
///
/// Fields are either present with a real value or absent. Build through
/// [`CandidateRecord::normalized`] before handing a record to the merge step so
/// placeholder values never leak into storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "ClassificationCodes::is_empty")]
    pub classification: ClassificationCodes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    /// Self-reported confidence, semantic candidates only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl CandidateRecord {
    pub fn empty(provenance: Provenance) -> Self {
        Self {
            provenance,
            title: None,
            authors: Vec::new(),
            isbn: None,
            publisher: None,
            city: None,
            year: None,
            classification: ClassificationCodes::default(),
            annotation: None,
            confidence: None,
        }
    }

    /// Strip placeholders, collapse whitespace and drop duplicate authors.
    pub fn normalized(mut self) -> Self {
        self.title = normalize_field(self.title);
        self.isbn = normalize_field(self.isbn);
        self.publisher = normalize_field(self.publisher);
        self.city = normalize_field(self.city);
        self.annotation = normalize_field(self.annotation);
        self.classification.udk = normalize_field(self.classification.udk);
        self.classification.bbk = normalize_field(self.classification.bbk);
        self.year = self.year.filter(|y| *y != 0);

        let mut authors: Vec<String> = Vec::with_capacity(self.authors.len());
        for author in self.authors.drain(..).filter_map(|a| normalize_field(Some(a))) {
            if !authors.contains(&author) {
                authors.push(author);
            }
        }
        self.authors = authors;
        self
    }

    /// Number of populated bibliographic fields.
    pub fn field_count(&self) -> usize {
        [
            self.title.is_some(),
            !self.authors.is_empty(),
            self.isbn.is_some(),
            self.publisher.is_some(),
            self.city.is_some(),
            self.year.is_some(),
            self.classification.udk.is_some(),
            self.classification.bbk.is_some(),
            self.annotation.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// Collapse internal whitespace; map empty strings and the unknown sentinel to `None`.
pub fn normalize_field(value: Option<String>) -> Option<String> {
    let value = value?;
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || is_placeholder(&collapsed) {
        None
    } else {
        Some(collapsed)
    }
}

/// Publication years the extractors accept.
pub const PLAUSIBLE_YEARS: std::ops::RangeInclusive<u16> = 1900..=2099;

/// True for values that only stand in for "no data".
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNKNOWN_SENTINEL)
}

/// Stored book entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default)]
    pub classification: ClassificationCodes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    /// Provenance of the last adopted candidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(default)]
    pub captures: Vec<RawCapture>,
}

impl BookRecord {
    pub fn new(captures: Vec<RawCapture>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: None,
            authors: Vec::new(),
            isbn: None,
            publisher: None,
            city: None,
            year: None,
            classification: ClassificationCodes::default(),
            annotation: None,
            provenance: None,
            captures,
        }
    }
}
