//! Pattern-based bibliographic extraction.
//!
//! Pure functions, no async. Runs regex heuristics tuned for Russian imprint
//! pages over the role texts and produces a `pattern` candidate. The same input
//! always yields the same candidate.

pub mod author;
pub mod imprint;
pub mod lexicon;
pub mod title;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::schema::{CandidateRecord, ClassificationCodes, Provenance};
use imprint::ImprintMatcher;
use lexicon::Lexicon;

static ISBN_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ISBN(?:-1[03])?[\s:-]*((?:[0-9XxХх]|\s?[-–]\s?)+)").unwrap()
});
static ISBN_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9][0-9-]{8,}[0-9XxХх]\b").unwrap());
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:19|20)[0-9]{2}\b").unwrap());
static UDK: Lazy<Regex> = Lazy::new(|| Regex::new(r"УДК\s*:?\s*([0-9][0-9.:()+=/\-]*)").unwrap());
static BBK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ББК\s*[:.]?\s*([А-ЯЁ0-9][0-9()=:А-ЯЁа-яё.\-–/]*)").unwrap()
});


pub struct PatternExtractor {
    lexicon: Lexicon,
    imprint: ImprintMatcher,
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new(Lexicon::default())
    }
}

impl PatternExtractor {
    pub fn new(lexicon: Lexicon) -> Self {
        let imprint = ImprintMatcher::new(&lexicon);
        Self { lexicon, imprint }
    }

    /// Parse the three role texts into a normalized `pattern` candidate.
    ///
    /// The info page is the primary source. The cover supplies a title and the
    /// back cover an ISBN or year only when the info page had none.
    pub fn parse(&self, cover: &str, back: &str, info: &str) -> CandidateRecord {
        let cover = cover.replace("\r\n", "\n");
        let back = back.replace("\r\n", "\n");
        let info = info.replace("\r\n", "\n");

        let mut record = CandidateRecord::empty(Provenance::Pattern);

        if !info.trim().is_empty() {
            record.isbn = extract_isbn(&info);
            record.year = extract_year(&info);
            let imprint = self.imprint.extract(&info, &self.lexicon);
            record.publisher = imprint.publisher;
            record.city = imprint.city;
            record.authors = author::extract_authors(&info, &self.lexicon);
            record.title = title::extract_title(&info);
            record.classification = extract_classification(&info);
        }

        if record.title.is_none() {
            record.title = title::cover_title(&cover);
        }
        if record.isbn.is_none() {
            record.isbn = extract_isbn(&back);
        }
        if record.year.is_none() {
            record.year = extract_year(&back);
        }

        let record = record.normalized();
        debug!(
            "Pattern extraction: {} fields (title={:?}, isbn={:?}, year={:?})",
            record.field_count(),
            record.title,
            record.isbn,
            record.year
        );
        record
    }
}

/// First ISBN in `text`. A keyworded ISBN beats a bare digit run anywhere.
///
/// Only 10- or 13-character numbers count. A Cyrillic `Х` check character is
/// read as `X`.
pub fn extract_isbn(text: &str) -> Option<String> {
    let keyworded = ISBN_KEYWORD
        .captures_iter(text)
        .find_map(|cap| normalize_isbn(&cap[1]));
    keyworded.or_else(|| ISBN_BARE.find_iter(text).find_map(|m| normalize_isbn(m.as_str())))
}

fn normalize_isbn(raw: &str) -> Option<String> {
    let isbn: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            'x' | 'Х' | 'х' => 'X',
            '–' => '-',
            other => other,
        })
        .collect();
    let isbn = isbn.trim_matches('-');

    let digits: Vec<char> = isbn.chars().filter(|c| *c != '-').collect();
    let check_only_last = digits
        .iter()
        .take(digits.len().saturating_sub(1))
        .all(|c| c.is_ascii_digit());
    (matches!(digits.len(), 10 | 13) && check_only_last).then(|| isbn.to_string())
}

/// Most frequent plausible year; ties go to the one seen first.
pub fn extract_year(text: &str) -> Option<u16> {
    // (year, count) in order of first appearance
    let mut counts: Vec<(u16, usize)> = Vec::new();
    for m in YEAR.find_iter(text) {
        let Ok(year) = m.as_str().parse::<u16>() else {
            continue;
        };
        match counts.iter_mut().find(|(y, _)| *y == year) {
            Some((_, count)) => *count += 1,
            None => counts.push((year, 1)),
        }
    }

    let mut best: Option<(u16, usize)> = None;
    for (year, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((year, count));
        }
    }
    best.map(|(year, _)| year)
}

/// УДК and ББК codes with whitespace removed.
pub fn extract_classification(text: &str) -> ClassificationCodes {
    let code = |re: &Regex| {
        re.captures(text).and_then(|cap| {
            let code: String = cap[1].chars().filter(|c| !c.is_whitespace()).collect();
            let code = code.trim_end_matches(['.', ':', '-', '–', '/', '=', '+']).to_string();
            (!code.is_empty()).then_some(code)
        })
    };
    ClassificationCodes {
        udk: code(&UDK),
        bbk: code(&BBK),
    }
}
