//! Title heuristics for imprint pages and covers.

use once_cell::sync::Lazy;
use regex::Regex;

/// Lowercased lines made only of УДК/ББК letters, digits and separators.
static CLASSIFICATION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[убкпд\s/.0-9]+$").unwrap());
static UDK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"УДК[:\s]*[0-9/.]+").unwrap());
static BBK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"ББК[:\s]*[0-9/.]+").unwrap());

/// "1161 Послания ..." or "П 61 Послания ..." or "Б79 Жизнь ...".
static SHELF_MARK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[0-9]+|[А-ЯЁA-Z]\s*[0-9]+)\s+(.+)$").unwrap());

/// Names in the genitive case, typical of translator credits.
static GENITIVE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[а-яё]+(?:ой|его|ого|ова|овой|ина|иной),").unwrap());
static INITIALS_WITH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[А-ЯЁA-Z]\. [А-ЯЁA-Z][а-яёa-z]+\..*[0-9]{4}").unwrap());
static ISBN_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"ISBN[:\s-]*[0-9Xx-]+").unwrap());

static PAGE_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+\s+[cс]\.*$").unwrap());
static PAGE_INFO: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]{4}.*страниц").unwrap());
static NUMBERS_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9\s.]+$").unwrap());
static TOC_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{1,2}\s+[А-ЯЁа-яё].+").unwrap());
static SINGLE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[А-ЯЁ][а-яё]+\s*$").unwrap());
static UPPERCASE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[А-ЯЁA-Z]{3,}").unwrap());

static EDGE_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s.,;:/\-–—]+|[\s.,;:/\-–—]+$").unwrap());
static LEADING_SHELF_MARK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[А-ЯЁA-Z]\s*[0-9]+\s*").unwrap());
/// OCR debris after the title: uppercase/digit runs like " BE7/+".
static TRAILING_GARBAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+[A-Z0-9]{2,}[0-9/+\-]*$").unwrap());

const CREDIT_MARKERS: &[&str] = &[
    "перевод",
    "редакт",
    "оформление",
    "translated by",
    "edited by",
];
const PUBLICATION_MARKERS: &[&str] = &["спб", "isbn", "тираж", "подписано"];

/// Pick a title from imprint-page text.
///
/// A shelf-mark line wins outright. Otherwise lines after the classification
/// block are collected, fully uppercase ones first.
pub fn extract_title(text: &str) -> Option<String> {
    let mut passed_classification = false;
    let mut uppercase: Vec<&str> = Vec::new();
    let mut others: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let lower = line.to_lowercase();

        if CLASSIFICATION_LINE.is_match(&lower) || UDK_LINE.is_match(line) || BBK_LINE.is_match(line)
        {
            passed_classification = true;
            continue;
        }

        if let Some(title) = shelf_mark_title(line) {
            return finish(title);
        }

        if is_credit_line(line, &lower) || is_publication_line(line, &lower) {
            continue;
        }

        let length = line.chars().count();
        if passed_classification && length > 5 && !is_noise(line) {
            if is_uppercase_title(line) {
                uppercase.push(line);
            } else {
                others.push(line);
            }
        }

        if uppercase.len() + others.len() > 3 && length > 50 {
            break;
        }
    }

    uppercase
        .first()
        .or_else(|| others.first())
        .and_then(|line| finish(line))
}

/// Longest cover line, for when the imprint page gave nothing.
pub fn cover_title(text: &str) -> Option<String> {
    let longest = text
        .lines()
        .map(str::trim)
        .filter(|l| l.chars().count() > 5)
        .fold(None::<&str>, |best, line| match best {
            Some(b) if b.chars().count() >= line.chars().count() => Some(b),
            _ => Some(line),
        })?;
    finish(longest)
}

fn finish(raw: &str) -> Option<String> {
    let title = clean_title(raw);
    (title.chars().count() > 3).then_some(title)
}

fn shelf_mark_title(line: &str) -> Option<&str> {
    // barcodes OCR as digit runs separated by backslashes
    if line.contains('\\') {
        return None;
    }
    let rest = SHELF_MARK.captures(line)?.get(1)?.as_str();
    let title = rest.split('/').next().unwrap_or_default().trim();
    (title.chars().count() > 10 && !title.starts_with(':')).then_some(title)
}

fn is_credit_line(line: &str, lower: &str) -> bool {
    CREDIT_MARKERS.iter().any(|m| lower.contains(m))
        || lower.starts_with('©')
        || lower.starts_with(':')
        || GENITIVE_NAME.is_match(line)
}

fn is_publication_line(line: &str, lower: &str) -> bool {
    PUBLICATION_MARKERS.iter().any(|m| lower.contains(m))
        || INITIALS_WITH_YEAR.is_match(line)
        || ISBN_KEYWORD.is_match(line)
}

fn is_noise(line: &str) -> bool {
    PAGE_COUNT.is_match(line)
        || PAGE_INFO.is_match(line)
        || NUMBERS_ONLY.is_match(line)
        || TOC_ENTRY.is_match(line)
        || line.ends_with(", |")
        || SINGLE_WORD.is_match(line)
        || line.contains('\\')
        || line.contains("ISBN")
}

fn is_uppercase_title(line: &str) -> bool {
    line == line.to_uppercase() && UPPERCASE_RUN.is_match(line)
}

/// Trim separators, a stuck-on shelf mark and trailing OCR debris.
pub fn clean_title(title: &str) -> String {
    let title = EDGE_PUNCTUATION.replace_all(title, "");
    let title = LEADING_SHELF_MARK.replace(&title, "");
    let title = TRAILING_GARBAGE.replace(&title, "");
    title.trim().to_string()
}
