//! Publisher and city from the imprint line ("СПб.: Азбука-классика, 2004").

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::lexicon::Lexicon;

static PUBLISHER_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:издательство|published by|publisher)\s*:?\s*(.+)").unwrap()
});
static YEAR_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:19|20)[0-9]{2}").unwrap());
static CONTAINS_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:19|20)[0-9]{2}\b").unwrap());

const QUOTES_AND_DASHES: &[char] = &['«', '»', '"', '\'', '“', '”', '—', '–', '-'];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Imprint {
    pub publisher: Option<String>,
    pub city: Option<String>,
}

/// Matches imprint lines against the lexicon's city spellings.
pub struct ImprintMatcher {
    pattern: Option<Regex>,
    canonical: HashMap<String, String>,
}

impl ImprintMatcher {
    pub fn new(lexicon: &Lexicon) -> Self {
        let spellings = lexicon.city_spellings();
        let canonical: HashMap<String, String> = spellings.iter().cloned().collect();

        if spellings.is_empty() {
            warn!("Lexicon has no cities, imprint lines will not be recognized");
            return Self {
                pattern: None,
                canonical,
            };
        }

        let alternation = spellings
            .iter()
            .map(|(spelling, _)| regex::escape(spelling))
            .collect::<Vec<_>>()
            .join("|");
        let source = format!(
            r"(?:^|[^\p{{L}}])(?P<city>{})\s*[.:]+\s*(?P<publisher>[^,;\d\n]+?)\s*,\s*(?:19|20)[0-9]{{2}}",
            alternation
        );
        let pattern = match Regex::new(&source) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Skipping imprint pattern, lexicon produced an invalid regex: {}", e);
                None
            }
        };
        debug!("Compiled imprint pattern over {} city spellings", spellings.len());
        Self { pattern, canonical }
    }

    /// Publisher priority: imprint line, then a copyright line naming a known
    /// publisher, then a line with a publisher keyword.
    pub fn extract(&self, text: &str, lexicon: &Lexicon) -> Imprint {
        let mut imprint = self.from_imprint_line(text).unwrap_or_default();

        if imprint.publisher.is_none() {
            imprint.publisher = text
                .lines()
                .map(str::trim)
                .filter(|l| l.starts_with('©'))
                .find_map(|l| lexicon.find_publisher(l))
                .map(str::to_string);
        }

        if imprint.publisher.is_none() {
            imprint.publisher = text.lines().find_map(keyword_publisher);
        }

        if imprint.city.is_none() {
            imprint.city = text
                .lines()
                .filter(|l| CONTAINS_YEAR.is_match(l))
                .find_map(|l| lexicon.find_city_name(l))
                .map(str::to_string);
        }

        imprint
    }

    fn from_imprint_line(&self, text: &str) -> Option<Imprint> {
        let pattern = self.pattern.as_ref()?;
        text.lines().find_map(|line| {
            let cap = pattern.captures(line)?;
            let publisher = clean_publisher(&cap["publisher"])?;
            let city = self.canonical.get(&cap["city"]).cloned();
            Some(Imprint {
                publisher: Some(publisher),
                city,
            })
        })
    }
}

fn keyword_publisher(line: &str) -> Option<String> {
    let rest = PUBLISHER_KEYWORD.captures(line)?.get(1)?.as_str();
    let before_comma = rest.split(',').next().unwrap_or_default();
    let name = YEAR_TOKEN.split(before_comma).next().unwrap_or_default();
    clean_publisher(name)
}

fn clean_publisher(raw: &str) -> Option<String> {
    let name = raw
        .trim()
        .trim_matches(|c: char| QUOTES_AND_DASHES.contains(&c) || c.is_whitespace())
        .to_string();
    if name.chars().count() < 3 || CONTAINS_YEAR.is_match(&name) {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Imprint {
        let lexicon = Lexicon::default();
        ImprintMatcher::new(&lexicon).extract(text, &lexicon)
    }

    #[test]
    fn test_abbreviated_city_imprint() {
        let imprint = extract("H. Горелова. — СПб.: Азбука-классика, 2004. —");
        assert_eq!(imprint.publisher.as_deref(), Some("Азбука-классика"));
        assert_eq!(imprint.city.as_deref(), Some("Санкт-Петербург"));

        let imprint = extract("М.: Книжный Клуб Книговек, 2018. — 464 с.");
        assert_eq!(imprint.publisher.as_deref(), Some("Книжный Клуб Книговек"));
        assert_eq!(imprint.city.as_deref(), Some("Москва"));
    }

    #[test]
    fn test_city_inside_word_is_not_matched() {
        let imprint = extract("ТОМ.: первый, 2001");
        assert_eq!(imprint, Imprint::default());
    }

    #[test]
    fn test_imprint_beats_copyright_beats_keyword() {
        let text = "Издательство: Книговек, 2018\n© ООО «Издательство АСТ», 2010\nМ.: Эксмо, 2010";
        assert_eq!(extract(text).publisher.as_deref(), Some("Эксмо"));

        let text = "Издательство: Книговек, 2018\n© ООО «Издательство АСТ», 2010";
        assert_eq!(extract(text).publisher.as_deref(), Some("АСТ"));

        let text = "Издательство: Книговек, 2018";
        assert_eq!(extract(text).publisher.as_deref(), Some("Книговек"));
    }

    #[test]
    fn test_city_fallback_needs_year_on_line() {
        assert_eq!(extract("Москва, 2015").city.as_deref(), Some("Москва"));
        assert_eq!(extract("Поездка в Москва-Сити").city, None);
    }

    #[test]
    fn test_empty_lexicon_disables_imprint_pattern() {
        let lexicon = Lexicon {
            publishers: Vec::new(),
            cities: Vec::new(),
        };
        let imprint = ImprintMatcher::new(&lexicon).extract("М.: Эксмо, 2010", &lexicon);
        assert_eq!(imprint, Imprint::default());
    }
}
