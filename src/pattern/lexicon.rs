//! Closed lists of known publishers and cities.
//!
//! Built-in defaults cover the common Russian imprints; a JSON file with the
//! same shape can replace them at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// A city under its canonical name plus the spellings seen on imprint pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl CityEntry {
    fn new(name: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lexicon {
    #[serde(default = "default_publishers")]
    pub publishers: Vec<String>,
    #[serde(default = "default_cities")]
    pub cities: Vec<CityEntry>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            publishers: default_publishers(),
            cities: default_cities(),
        }
    }
}

fn default_publishers() -> Vec<String> {
    [
        "Азбука-классика",
        "Азбука",
        "АСТ",
        "Эксмо",
        "Питер",
        "МИФ",
        "Росмэн",
        "Детская литература",
        "Просвещение",
        "ОЛМА",
        "Альпина",
        "Наука",
        "Художественная литература",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_cities() -> Vec<CityEntry> {
    vec![
        CityEntry::new("Москва", &["М."]),
        CityEntry::new(
            "Санкт-Петербург",
            &["СПб.", "СПб", "С.-Петербург", "Петербург"],
        ),
        CityEntry::new("Киев", &[]),
        CityEntry::new("Минск", &[]),
        CityEntry::new("Екатеринбург", &[]),
        CityEntry::new("Новосибирск", &[]),
        CityEntry::new("Moscow", &[]),
        CityEntry::new("Saint Petersburg", &["St. Petersburg"]),
        CityEntry::new("London", &[]),
        CityEntry::new("New York", &[]),
    ]
}

impl Lexicon {
    /// Load a lexicon from a JSON file. Missing keys keep the built-in lists.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon: {:?}", path))?;
        let lexicon: Lexicon = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse lexicon: {:?}", path))?;
        info!(
            "Loaded lexicon from {:?}: {} publishers, {} cities",
            path,
            lexicon.publishers.len(),
            lexicon.cities.len()
        );
        Ok(lexicon)
    }

    /// Every city spelling paired with its canonical name, longest spelling first.
    pub fn city_spellings(&self) -> Vec<(String, String)> {
        let mut spellings: Vec<(String, String)> = self
            .cities
            .iter()
            .flat_map(|city| {
                std::iter::once(city.name.clone())
                    .chain(city.aliases.iter().cloned())
                    .map(move |s| (s, city.name.clone()))
            })
            .filter(|(s, _)| !s.trim().is_empty())
            .collect();
        spellings.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
        spellings
    }

    /// First known publisher named as a whole word in `text`; longer names win.
    pub fn find_publisher(&self, text: &str) -> Option<&str> {
        let mut publishers: Vec<&String> = self.publishers.iter().collect();
        publishers.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
        publishers
            .into_iter()
            .find(|p| contains_word(text, p))
            .map(|p| p.as_str())
    }

    /// Canonical name of the first full city name (not abbreviation) found in `text`.
    pub fn find_city_name(&self, text: &str) -> Option<&str> {
        self.cities
            .iter()
            .find(|city| {
                std::iter::once(&city.name)
                    .chain(city.aliases.iter())
                    .filter(|s| s.chars().count() > 3 && !s.contains('.'))
                    .any(|s| contains_word(text, s))
            })
            .map(|city| city.name.as_str())
    }
}

/// Case-insensitive search for `needle` not embedded in a longer word.
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(&needle).any(|(start, m)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + m.len()..].chars().next();
        !before.map_or(false, char::is_alphabetic) && !after.map_or(false, char::is_alphabetic)
    })
}
