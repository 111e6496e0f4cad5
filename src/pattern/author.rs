//! Author heuristics: copyright holders first, standalone name lines second.

use once_cell::sync::Lazy;
use regex::Regex;

use super::lexicon::Lexicon;

static COPYRIGHT_HOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"©[ \t]*([А-ЯЁA-Z][^,©\n]+)").unwrap());

/// Initial plus surname, in any mix of Cyrillic and Latin script.
static INITIAL_SURNAME: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"[А-ЯЁ]\. ?[А-ЯЁ][а-яёА-ЯЁ]+").unwrap(),
        Regex::new(r"[A-Z]\. ?[A-Z][a-zA-Z]+").unwrap(),
        Regex::new(r"[A-Z]\. ?[А-ЯЁ][а-яёА-ЯЁ]+").unwrap(),
        Regex::new(r"[А-ЯЁ]\. ?[A-Z][a-zA-Z]+").unwrap(),
    ]
});

/// Role words that follow the name inside a copyright line.
static ROLE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(перевод|статьи|комментарии|оформление|иллюстрации).*").unwrap()
});
static YEAR_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\s*\b(?:19|20)[0-9]{2}\b.*$").unwrap());

static FULL_NAME_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([А-ЯЁ][а-яё]+[ \t]+[А-ЯЁ][а-яё]+)[ \t]*$").unwrap());
static SURNAME_INITIALS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([А-ЯЁA-Z][а-яёa-z]+[ \t]+[А-ЯЁA-Z]\.[ \t]*[А-ЯЁA-Z]\.)").unwrap()
});
static NOT_A_PERSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Москва|Санкт|Петербург|Издательств").unwrap());

/// Extract author names from imprint-page text, de-duplicated in first-seen order.
pub fn extract_authors(text: &str, lexicon: &Lexicon) -> Vec<String> {
    let mut authors: Vec<String> = Vec::new();

    for cap in COPYRIGHT_HOLDER.captures_iter(text) {
        let holder = cap[1].trim();
        if is_likely_publisher(holder, lexicon) {
            continue;
        }
        if !INITIAL_SURNAME.iter().any(|re| re.is_match(holder)) {
            continue;
        }
        if let Some(name) = clean_name(holder) {
            if !authors.contains(&name) {
                authors.push(name);
            }
        }
    }

    if authors.is_empty() {
        if let Some(name) = standalone_author(text, lexicon) {
            authors.push(name);
        }
    }
    authors
}

fn clean_name(holder: &str) -> Option<String> {
    let name = holder.split(',').next().unwrap_or_default();
    let name = ROLE_SUFFIX.replace(name, "");
    let name = YEAR_SUFFIX.replace(&name, "");
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    (name.chars().count() > 2).then_some(name)
}

fn standalone_author(text: &str, lexicon: &Lexicon) -> Option<String> {
    let full_name = FULL_NAME_LINE
        .captures_iter(text)
        .map(|cap| cap[1].trim().to_string())
        .find(|name| {
            !NOT_A_PERSON.is_match(name)
                && lexicon.find_city_name(name).is_none()
                && lexicon.find_publisher(name).is_none()
        });
    if full_name.is_some() {
        return full_name;
    }

    SURNAME_INITIALS_LINE
        .captures(text)
        .map(|cap| cap[1].trim().to_string())
}

fn is_likely_publisher(holder: &str, lexicon: &Lexicon) -> bool {
    let lower = holder.to_lowercase();
    lexicon.find_publisher(holder).is_some()
        || lower.contains("издательств")
        || lower.contains("publishing")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copyright_holders_with_initials() {
        let text = "© H. Горелов, перевод, статьи\nкомментарии, 2004\n\
                    © В, Пожидаев, оформление серии, 2004\n\
                    © «Азбука-классика», 2004";
        let authors = extract_authors(text, &Lexicon::default());
        assert_eq!(authors, vec!["H. Горелов".to_string()]);
    }

    #[test]
    fn test_publisher_copyright_is_not_an_author() {
        let text = "© ООО «Издательство АСТ», 2010\n© Эксмо, 2011";
        assert!(extract_authors(text, &Lexicon::default()).is_empty());
    }

    #[test]
    fn test_duplicates_collapse_in_first_seen_order() {
        let text = "© A. Smith, 2001\n© Б. Иванов 2001\n© A. Smith, illustrations";
        let authors = extract_authors(text, &Lexicon::default());
        assert_eq!(authors, vec!["A. Smith".to_string(), "Б. Иванов".to_string()]);
    }

    #[test]
    fn test_holder_without_comma_stops_at_line_end() {
        let text = "© Н. Горелов\nТираж 5000 экз.\nЗаказ № 123";
        assert_eq!(
            extract_authors(text, &Lexicon::default()),
            vec!["Н. Горелов".to_string()]
        );
    }

    #[test]
    fn test_standalone_full_name_line() {
        let text = "Москва Петербург\nИван Бунин\nТёмные аллеи";
        assert_eq!(extract_authors(text, &Lexicon::default()), vec!["Иван Бунин".to_string()]);
    }

    #[test]
    fn test_standalone_surname_with_initials() {
        let text = "Оформление художника\nВ. ДАНЧЕНКО\n\nБолотов А. Т.\nБ79   Жизнь и приключения";
        assert_eq!(
            extract_authors(text, &Lexicon::default()),
            vec!["Болотов А. Т.".to_string()]
        );
    }
}
