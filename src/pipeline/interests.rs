use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;

static BULLET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*\u{2022}]+|\d+[.)])\s*").expect("valid bullet regex")
});

const MAX_INTEREST_WORDS: usize = 3;
const TEEN_CAP: usize = 7;

pub const FALLBACK_INTERESTS: [&str; 7] = [
    "technology",
    "fashion",
    "home decor",
    "books",
    "fitness",
    "cooking",
    "music",
];

const CHILD_INTERESTS: [&str; 7] = [
    "toys",
    "games",
    "art supplies",
    "books",
    "educational toys",
    "sports equipment",
    "creative activities",
];

const TEEN_INTERESTS: [&str; 5] = ["gaming", "sports", "music", "art", "technology"];

fn push_unique(target: &mut Vec<String>, value: String) {
    if !value.is_empty() && !target.contains(&value) {
        target.push(value);
    }
}

pub fn fallback_interests() -> Vec<String> {
    FALLBACK_INTERESTS.iter().map(|s| s.to_string()).collect()
}

fn clean_interest(line: &str) -> String {
    let stripped = BULLET_RE.replace(line, "");
    stripped
        .trim()
        .trim_matches(|ch: char| matches!(ch, '"' | '\'' | '.' | ',' | ':' | ';'))
        .trim()
        .to_lowercase()
}

/// Line-oriented interest list from a completion.
///
/// Entries longer than three words are treated as prose and dropped. An
/// empty result becomes [`FALLBACK_INTERESTS`].
pub fn parse_interest_lines(raw: &str) -> Vec<String> {
    let mut interests = Vec::new();
    for line in raw.lines() {
        let interest = clean_interest(line);
        if interest.split_whitespace().count() > MAX_INTEREST_WORDS {
            continue;
        }
        push_unique(&mut interests, interest);
    }

    if interests.is_empty() {
        fallback_interests()
    } else {
        interests
    }
}

/// Under 13 gets a fixed child-appropriate list; 13 to 17 gets a teen set
/// appended and capped; adults keep their interests as given.
pub fn adjust_interests_by_age(interests: Vec<String>, age: u32) -> Vec<String> {
    if age < 13 {
        return CHILD_INTERESTS.iter().map(|s| s.to_string()).collect();
    }
    if age < 18 {
        let mut adjusted = Vec::new();
        for interest in interests
            .into_iter()
            .chain(TEEN_INTERESTS.iter().map(|s| s.to_string()))
        {
            push_unique(&mut adjusted, interest);
        }
        adjusted.truncate(TEEN_CAP);
        return adjusted;
    }
    interests
}

/// Deduplicates, optionally shuffles, and keeps the first `limit` interests.
pub fn select_interests(interests: Vec<String>, limit: usize, shuffle: bool) -> Vec<String> {
    let mut unique = Vec::new();
    for interest in interests {
        push_unique(&mut unique, interest.trim().to_lowercase());
    }
    if shuffle {
        unique.shuffle(&mut rand::rng());
    }
    unique.truncate(limit);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_bulleted_and_numbered_lines() {
        let raw = "1. Hiking\n- Coffee\n* Film photography\n\u{2022} Dogs\n\nThe person seems to enjoy the outdoors a lot\nhiking";
        assert_eq!(
            parse_interest_lines(raw),
            strings(&["hiking", "coffee", "film photography", "dogs"])
        );
    }

    #[test]
    fn empty_or_prose_output_falls_back() {
        assert_eq!(parse_interest_lines(""), fallback_interests());
        assert_eq!(
            parse_interest_lines("I am unable to determine interests from this image."),
            fallback_interests()
        );
    }

    #[test]
    fn children_get_fixed_list() {
        let adjusted = adjust_interests_by_age(strings(&["wine"]), 9);
        assert_eq!(adjusted.len(), 7);
        assert!(adjusted.contains(&"educational toys".to_string()));
        assert!(!adjusted.contains(&"wine".to_string()));
    }

    #[test]
    fn teens_get_capped_merge() {
        let adjusted = adjust_interests_by_age(strings(&["music", "skating", "anime", "chess"]), 15);
        assert_eq!(
            adjusted,
            strings(&["music", "skating", "anime", "chess", "gaming", "sports", "art"])
        );
    }

    #[test]
    fn adults_are_unchanged() {
        let interests = strings(&["wine", "travel"]);
        assert_eq!(adjust_interests_by_age(interests.clone(), 30), interests);
    }

    #[test]
    fn selection_dedupes_and_limits() {
        let picked = select_interests(strings(&["Books", "books", "tea", "yoga", "golf"]), 3, false);
        assert_eq!(picked, strings(&["books", "tea", "yoga"]));

        let shuffled = select_interests(strings(&["a", "b", "c", "a"]), 5, true);
        assert_eq!(shuffled.len(), 3);
        for value in ["a", "b", "c"] {
            assert!(shuffled.contains(&value.to_string()));
        }
    }
}
