use std::collections::HashSet;

/// Filler words ignored when classifying queries and scoring sentences.
pub const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "to", "of", "in", "on", "for", "a", "an", "by", "with", "as", "is", "are",
    "be", "was", "were", "this", "that", "these", "those", "here", "there", "it", "its", "at",
    "from", "into", "over", "under", "about", "your", "you", "we", "our", "us", "they", "their",
    "what", "which", "where", "when", "does", "have", "how", "could", "would", "should", "will",
    "can", "do", "me", "my", "i", "please", "tell", "know",
];

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Lowercase a string and split it into alphanumeric tokens. `%` is kept as
/// part of a token so figures like "15%" survive intact.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '%' {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// A user query parsed into loose terms and quoted phrases.
#[derive(Debug, Clone, Default)]
pub struct QueryTerms {
    pub terms: Vec<String>,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryClass {
    Empty,
    Generic,
    Specific,
}

impl QueryTerms {
    /// Split a raw query into quoted phrases and individual tokens.
    /// Tokens are deduplicated preserving first-seen order.
    pub fn parse(query: &str) -> Self {
        let mut phrases = Vec::new();
        let mut rest = String::new();

        let mut in_quote = false;
        let mut current = String::new();
        for ch in query.chars() {
            if ch == '"' {
                if in_quote {
                    let phrase = current.trim().to_lowercase();
                    if !phrase.is_empty() {
                        phrases.push(phrase);
                    }
                    current.clear();
                }
                in_quote = !in_quote;
            } else if in_quote {
                current.push(ch);
            } else {
                rest.push(ch);
            }
        }
        // Unterminated quote: treat the remainder as plain text
        if !current.is_empty() {
            rest.push(' ');
            rest.push_str(&current);
        }

        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        for tok in tokenize(&rest).into_iter().chain(
            phrases.iter().flat_map(|p| tokenize(p)),
        ) {
            if seen.insert(tok.clone()) {
                terms.push(tok);
            }
        }

        Self { terms, phrases }
    }

    /// Classify the query. Generic means ungroundable: nothing but stop
    /// words, or a short query (at most `generic_token_threshold` tokens)
    /// carrying no more than one content word.
    pub fn classify(&self, generic_token_threshold: usize) -> QueryClass {
        if self.terms.is_empty() && self.phrases.is_empty() {
            return QueryClass::Empty;
        }
        let content_tokens = self.content_terms().len();
        if self.phrases.is_empty() && content_tokens == 0 {
            return QueryClass::Generic;
        }
        if self.phrases.is_empty()
            && content_tokens <= 1
            && self.terms.len() <= generic_token_threshold
        {
            return QueryClass::Generic;
        }
        QueryClass::Specific
    }

    /// Tokens that are not stop words, in order.
    pub fn content_terms(&self) -> Vec<&str> {
        self.terms
            .iter()
            .map(String::as_str)
            .filter(|t| !is_stop_word(t))
            .collect()
    }
}

/// Count non-overlapping literal occurrences of `needle` in `haystack`.
/// Both sides are expected to be lowercase already.
fn count_occurrences(haystack: &str, needle: &str) -> u32 {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        count += 1;
        from += pos + needle.len();
    }
    count
}

/// Literal-overlap score of a candidate passage against query terms and
/// phrases: each phrase occurrence counts double, each term occurrence once.
pub fn score_overlap(candidate: &str, terms: &[String], phrases: &[String]) -> u32 {
    let hay = candidate.to_lowercase();
    let mut score = 0;
    for phrase in phrases {
        score += 2 * count_occurrences(&hay, phrase);
    }
    for term in terms {
        score += count_occurrences(&hay, term);
    }
    score
}

/// True when `word` occurs in `haystack` bounded by non-alphanumeric
/// characters (or the string edges). Both arguments lowercase.
pub fn contains_word(haystack: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(word) {
        let start = from + pos;
        let end = start + word.len();
        let left_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let right_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if left_ok && right_ok {
            return true;
        }
        from = end;
    }
    false
}

/// Weighted score of one answer sentence against a reference section.
/// Only whole-word hits count; numeric tokens weigh 3, long tokens 2,
/// everything else 1. `section_lower` must already be lowercased.
pub fn score_sentence_against_section(sentence: &str, section_lower: &str) -> u32 {
    let mut score = 0;
    for token in tokenize(sentence) {
        if is_stop_word(&token) {
            continue;
        }
        if !contains_word(section_lower, &token) {
            continue;
        }
        if token.chars().any(|c| c.is_ascii_digit()) {
            score += 3;
        } else if token.chars().count() >= 6 {
            score += 2;
        } else {
            score += 1;
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_keeps_percent() {
        assert_eq!(tokenize("Tax is 15% on super!"), vec!["tax", "is", "15%", "on", "super"]);
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(tokenize("Age-Pension (2024)"), vec!["age", "pension", "2024"]);
    }

    #[test]
    fn test_parse_extracts_quoted_phrases() {
        let q = QueryTerms::parse(r#"what is the "Age Pension" rate"#);
        assert_eq!(q.phrases, vec!["age pension"]);
        assert!(q.terms.contains(&"rate".to_string()));
        assert!(q.terms.contains(&"age".to_string()));
    }

    #[test]
    fn test_classify_empty_and_generic() {
        assert_eq!(QueryTerms::parse("").classify(2), QueryClass::Empty);
        assert_eq!(QueryTerms::parse("   ??? ").classify(2), QueryClass::Empty);
        assert_eq!(QueryTerms::parse("the what").classify(2), QueryClass::Generic);
        assert_eq!(QueryTerms::parse("super").classify(2), QueryClass::Generic);
        assert_eq!(
            QueryTerms::parse("When can I access my super after redundancy?").classify(2),
            QueryClass::Specific
        );
    }

    #[test]
    fn test_score_overlap_weights_phrases_double() {
        let terms = vec!["pension".to_string()];
        let phrases = vec!["age pension".to_string()];
        // "age pension" once (x2) + "pension" twice (x1 each)
        let score = score_overlap("The Age Pension is a pension.", &terms, &phrases);
        assert_eq!(score, 4);
    }

    #[test]
    fn test_contains_word_requires_boundaries() {
        assert!(contains_word("the age pension rate", "pension"));
        assert!(!contains_word("suspension bridge", "pension"));
        assert!(contains_word("rate: 7.5%", "7"));
    }

    #[test]
    fn test_sentence_score_weights() {
        let section = "the age pension age is 67 years for most australians";
        // "67" -> 3 (digit), "pension" -> 2 (len >= 6), "age" -> 1
        let score = score_sentence_against_section("Pension age is 67", section);
        assert_eq!(score, 3 + 2 + 1);
    }

    #[test]
    fn test_sentence_score_ignores_missing_and_stop_words() {
        let section = "superannuation guarantee contributions";
        assert_eq!(score_sentence_against_section("What is the weather", section), 0);
    }
}
