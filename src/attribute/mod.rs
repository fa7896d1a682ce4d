//! Marker-free citation strategy: attribute each answer sentence to the
//! reference source it most plausibly came from, then anchor short literal
//! overlaps as links. Best effort; scoring ties go to the first source in
//! the library's fixed order.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::retrieve::text::{is_stop_word, score_sentence_against_section};
use crate::render::CiteSpan;
use crate::sources::types::ReferenceSource;

/// Single words never worth linking on their own.
const DENYLIST_SINGLE_WORD: &[&str] = &[
    "there", "here", "this", "that", "it", "they", "their", "our", "your", "and", "the", "or",
];

static SENTENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^.!?]+[.!?]?").unwrap());

/// One reference source prepared for attribution scoring.
#[derive(Debug, Clone)]
pub struct AttributionSource {
    pub url: String,
    pub text: String,
    text_lower: String,
}

impl AttributionSource {
    pub fn new(url: String, text: String) -> Self {
        let text_lower = text.to_lowercase();
        Self {
            url,
            text,
            text_lower,
        }
    }

    /// Build attribution inputs from the loaded library, keeping only
    /// sources that have a citation target.
    pub fn from_library(sources: &[ReferenceSource]) -> Vec<Self> {
        sources
            .iter()
            .filter_map(|s| {
                s.url
                    .as_ref()
                    .map(|url| Self::new(url.clone(), s.body_text()))
            })
            .collect()
    }
}

#[derive(Debug)]
struct Sentence<'a> {
    text: &'a str,
    start: usize,
}

fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    SENTENCE_RE
        .find_iter(text)
        .filter(|m| !m.as_str().trim().is_empty())
        .map(|m| Sentence {
            text: m.as_str(),
            start: m.start(),
        })
        .collect()
}

fn has_digit_or_percent(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit() || c == '%')
}

/// Whether a 1-3 word gram is worth anchoring: not too short, no filler
/// single words, and either numeric or carrying at least one content word.
fn is_linkable_gram(gram: &str) -> bool {
    let words: Vec<&str> = gram.split_whitespace().collect();
    if words.is_empty() || words.len() > 3 {
        return false;
    }
    if gram.chars().count() < 3 && !has_digit_or_percent(gram) {
        return false;
    }
    if words.len() == 1 && DENYLIST_SINGLE_WORD.contains(&words[0].to_lowercase().as_str()) {
        return false;
    }
    if has_digit_or_percent(gram) {
        return true;
    }
    words.iter().any(|w| !is_stop_word(&w.to_lowercase()))
}

/// Word tokens of a source text with original casing, currency and percent
/// marks kept so figures stay anchorable.
fn source_tokens(text: &str) -> Vec<String> {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || matches!(c, '%' | '$' | '\u{20ac}' | '\u{a3}' | '-') {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .map(String::from)
        .collect()
}

/// All linkable 1-3 grams of a source, longest first, deduplicated with
/// first-seen order preserved within each length.
fn candidate_grams(text: &str) -> Vec<String> {
    let tokens = source_tokens(text);
    let mut seen = HashSet::new();
    let mut grams = Vec::new();
    for n in (1..=3).rev() {
        for window in tokens.windows(n) {
            let gram = window.join(" ");
            if !is_linkable_gram(&gram) {
                continue;
            }
            if seen.insert(gram.to_lowercase()) {
                grams.push(gram);
            }
        }
    }
    grams.sort_by_key(|g| std::cmp::Reverse(g.split_whitespace().count()));
    grams
}

/// First word-boundary, case-insensitive occurrence of `gram` in `hay`.
fn find_gram(hay: &str, hay_lower: &str, gram_lower: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(pos) = hay_lower[from..].find(gram_lower) {
        let start = from + pos;
        let end = start + gram_lower.len();
        let left_ok = hay[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let right_ok = hay[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if left_ok && right_ok {
            return Some((start, end));
        }
        from = end;
    }
    None
}

fn matches_in_sentence(sentence: &Sentence<'_>, source: &AttributionSource) -> Vec<CiteSpan> {
    let hay = sentence.text;
    let hay_lower = hay.to_lowercase();
    // Case folding that changes byte length would break offset math; such
    // sentences just go unanchored (attribution is best effort).
    if hay_lower.len() != hay.len() {
        return Vec::new();
    }

    let mut covered: Vec<(usize, usize)> = Vec::new();
    let mut spans = Vec::new();
    for gram in candidate_grams(&source.text) {
        let gram_lower = gram.to_lowercase();
        let Some((start, end)) = find_gram(hay, &hay_lower, &gram_lower) else {
            continue;
        };
        if covered.iter().any(|&(s, e)| start < e && s < end) {
            continue;
        }
        covered.push((start, end));
        spans.push(CiteSpan {
            start: sentence.start + start,
            end: sentence.start + end,
            url: source.url.clone(),
            text: hay[start..end].to_string(),
        });
    }
    spans.sort_by_key(|s| s.start);
    spans
}

/// Attribute an answer to sources sentence-by-sentence and emit the final
/// anchor spans: at most one per distinct URL (the longest match wins, ties
/// to the earliest), no overlaps, sorted by position.
pub fn attribute_sentences(
    answer: &str,
    sources: &[AttributionSource],
    score_threshold: u32,
) -> Vec<CiteSpan> {
    if sources.is_empty() {
        return Vec::new();
    }

    let mut all: Vec<CiteSpan> = Vec::new();
    for sentence in split_sentences(answer) {
        let mut best: Option<&AttributionSource> = None;
        let mut best_score = 0;
        for source in sources {
            let score = score_sentence_against_section(sentence.text, &source.text_lower);
            if score > best_score {
                best = Some(source);
                best_score = score;
            }
        }
        let Some(source) = best else { continue };
        if best_score < score_threshold {
            continue;
        }
        all.extend(matches_in_sentence(&sentence, source));
    }

    // One visible link per source per message.
    let mut by_url: HashMap<&str, &CiteSpan> = HashMap::new();
    for span in &all {
        let replace = match by_url.get(span.url.as_str()) {
            None => true,
            Some(prev) => {
                span.len() > prev.len() || (span.len() == prev.len() && span.start < prev.start)
            }
        };
        if replace {
            by_url.insert(&span.url, span);
        }
    }

    let mut unique: Vec<CiteSpan> = by_url.values().map(|s| (*s).clone()).collect();
    unique.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| b.len().cmp(&a.len()))
    });

    let mut out: Vec<CiteSpan> = Vec::new();
    let mut last_end = 0;
    for span in unique {
        if !out.is_empty() && span.start < last_end {
            continue;
        }
        last_end = span.end;
        out.push(span);
    }
    out
}
