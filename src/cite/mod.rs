//! Inline-marker citation strategy: turn the model's `[[cite: LABEL]]`
//! markers into anchor spans over the cleaned answer text.

pub mod extract;
pub mod resolve;

use std::sync::LazyLock;

use regex::Regex;

use crate::render::CiteSpan;
use extract::extract_inline_markers;
use resolve::resolve_label;

/// Short domain phrases preferred as anchor text over a bare word count,
/// each tied to the catalog label whose page defines the term.
static KEYWORD_ANCHORS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)\btax[- ]free component\b").unwrap(),
            "ATO (Tax on super income streams)",
        ),
        (
            Regex::new(r"(?i)\btaxable component\b").unwrap(),
            "ATO (Tax on super income streams)",
        ),
        (
            Regex::new(r"(?i)\b(?:taxed|untaxed)\s+(?:source|fund)\b").unwrap(),
            "ATO (Tax on super income streams)",
        ),
        (
            Regex::new(r"(?i)\bsuper(?:annuation)? income stream\b").unwrap(),
            "ATO (Tax on super income streams)",
        ),
    ]
});

static FIRST_WORDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\S+(?:\s+\S+){0,2})").unwrap());

static LAST_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\$?\d[\d,]*(?:\.\d+)?%?)\s*$").unwrap());

static LAST_WORDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S+(?:\s+\S+){0,2})\s*$").unwrap());

fn overlaps_any(spans: &[CiteSpan], start: usize, end: usize) -> bool {
    spans.iter().any(|s| start < s.end && s.start < end)
}

/// Anchor range inside a paired marker's wrapped text: a known keyword
/// phrase if one occurs, otherwise the first 1-3 words. Returns the range
/// plus the URL override a keyword match carries.
fn anchor_in_inner(inner: &str, default_url: &'static str) -> Option<(usize, usize, &'static str)> {
    for (re, label) in KEYWORD_ANCHORS.iter() {
        if let Some(m) = re.find(inner) {
            let url = resolve_label(label).unwrap_or(default_url);
            return Some((m.start(), m.end(), url));
        }
    }
    FIRST_WORDS_RE
        .captures(inner)
        .and_then(|c| c.get(1))
        .map(|m| (m.start(), m.end(), default_url))
}

/// Anchor range looking back from a standalone marker: last keyword phrase
/// on the emitted line, else the trailing number, else the last 1-3 words.
fn anchor_in_lookback(line: &str, default_url: &'static str) -> Option<(usize, usize, &'static str)> {
    let mut last_keyword: Option<(usize, usize, &'static str)> = None;
    for (re, label) in KEYWORD_ANCHORS.iter() {
        for m in re.find_iter(line) {
            let url = resolve_label(label).unwrap_or(default_url);
            match last_keyword {
                Some((start, _, _)) if m.start() <= start => {}
                _ => last_keyword = Some((m.start(), m.end(), url)),
            }
        }
    }
    if last_keyword.is_some() {
        return last_keyword;
    }
    if let Some(c) = LAST_NUMBER_RE.captures(line).and_then(|c| c.get(1)) {
        return Some((c.start(), c.end(), default_url));
    }
    LAST_WORDS_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| (m.start(), m.end(), default_url))
}

/// Strip every inline marker out of `text`, producing the user-visible
/// answer plus at most `max_refs` anchor spans over it. Markers whose label
/// resolves to nothing contribute their wrapped text unlinked.
pub fn markers_to_spans(text: &str, max_refs: usize) -> (String, Vec<CiteSpan>) {
    let markers = extract_inline_markers(text);
    if markers.is_empty() {
        return (text.to_string(), Vec::new());
    }

    let mut out = String::with_capacity(text.len());
    let mut spans: Vec<CiteSpan> = Vec::new();
    let mut cursor = 0;

    for marker in &markers {
        if marker.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..marker.start]);
        cursor = marker.end;

        let url = resolve_label(&marker.label);

        match &marker.inner {
            Some(inner) => {
                let inner_at = out.len();
                out.push_str(inner);
                let Some(url) = url else { continue };
                if spans.len() >= max_refs {
                    continue;
                }
                if let Some((rel_start, rel_end, url)) = anchor_in_inner(inner, url) {
                    let (start, end) = (inner_at + rel_start, inner_at + rel_end);
                    if !overlaps_any(&spans, start, end) {
                        spans.push(CiteSpan {
                            start,
                            end,
                            url: url.to_string(),
                            text: out[start..end].to_string(),
                        });
                    }
                }
            }
            None => {
                let Some(url) = url else { continue };
                if spans.len() >= max_refs {
                    continue;
                }
                let line_at = out.rfind('\n').map(|i| i + 1).unwrap_or(0);
                if let Some((rel_start, rel_end, url)) = anchor_in_lookback(&out[line_at..], url) {
                    let (start, end) = (line_at + rel_start, line_at + rel_end);
                    if !overlaps_any(&spans, start, end) {
                        spans.push(CiteSpan {
                            start,
                            end,
                            url: url.to_string(),
                            text: out[start..end].to_string(),
                        });
                    }
                }
            }
        }
    }
    out.push_str(&text[cursor..]);

    spans.sort_by_key(|s| s.start);
    (out, spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standalone_marker_anchors_trailing_number() {
        let (clean, spans) = markers_to_spans("Rates changed in 2024 [[cite: ATO.txt]]", 4);
        assert!(!clean.contains("[[cite:"));
        assert!(!clean.contains("[[/cite]]"));
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "2024");
        assert!(spans[0].url.contains("ato.gov.au"));
    }

    #[test]
    fn test_paired_marker_anchors_leading_words() {
        let (clean, spans) =
            markers_to_spans("See [[cite: ATO.txt]]the retirement guide today[[/cite]].", 4);
        assert_eq!(clean, "See the retirement guide today.");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "the retirement guide");
        assert_eq!(&clean[spans[0].start..spans[0].end], "the retirement guide");
    }

    #[test]
    fn test_paired_marker_prefers_keyword_phrase() {
        let (clean, spans) = markers_to_spans(
            "Info: [[cite: MoneySmart (Tax and super)]]about the tax-free component of super[[/cite]]",
            4,
        );
        assert!(clean.contains("tax-free component"));
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "tax-free component");
        // Keyword anchors route to the page defining the term.
        assert!(spans[0].url.contains("super-income-stream-tax-tables"));
    }

    #[test]
    fn test_unresolvable_label_keeps_text_unlinked() {
        let (clean, spans) =
            markers_to_spans("Fact [[cite: Unknown Thing]]claimed here[[/cite]].", 4);
        assert_eq!(clean, "Fact claimed here.");
        assert!(spans.is_empty());
    }

    #[test]
    fn test_ref_cap_still_strips_markers() {
        let text = "\
a1 [[cite: ATO.txt]]\n\
b2 [[cite: SuperConsumersAustralia.txt]]\n\
c3 [[cite: DSS_Demographics.csv]]\n\
d4 [[cite: ABS_Retirement_Comparison.xlsx / Sheet1]]\n\
e5 [[cite: Services Australia (Age Pension)]]";
        let (clean, spans) = markers_to_spans(text, 4);
        assert!(!clean.contains("[[cite:"));
        assert_eq!(spans.len(), 4);
    }

    #[test]
    fn test_spans_are_ordered_and_disjoint() {
        let (clean, spans) = markers_to_spans(
            "The pension rose [[cite: ATO.txt]] and fees fell [[cite: SuperConsumersAustralia.txt]]",
            4,
        );
        assert!(!clean.contains("[["));
        for pair in spans.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }
}
