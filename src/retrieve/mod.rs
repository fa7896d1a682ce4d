pub mod text;

use crate::config::RetrievalConfig;
use crate::sources::types::{ReferenceSource, SourceBody};

use text::{QueryClass, QueryTerms};

/// Appended when the assembled block overflows the character budget. Kept
/// stable so downstream checks can detect truncation instead of treating the
/// marker as content.
pub const TRUNCATION_MARKER: &str = "--- [content truncated] ---";

/// Header line the assembled block always starts with.
pub const REFERENCE_INTRO: &str = "Reference Information:";

/// One labeled section of selected reference content.
#[derive(Debug, Clone)]
pub struct Section {
    pub label: String,
    pub body: String,
}

/// Ranked, capped selection of reference snippets for one query.
#[derive(Debug, Clone)]
pub struct SelectedContext {
    pub prose: Vec<Section>,
    pub tables: Vec<Section>,
    /// True when the query was specific and matched at least one
    /// paragraph or row; false for the generic fallback summary.
    pub matched: bool,
}

/// A candidate table row with its weighted overlap score.
#[derive(Debug)]
struct ScoredRow {
    text: String,
    score: u32,
    position: usize,
}

/// Split prose into paragraphs on blank-line boundaries (lines holding only
/// whitespace count as blank).
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }
    paragraphs
}

/// A paragraph qualifies when it contains a quoted phrase literally, or at
/// least `min(2, term_count)` distinct query tokens as substrings.
fn paragraph_matches(paragraph_lower: &str, query: &QueryTerms) -> bool {
    if query
        .phrases
        .iter()
        .any(|p| paragraph_lower.contains(p.as_str()))
    {
        return true;
    }
    if query.terms.is_empty() {
        return true;
    }
    let needed = query.terms.len().min(2);
    let mut hits = 0;
    for term in &query.terms {
        if paragraph_lower.contains(term.as_str()) {
            hits += 1;
            if hits >= needed {
                return true;
            }
        }
    }
    false
}

/// Distinct query tokens present in a JSON-rendered row.
fn row_score(row_json_lower: &str, terms: &[String]) -> usize {
    terms
        .iter()
        .filter(|t| row_json_lower.contains(t.as_str()))
        .count()
}

fn select_prose(source: &ReferenceSource, query: &QueryTerms, cfg: &RetrievalConfig) -> Option<Section> {
    let SourceBody::Text(body) = &source.body else {
        return None;
    };
    let mut picked = Vec::new();
    for paragraph in split_paragraphs(body) {
        if paragraph_matches(&paragraph.to_lowercase(), query) {
            picked.push(paragraph);
            if picked.len() >= cfg.max_snippets_per_source {
                break;
            }
        }
    }
    if picked.is_empty() {
        return None;
    }
    Some(Section {
        label: format!("{} (snippets {})", source.label, picked.len()),
        body: picked.join("\n\n"),
    })
}

fn select_rows(source: &ReferenceSource, query: &QueryTerms, cfg: &RetrievalConfig) -> Option<Section> {
    let SourceBody::Rows(rows) = &source.body else {
        return None;
    };
    let needed = query.terms.len().min(2);
    let mut scored: Vec<ScoredRow> = Vec::new();
    for (position, row) in rows.iter().enumerate() {
        let rendered = serde_json::to_string(row).unwrap_or_default();
        let distinct = row_score(&rendered.to_lowercase(), &query.terms);
        if distinct >= needed && distinct > 0 {
            scored.push(ScoredRow {
                score: text::score_overlap(&rendered, &query.terms, &query.phrases),
                text: rendered,
                position,
            });
        }
    }
    if scored.is_empty() {
        return None;
    }
    // Highest overlap first; document order breaks ties so output is stable.
    scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.position.cmp(&b.position)));
    scored.truncate(cfg.query_row_cap);
    Some(Section {
        label: format!("{} (rows {})", source.label, scored.len()),
        body: scored
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

/// Deterministic compact summary used for empty/generic queries and as the
/// fallback when nothing matched: the first portion of every source.
fn generic_summary(sources: &[ReferenceSource], cfg: &RetrievalConfig) -> SelectedContext {
    let mut prose = Vec::new();
    let mut tables = Vec::new();

    for source in sources {
        match &source.body {
            SourceBody::Text(body) => {
                let mut summary = String::new();
                for paragraph in split_paragraphs(body) {
                    if !summary.is_empty()
                        && summary.chars().count() + paragraph.chars().count()
                            > cfg.generic_paragraph_chars
                    {
                        break;
                    }
                    if !summary.is_empty() {
                        summary.push_str("\n\n");
                    }
                    summary.push_str(&paragraph);
                    if summary.chars().count() >= cfg.generic_paragraph_chars {
                        break;
                    }
                }
                if summary.chars().count() > cfg.generic_paragraph_chars {
                    summary = summary.chars().take(cfg.generic_paragraph_chars).collect();
                }
                if !summary.is_empty() {
                    prose.push(Section {
                        label: source.label.clone(),
                        body: summary,
                    });
                }
            }
            SourceBody::Rows(rows) => {
                let sample: Vec<String> = rows
                    .iter()
                    .take(cfg.generic_row_sample)
                    .map(|r| serde_json::to_string(r).unwrap_or_default())
                    .collect();
                if !sample.is_empty() {
                    tables.push(Section {
                        label: format!("{} (first {} rows)", source.label, sample.len()),
                        body: sample.join("\n"),
                    });
                }
            }
        }
    }

    SelectedContext {
        prose,
        tables,
        matched: false,
    }
}

/// Select a relevance-ranked, capped set of snippets for a query. Generic
/// and unmatched queries fall back to the compact summary so the model never
/// loses grounding entirely.
pub fn select_snippets(
    query: &str,
    sources: &[ReferenceSource],
    cfg: &RetrievalConfig,
) -> SelectedContext {
    let parsed = QueryTerms::parse(query);
    match parsed.classify(cfg.generic_token_threshold) {
        QueryClass::Empty | QueryClass::Generic => return generic_summary(sources, cfg),
        QueryClass::Specific => {}
    }

    let mut prose = Vec::new();
    let mut tables = Vec::new();
    for source in sources {
        if source.is_tabular() {
            if let Some(section) = select_rows(source, &parsed, cfg) {
                tables.push(section);
            }
        } else if let Some(section) = select_prose(source, &parsed, cfg) {
            prose.push(section);
        }
    }

    if prose.is_empty() && tables.is_empty() {
        return generic_summary(sources, cfg);
    }

    SelectedContext {
        prose,
        tables,
        matched: true,
    }
}

/// Join the intro header and the selected sections, prose first, under the
/// global character budget. The budget is enforced here even when the
/// selector's own caps were generous.
pub fn assemble_context(selected: &SelectedContext, cfg: &RetrievalConfig) -> String {
    let mut parts = vec![REFERENCE_INTRO.to_string()];
    for section in selected.prose.iter().chain(selected.tables.iter()) {
        parts.push(format!("--- {} ---\n{}", section.label, section.body));
    }
    let joined = parts.join("\n\n");

    if joined.chars().count() <= cfg.max_context_chars {
        return joined;
    }
    let truncated: String = joined.chars().take(cfg.max_context_chars).collect();
    format!("{}\n\n{}", truncated, TRUNCATION_MARKER)
}
