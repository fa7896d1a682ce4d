//! Parsing of the model's citation output: the `CITES:` trailer line and the
//! inline `[[cite: LABEL]]` markers.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::resolve::canonicalize_label;

static CITES_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*CITES:\s*(.*)$").unwrap());

static CITES_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*CITES:").unwrap());

static PAIRED_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\[\[cite:\s*([^\]]+?)\s*\]\](.*?)\[\[/cite\]\]").unwrap()
});

static STANDALONE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[\[cite:\s*([^\]]+?)\s*\]\]").unwrap());

/// Labels from the first `CITES:` line, split on `|`, in order, duplicates
/// kept. Empty when no trailer is present.
pub fn extract_cites_labels(text: &str) -> Vec<String> {
    let Some(caps) = CITES_LINE_RE.captures(text) else {
        return Vec::new();
    };
    caps.get(1)
        .map(|m| m.as_str())
        .unwrap_or("")
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Drop every `CITES:` line, preserving the order of the remaining lines.
pub fn strip_cites_line(text: &str) -> String {
    text.lines()
        .filter(|line| !CITES_PREFIX_RE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// One inline citation marker found in the answer text.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineMarker {
    pub label: String,
    /// Wrapped text for paired markers; `None` for standalone markers.
    pub inner: Option<String>,
    /// Byte range of the whole marker (tags included) in the scanned text.
    pub start: usize,
    pub end: usize,
}

/// Scan left-to-right for paired and standalone markers. Paired matches are
/// found first; standalone matches inside a paired region are ignored
/// (markers do not nest).
pub fn extract_inline_markers(text: &str) -> Vec<InlineMarker> {
    let mut markers: Vec<InlineMarker> = Vec::new();

    for caps in PAIRED_MARKER_RE.captures_iter(text) {
        let all = caps.get(0).unwrap();
        markers.push(InlineMarker {
            label: caps[1].trim().to_string(),
            inner: Some(caps[2].to_string()),
            start: all.start(),
            end: all.end(),
        });
    }

    for caps in STANDALONE_MARKER_RE.captures_iter(text) {
        let all = caps.get(0).unwrap();
        let inside_paired = markers
            .iter()
            .any(|m| m.inner.is_some() && all.start() >= m.start && all.end() <= m.end);
        if inside_paired {
            continue;
        }
        markers.push(InlineMarker {
            label: caps[1].trim().to_string(),
            inner: None,
            start: all.start(),
            end: all.end(),
        });
    }

    markers.sort_by_key(|m| m.start);
    markers
}

/// Canonicalize, deduplicate preserving order, and cap the label list.
pub fn clamp_labels_unique(labels: &[String], max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw in labels {
        let canonical = canonicalize_label(raw);
        if seen.insert(canonical.clone()) {
            out.push(canonical);
            if out.len() >= max {
                break;
            }
        }
    }
    out
}

/// Remove markers whose canonical label is not in `allowed`: paired markers
/// unwrap to their inner text, standalone markers are deleted outright.
pub fn prune_markers_not_in(text: &str, allowed: &[String]) -> String {
    let allowed: HashSet<String> = allowed.iter().map(|l| canonicalize_label(l)).collect();

    let text = PAIRED_MARKER_RE.replace_all(text, |caps: &regex::Captures<'_>| {
        if allowed.contains(&canonicalize_label(&caps[1])) {
            caps[0].to_string()
        } else {
            caps[2].to_string()
        }
    });
    STANDALONE_MARKER_RE
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            if allowed.contains(&canonicalize_label(&caps[1])) {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}
