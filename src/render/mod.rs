//! Sanitized HTML generation from untrusted answer text: escaping, inline
//! citation anchors, and reflow of line-based text into paragraph/list blocks.

/// A character range of the answer text designated to become a hyperlink.
/// Offsets are byte offsets into the text handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct CiteSpan {
    pub start: usize,
    pub end: usize,
    pub url: String,
    pub text: String,
}

impl CiteSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Escape text for safe inclusion in element bodies and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn anchor(url: &str, inner_escaped: &str) -> String {
    let safe_url = escape_html(url);
    format!(
        "<a href=\"{url}\" target=\"_blank\" rel=\"noopener noreferrer\" title=\"{url}\">{inner}</a>",
        url = safe_url,
        inner = inner_escaped,
    )
}

/// Escape the whole text, wrapping each span in an anchor. Spans must be
/// sorted by start; anything malformed (overlapping, out of bounds, not on a
/// char boundary) is skipped rather than risking broken markup.
pub fn linkify(text: &str, spans: &[CiteSpan]) -> String {
    let mut out = String::with_capacity(text.len() + spans.len() * 96);
    let mut cursor = 0;
    for span in spans {
        if span.start < cursor
            || span.end > text.len()
            || span.start >= span.end
            || !text.is_char_boundary(span.start)
            || !text.is_char_boundary(span.end)
        {
            continue;
        }
        out.push_str(&escape_html(&text[cursor..span.start]));
        out.push_str(&anchor(&span.url, &escape_html(&text[span.start..span.end])));
        cursor = span.end;
    }
    out.push_str(&escape_html(&text[cursor..]));
    out
}

fn bullet_body(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    for marker in ["* ", "- ", "\u{2022} "] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    // Marker followed by a tab also counts
    for marker in ["*\t", "-\t", "\u{2022}\t"] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    None
}

/// Reflow line-based, already-escaped text (which may contain our anchors)
/// into block structure: consecutive bullet lines become one list, blank
/// lines separate paragraphs, everything else groups into paragraphs.
pub fn blockify(html_safe: &str) -> String {
    let normalized = html_safe.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();

    let mut out = String::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if bullet_body(line).is_some() {
            out.push_str("<ul class=\"terah-list\">");
            while i < lines.len() {
                match bullet_body(lines[i]) {
                    Some(item) => {
                        out.push_str("<li>");
                        out.push_str(item);
                        out.push_str("</li>");
                        i += 1;
                    }
                    None => break,
                }
            }
            out.push_str("</ul>");
            continue;
        }

        if line.trim().is_empty() {
            i += 1;
            continue;
        }

        let mut paragraph = vec![line];
        i += 1;
        while i < lines.len() && !lines[i].trim().is_empty() && bullet_body(lines[i]).is_none() {
            paragraph.push(lines[i]);
            i += 1;
        }
        out.push_str("<p>");
        out.push_str(paragraph.join(" ").trim());
        out.push_str("</p>");
    }
    out
}

/// Full rendering pass: escape + linkify, then reflow into blocks.
pub fn render_answer(text: &str, spans: &[CiteSpan]) -> String {
    blockify(&linkify(text, spans))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize, url: &str, text: &str) -> CiteSpan {
        CiteSpan {
            start,
            end,
            url: url.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_escape_covers_attribute_characters() {
        assert_eq!(
            escape_html(r#"<a b="c">&'"#),
            "&lt;a b=&quot;c&quot;&gt;&amp;&#39;"
        );
    }

    #[test]
    fn test_linkify_wraps_span_in_anchor() {
        let text = "See the Age Pension rules.";
        let s = span(8, 19, "https://example.gov/age-pension", "Age Pension");
        let html = linkify(text, &[s]);
        assert!(html.contains(
            "<a href=\"https://example.gov/age-pension\" target=\"_blank\" \
             rel=\"noopener noreferrer\" title=\"https://example.gov/age-pension\">Age Pension</a>"
        ));
        assert!(html.starts_with("See the "));
    }

    #[test]
    fn test_linkify_escapes_adversarial_text_everywhere() {
        let text = "<script>alert(1)</script> fine <b>bold</b>";
        let html = linkify(text, &[]);
        assert!(!html.contains('<') || !html.contains("<script"));
        assert_eq!(
            html,
            "&lt;script&gt;alert(1)&lt;/script&gt; fine &lt;b&gt;bold&lt;/b&gt;"
        );
    }

    #[test]
    fn test_linkify_skips_overlapping_and_out_of_bounds_spans() {
        let text = "alpha beta gamma";
        let spans = vec![
            span(0, 5, "https://a.example", "alpha"),
            span(3, 10, "https://b.example", "overlap"),
            span(6, 999, "https://c.example", "oob"),
        ];
        let html = linkify(text, &spans);
        assert_eq!(html.matches("<a ").count(), 1);
        assert!(html.contains(">alpha</a>"));
    }

    #[test]
    fn test_blockify_builds_lists_and_paragraphs() {
        let input = "Intro line\n\n* first item\n* second item\nTail paragraph";
        let html = blockify(input);
        assert_eq!(
            html,
            "<p>Intro line</p><ul class=\"terah-list\"><li>first item</li>\
             <li>second item</li></ul><p>Tail paragraph</p>"
        );
    }

    #[test]
    fn test_blockify_preserves_anchors_in_list_items() {
        let input = "- see <a href=\"https://x.example\">this</a> now";
        let html = blockify(input);
        assert!(html.contains("<li>see <a href=\"https://x.example\">this</a> now</li>"));
    }

    #[test]
    fn test_blockify_joins_wrapped_paragraph_lines() {
        let html = blockify("line one\nline two\n\nline three");
        assert_eq!(html, "<p>line one line two</p><p>line three</p>");
    }

    #[test]
    fn test_render_answer_only_allowed_tags_for_hostile_input() {
        let hostile = "x<img src=x onerror=alert(1)>\n* <script>bad</script>";
        let html = render_answer(hostile, &[]);
        assert!(!html.contains("<img"));
        assert!(!html.contains("<script"));
        for tag_start in html.match_indices('<').map(|(i, _)| i) {
            let rest = &html[tag_start..];
            assert!(
                rest.starts_with("<p>")
                    || rest.starts_with("</p>")
                    || rest.starts_with("<ul")
                    || rest.starts_with("</ul>")
                    || rest.starts_with("<li>")
                    || rest.starts_with("</li>")
                    || rest.starts_with("<a ")
                    || rest.starts_with("</a>"),
                "unexpected tag at: {rest}"
            );
        }
    }
}
