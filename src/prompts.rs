use crate::cite::resolve::SCRAPED_SOURCES;

/// Persona and guardrails for every answer turn.
pub const SYSTEM_PERSONA: &str = "\
You are Terah, a helpful retirement chatbot that answers questions about \
superannuation, the Age Pension, and retirement planning in Australia. \
Only provide factual, general information from ATO, Services Australia, and \
MoneySmart. Never give personal financial advice or tailored recommendations. \
If asked, decline and refer to a licensed financial adviser.

Style:
- Be concise and specific. Use short bullets or sentences.
- No markdown emphasis or emojis.
- Every bullet/paragraph must include at least one citation.";

/// Citation wire-format contract the model must follow.
pub const CITATION_RULES: &str = "\
CITATION RULES (STRICT):
- Prefer paired cites: [[cite: LABEL]]that short phrase[[/cite]]. Standalone [[cite: LABEL]] is allowed.
- Labels must match \"Reference Information\" headers or the \"Scraped Sources Catalog\".
- Ensure every bullet/paragraph has at least one citation.
- After your answer output exactly one line: CITES: label | label
- Do NOT print raw URLs in the answer.";

/// Second-pass reviewer instruction. The literal reply "ACCEPTABLE" keeps
/// the original answer.
pub const PROOFREAD_INSTRUCTION: &str = "\
Proofread the following text.
1) If any details are incorrect, rewrite the text to ensure accuracy.
2) Ensure the text does not provide financial advice. If it does, rewrite it as factual, general information only.
3) If the text is accurate and not financial advice, reply ONLY with \"ACCEPTABLE\".
Return the final, proofread text or \"ACCEPTABLE\".";

/// The catalog block listing citable scraped pages, label :: url per line.
pub fn catalog_listing() -> String {
    let lines: Vec<String> = SCRAPED_SOURCES
        .iter()
        .map(|(label, url)| format!("- {} :: {}", label, url))
        .collect();
    format!("Scraped Sources Catalog (label :: url):\n{}", lines.join("\n"))
}

/// Assemble the full system instruction for one query.
pub fn build_system_instruction(context_block: &str) -> String {
    format!(
        "{}\n\n{}\n\n{}\n\n{}",
        SYSTEM_PERSONA,
        CITATION_RULES,
        catalog_listing(),
        context_block
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_listing_contains_every_source() {
        let listing = catalog_listing();
        for (label, url) in SCRAPED_SOURCES {
            assert!(listing.contains(label));
            assert!(listing.contains(url));
        }
    }

    #[test]
    fn test_system_instruction_layout() {
        let out = build_system_instruction("Reference Information:\n--- ATO.txt ---\nbody");
        assert!(out.starts_with("You are Terah"));
        assert!(out.contains("CITATION RULES"));
        assert!(out.ends_with("body"));
    }
}
