use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::attribute::{attribute_sentences, AttributionSource};
use crate::cite::extract::{clamp_labels_unique, extract_cites_labels, prune_markers_not_in, strip_cites_line};
use crate::cite::markers_to_spans;
use crate::cite::resolve::labels_to_urls;
use crate::config::{CitationStrategy, RetrievalConfig};
use crate::llm::{LlmClient, Message};
use crate::prompts;
use crate::render::render_answer;
use crate::retrieve::{assemble_context, select_snippets};
use crate::sources::SharedLibrary;

/// The one user-facing failure message. Provider detail stays in the logs.
pub const FALLBACK_MESSAGE: &str =
    "Sorry\u{2014}something went wrong fetching an answer. Please try again in a moment.";

/// Canned replies checked before the pipeline runs, most specific first.
const SCRIPTED_REPLIES: &[(&[&str], &str)] = &[
    (
        &["lost super", "unclaimed super", "where is my super"],
        "If you've changed jobs a few times, you might have lost super. I can help you identify \
         unclaimed funds and guide you on consolidation to feel in control of your money.",
    ),
    (
        &["hello", "hi", "hey"],
        "Hello! How can I assist you with retirement planning today?",
    ),
];

/// A rendered answer plus its plain text (kept for conversation history)
/// and the URLs it ended up citing.
#[derive(Debug, Clone)]
pub struct ChatAnswer {
    pub html: String,
    pub text: String,
    pub cited_urls: Vec<String>,
}

/// Orchestrates one question end to end: snippet selection, context
/// assembly, the completion call, citation resolution, and rendering.
pub struct ChatEngine {
    llm: Arc<LlmClient>,
    library: Arc<SharedLibrary>,
    retrieval: RetrievalConfig,
    strategy: CitationStrategy,
    proofread: bool,
}

impl ChatEngine {
    pub fn new(
        llm: Arc<LlmClient>,
        library: Arc<SharedLibrary>,
        retrieval: RetrievalConfig,
        strategy: CitationStrategy,
        proofread: bool,
    ) -> Self {
        Self {
            llm,
            library,
            retrieval,
            strategy,
            proofread,
        }
    }

    /// Answer a question. Never fails: every error path degrades to the
    /// generic failure message rendered as plain HTML.
    pub async fn answer(&self, history: &[Message], user_message: &str) -> ChatAnswer {
        if let Some(reply) = scripted_reply(user_message) {
            debug!("scripted reply matched");
            return ChatAnswer {
                html: render_answer(reply, &[]),
                text: reply.to_string(),
                cited_urls: Vec::new(),
            };
        }

        match self.answer_inner(history, user_message).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "answer pipeline failed");
                ChatAnswer {
                    html: render_answer(FALLBACK_MESSAGE, &[]),
                    text: FALLBACK_MESSAGE.to_string(),
                    cited_urls: Vec::new(),
                }
            }
        }
    }

    async fn answer_inner(&self, history: &[Message], user_message: &str) -> Result<ChatAnswer> {
        let library = self.library.get_or_load().await?;

        let selected = select_snippets(user_message, library.sources(), &self.retrieval);
        let context_block = assemble_context(&selected, &self.retrieval);
        debug!(
            matched = selected.matched,
            prose = selected.prose.len(),
            tables = selected.tables.len(),
            context_chars = context_block.chars().count(),
            "context assembled"
        );

        let mut messages = vec![Message::system(prompts::build_system_instruction(&context_block))];
        messages.extend_from_slice(history);
        messages.push(Message::user(user_message));

        let raw = self.llm.chat_with_retry(&messages).await?;
        let raw = if self.proofread {
            self.proofread_answer(raw).await
        } else {
            raw
        };

        info!(answer_chars = raw.len(), "completion processed");
        Ok(self.cite_and_render(&raw, &library))
    }

    fn cite_and_render(
        &self,
        raw: &str,
        library: &crate::sources::ReferenceLibrary,
    ) -> ChatAnswer {
        let cites_labels = extract_cites_labels(raw);
        let visible = strip_cites_line(raw);

        match self.strategy {
            CitationStrategy::Markers => {
                // When the model declared its sources on the trailer line,
                // markers outside that set are treated as noise.
                let visible = if cites_labels.is_empty() {
                    visible
                } else {
                    let allowed =
                        clamp_labels_unique(&cites_labels, self.retrieval.max_inline_refs);
                    prune_markers_not_in(&visible, &allowed)
                };

                let (mut clean, mut spans) =
                    markers_to_spans(&visible, self.retrieval.max_inline_refs);

                let mut cited: Vec<String> = Vec::new();
                let mut seen = HashSet::new();
                for span in &spans {
                    if seen.insert(span.url.clone()) {
                        cited.push(span.url.clone());
                    }
                }

                // Trailer-only answers (CITES line but no inline markers)
                // still get visible links: the resolved URLs are appended
                // in parentheses and anchored.
                if spans.is_empty() {
                    cited = labels_to_urls(&cites_labels);
                    cited.truncate(self.retrieval.max_inline_refs);
                    for url in &cited {
                        clean.push_str(" (");
                        let start = clean.len();
                        clean.push_str(url);
                        let end = clean.len();
                        clean.push(')');
                        spans.push(crate::render::CiteSpan {
                            start,
                            end,
                            url: url.clone(),
                            text: url.clone(),
                        });
                    }
                }

                ChatAnswer {
                    html: render_answer(&clean, &spans),
                    text: clean,
                    cited_urls: cited,
                }
            }
            CitationStrategy::Sentence => {
                // Markers are not part of this strategy's contract; drop any
                // stragglers before attribution so they never render.
                let clean = prune_markers_not_in(&visible, &[]);
                let sources = AttributionSource::from_library(library.sources());
                let spans = attribute_sentences(
                    &clean,
                    &sources,
                    self.retrieval.section_score_threshold,
                );
                let cited = spans.iter().map(|s| s.url.clone()).collect();
                ChatAnswer {
                    html: render_answer(&clean, &spans),
                    text: clean,
                    cited_urls: cited,
                }
            }
        }
    }

    /// Second-model review pass. Failures keep the original answer.
    async fn proofread_answer(&self, raw: String) -> String {
        let messages = vec![
            Message::system(prompts::PROOFREAD_INSTRUCTION),
            Message::user(format!("Text to proofread:\n{}", raw)),
        ];
        match self.llm.chat(&messages).await {
            Ok(reviewed) => {
                let trimmed = reviewed.trim();
                if trimmed.eq_ignore_ascii_case("ACCEPTABLE") || trimmed.is_empty() {
                    raw
                } else {
                    debug!("proofread pass rewrote the answer");
                    trimmed.to_string()
                }
            }
            Err(e) => {
                warn!(error = %e, "proofread failed; keeping original answer");
                raw
            }
        }
    }
}

/// Trigger lookup for canned replies. Multi-word triggers match as
/// substrings; single words only as whole words, so "hi" does not fire
/// inside "this".
fn scripted_reply(message: &str) -> Option<&'static str> {
    let cleaned = message.to_lowercase();
    let cleaned = cleaned.trim();
    for (triggers, reply) in SCRIPTED_REPLIES {
        let hit = triggers.iter().any(|t| {
            if t.contains(' ') {
                cleaned.contains(t)
            } else {
                crate::retrieve::text::contains_word(cleaned, t)
            }
        });
        if hit {
            return Some(reply);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::sources::ReferenceLibrary;
    use std::time::Duration;

    fn test_engine(strategy: CitationStrategy) -> ChatEngine {
        let llm = Arc::new(
            LlmClient::new(LlmConfig {
                base_url: "http://localhost:9".to_string(),
                model: "test".to_string(),
                api_key: None,
                max_tokens: 16,
                temperature: 0.0,
                retries: 0,
                request_timeout: Duration::from_secs(1),
            })
            .unwrap(),
        );
        let library = Arc::new(SharedLibrary::new(
            std::env::temp_dir().join("terah-engine-test-missing"),
            10,
            false,
        ));
        ChatEngine::new(llm, library, RetrievalConfig::default(), strategy, false)
    }

    #[test]
    fn test_trailer_only_answer_gets_one_anchor() {
        let engine = test_engine(CitationStrategy::Markers);
        let lib = ReferenceLibrary::new(Vec::new());
        let answer = engine.cite_and_render(
            "You may be eligible. CITES: Services Australia (Age Pension)",
            &lib,
        );
        assert_eq!(answer.html.matches("<a ").count(), 1);
        assert!(answer
            .html
            .contains("href=\"https://www.servicesaustralia.gov.au/age-pension\""));
        assert!(!answer.html.contains("CITES:"));
        assert_eq!(
            answer.cited_urls,
            vec!["https://www.servicesaustralia.gov.au/age-pension".to_string()]
        );
    }

    #[test]
    fn test_inline_marker_answer_strips_tokens_and_links() {
        let engine = test_engine(CitationStrategy::Markers);
        let lib = ReferenceLibrary::new(Vec::new());
        let answer = engine.cite_and_render("Rates changed in 2024 [[cite: ATO.txt]]", &lib);
        assert!(!answer.html.contains("[[cite:"));
        assert!(!answer.html.contains("[[/cite]]"));
        assert!(answer.html.contains(">2024</a>"));
    }

    #[test]
    fn test_scripted_reply_matches_triggers() {
        assert!(scripted_reply("hello there").is_some());
        assert!(scripted_reply("I think I have LOST SUPER somewhere").is_some());
        assert!(scripted_reply("how is super taxed?").is_none());
        // "hi" must not fire as a substring of other words
        assert!(scripted_reply("is this pension taxable").is_none());
    }

    #[test]
    fn test_fallback_message_renders_clean() {
        let html = render_answer(FALLBACK_MESSAGE, &[]);
        assert!(html.starts_with("<p>"));
        assert!(!html.contains('<') || html.matches("<p>").count() == 1);
    }
}
