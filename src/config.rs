use std::path::PathBuf;
use std::time::Duration;

/// Which post-answer citation strategy the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationStrategy {
    /// Inline `[[cite: LABEL]]` markers plus the CITES trailer line.
    Markers,
    /// Marker-free sentence-level attribution against the loaded sources.
    Sentence,
}

/// Completion-provider settings.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Extra attempts after the first call when rate-limited.
    pub retries: u32,
    pub request_timeout: Duration,
}

/// Retrieval and citation thresholds. These are tuned heuristics, not
/// semantic guarantees, so they all live here and can be overridden by env.
#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    /// Paragraph snippets kept per prose source.
    pub max_snippets_per_source: usize,
    /// Global character budget for the assembled context block.
    pub max_context_chars: usize,
    /// Rows kept per table/sheet at load time.
    pub row_cap: usize,
    /// Matching rows kept per table source at query time.
    pub query_row_cap: usize,
    /// At most this many non-stop tokens still counts as a generic query.
    pub generic_token_threshold: usize,
    /// Character cap per paragraph in the generic summary.
    pub generic_paragraph_chars: usize,
    /// Rows sampled per table in the generic summary.
    pub generic_row_sample: usize,
    /// Minimum sentence-vs-section score for an attribution.
    pub section_score_threshold: u32,
    /// Cap on inline citation links per rendered answer.
    pub max_inline_refs: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_snippets_per_source: 6,
            max_context_chars: 8_000,
            row_cap: 100,
            query_row_cap: 12,
            generic_token_threshold: 2,
            generic_paragraph_chars: 600,
            generic_row_sample: 5,
            section_score_threshold: 2,
            max_inline_refs: 4,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Directory holding the reference assets (txt/json/csv/xlsx).
    pub data_dir: PathBuf,
    /// Fetch catalog pages over HTTP at load time.
    pub fetch_catalog: bool,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub citation_strategy: CitationStrategy,
    /// Run the proofread pass on each answer.
    pub proofread: bool,
    /// Session inactivity expiry.
    pub session_ttl_secs: i64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    dotenv::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = RetrievalConfig::default();

        let citation_strategy = match dotenv::var("TERAH_CITATION_STRATEGY")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "sentence" => CitationStrategy::Sentence,
            _ => CitationStrategy::Markers,
        };

        Self {
            bind_addr: dotenv::var("TERAH_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            data_dir: dotenv::var("TERAH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            fetch_catalog: env_parse("TERAH_FETCH_CATALOG", false),
            llm: LlmConfig {
                base_url: dotenv::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:1234/v1".to_string()),
                model: dotenv::var("LLM_MODEL")
                    .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
                api_key: dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
                max_tokens: env_parse("LLM_MAX_TOKENS", 2048),
                temperature: env_parse("LLM_TEMPERATURE", 0.3),
                retries: env_parse("LLM_RETRIES", 2),
                request_timeout: Duration::from_secs(env_parse("LLM_TIMEOUT_SECS", 120)),
            },
            retrieval: RetrievalConfig {
                max_snippets_per_source: env_parse(
                    "TERAH_MAX_SNIPPETS",
                    defaults.max_snippets_per_source,
                ),
                max_context_chars: env_parse("TERAH_MAX_CONTEXT_CHARS", defaults.max_context_chars),
                row_cap: env_parse("TERAH_ROW_CAP", defaults.row_cap),
                query_row_cap: env_parse("TERAH_QUERY_ROW_CAP", defaults.query_row_cap),
                generic_token_threshold: env_parse(
                    "TERAH_GENERIC_TOKENS",
                    defaults.generic_token_threshold,
                ),
                generic_paragraph_chars: env_parse(
                    "TERAH_GENERIC_PARA_CHARS",
                    defaults.generic_paragraph_chars,
                ),
                generic_row_sample: env_parse("TERAH_GENERIC_ROWS", defaults.generic_row_sample),
                section_score_threshold: env_parse(
                    "TERAH_SECTION_SCORE_THRESHOLD",
                    defaults.section_score_threshold,
                ),
                max_inline_refs: env_parse("TERAH_MAX_INLINE_REFS", defaults.max_inline_refs),
            },
            citation_strategy,
            proofread: env_parse("TERAH_PROOFREAD", false),
            session_ttl_secs: env_parse("TERAH_SESSION_TTL_SECS", 30 * 60),
        }
    }
}
