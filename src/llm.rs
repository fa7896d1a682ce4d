use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmConfig;

/// Gateway failures the pipeline can react to. Only rate limiting is
/// retryable; everything else is terminal and surfaced generically.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("completion provider rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("completion provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

static RETRY_DELAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)s$").unwrap());

/// Pull a server-suggested retry delay (a `"<seconds>s"` string) out of an
/// error body. Providers nest it differently, so any `retryDelay` /
/// `retry_after` field anywhere in the JSON counts.
fn parse_retry_delay(value: &serde_json::Value) -> Option<Duration> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                if key == "retryDelay" || key == "retry_after" || key == "retryAfter" {
                    if let Some(s) = v.as_str() {
                        if let Some(caps) = RETRY_DELAY_RE.captures(s.trim()) {
                            if let Ok(secs) = caps[1].parse::<f64>() {
                                return Some(Duration::from_secs_f64(secs));
                            }
                        }
                    }
                }
                if let Some(found) = parse_retry_delay(v) {
                    return Some(found);
                }
            }
            None
        }
        serde_json::Value::Array(items) => items.iter().find_map(parse_retry_delay),
        _ => None,
    }
}

/// Retry `f` on rate limiting only: wait the server-suggested delay when one
/// was given, else back off 2s, 4s (capped at 8s), up to `retries` extra
/// attempts. Other errors propagate immediately.
pub async fn with_rate_limit_retry<F, Fut>(retries: u32, mut f: F) -> Result<String, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(text) => return Ok(text),
            Err(LlmError::RateLimited { retry_after }) if attempt < retries => {
                let delay = retry_after
                    .unwrap_or_else(|| Duration::from_secs((2 * (attempt as u64 + 1)).min(8)));
                warn!(attempt, delay_ms = delay.as_millis() as u64, "rate limited; backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Thin client over an OpenAI-compatible chat-completions endpoint.
pub struct LlmClient {
    client: reqwest::Client,
    cfg: LlmConfig,
}

impl LlmClient {
    pub fn new(cfg: LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()?;
        Ok(Self { client, cfg })
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.cfg.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    /// One non-streaming completion call.
    pub async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.cfg.model,
            "messages": messages,
            "temperature": self.cfg.temperature,
            "max_tokens": self.cfg.max_tokens,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.cfg.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| LlmError::Provider(format!("request failed: {}", e)))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| LlmError::Provider(format!("read response: {}", e)))?;

        if status.as_u16() == 429 {
            let retry_after = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .as_ref()
                .and_then(parse_retry_delay);
            return Err(LlmError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let preview: String = text.chars().take(300).collect();
            return Err(LlmError::Provider(format!("HTTP {}: {}", status, preview)));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::Provider(format!("parse response JSON: {}", e)))?;
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or("")
            .to_string();

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }

    /// Completion with the rate-limit retry policy applied.
    pub async fn chat_with_retry(&self, messages: &[Message]) -> Result<String, LlmError> {
        with_rate_limit_retry(self.cfg.retries, || self.chat(messages)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_parse_retry_delay_nested_details() {
        let body = serde_json::json!({
            "error": {
                "code": 429,
                "details": [
                    {"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "3s"}
                ]
            }
        });
        assert_eq!(parse_retry_delay(&body), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_parse_retry_delay_fractional_and_missing() {
        let body = serde_json::json!({"retryDelay": "1.5s"});
        assert_eq!(parse_retry_delay(&body), Some(Duration::from_secs_f64(1.5)));
        assert_eq!(parse_retry_delay(&serde_json::json!({"error": "nope"})), None);
        assert_eq!(parse_retry_delay(&serde_json::json!({"retryDelay": "soon"})), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_suggested_delay_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let calls_in = calls.clone();
        let result = with_rate_limit_retry(2, move || {
            let calls = calls_in.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LlmError::RateLimited {
                        retry_after: Some(Duration::from_secs(3)),
                    })
                } else {
                    Ok("answer".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_propagates_rate_limit() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result: Result<String, LlmError> = with_rate_limit_retry(2, move || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::RateLimited { retry_after: None })
            }
        })
        .await;

        assert!(matches!(result, Err(LlmError::RateLimited { .. })));
        // First call plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result: Result<String, LlmError> = with_rate_limit_retry(2, move || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::Provider("boom".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(LlmError::Provider(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_endpoint_resolution() {
        let mk = |base: &str| LlmClient {
            client: reqwest::Client::new(),
            cfg: LlmConfig {
                base_url: base.to_string(),
                model: "m".to_string(),
                api_key: None,
                max_tokens: 10,
                temperature: 0.0,
                retries: 0,
                request_timeout: Duration::from_secs(1),
            },
        };
        assert_eq!(mk("http://h/v1").endpoint(), "http://h/v1/chat/completions");
        assert_eq!(
            mk("http://h/v1/chat/completions").endpoint(),
            "http://h/v1/chat/completions"
        );
        assert_eq!(mk("http://h").endpoint(), "http://h/v1/chat/completions");
    }
}
