// src/oracle.rs
//! Text-completion oracle boundary. The scoring and rewrite stages both go
//! through `Oracle::complete`; the response is arbitrary text the callers
//! parse with regexes and must tolerate being garbage.
//!
//! Errors carry a tag (`ErrorKind`) so retry filters branch on the tag,
//! never on concrete error types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const ENV_ORACLE_API_KEY: &str = "ORACLE_API_KEY";
pub const ENV_ORACLE_ENDPOINT: &str = "ORACLE_ENDPOINT";
pub const ENV_ORACLE_MODEL: &str = "ORACLE_MODEL";

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Failure class at the oracle boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeouts, connection resets, 5xx/429. Worth retrying.
    Transient,
    /// Rejected outright (auth, 4xx). Retrying will not help.
    Permanent,
    /// The response arrived but could not be decoded. Never retried.
    Malformed,
}

#[derive(Debug, Clone, Error)]
#[error("oracle failure ({kind:?}): {message}")]
pub struct OracleError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OracleError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Malformed,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// One synchronous completion call. May fail with any `ErrorKind`.
    async fn complete(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
    ) -> Result<String, OracleError>;

    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Bounded exponential backoff: `base * 2^attempt`, capped.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_retries,
            base,
            cap,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1u32 << attempt.min(16));
        exp.min(self.cap)
    }
}

/// Retry envelope shared by the scoring and rewrite stages: per-attempt
/// timeout, bounded retries, backoff, and a filter that only retries
/// transient-class failures. An attempt timeout surfaces as a transient
/// error so the enclosing layer's fallback logic sees an ordinary failure.
pub async fn call_with_retry(
    oracle: &dyn Oracle,
    system_prompt: Option<&str>,
    user_prompt: &str,
    attempt_timeout: Duration,
    policy: RetryPolicy,
) -> Result<String, OracleError> {
    let mut attempt: u32 = 0;
    loop {
        let result =
            tokio::time::timeout(attempt_timeout, oracle.complete(system_prompt, user_prompt))
                .await;
        let err = match result {
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(e)) => e,
            Err(_) => OracleError::transient(format!(
                "call timed out after {}s",
                attempt_timeout.as_secs()
            )),
        };
        if !err.is_retryable() || attempt >= policy.max_retries {
            return Err(err);
        }
        let delay = policy.delay(attempt);
        warn!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "oracle call failed; retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// HTTP oracle against an OpenAI-style chat-completions endpoint.
/// Endpoint, model, and key come from the environment.
pub struct ChatOracle {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatOracle {
    pub fn from_env() -> Self {
        let api_key = std::env::var(ENV_ORACLE_API_KEY).unwrap_or_default();
        let endpoint =
            std::env::var(ENV_ORACLE_ENDPOINT).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let model = std::env::var(ENV_ORACLE_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let http = reqwest::Client::builder()
            .user_agent("newswire-courier/0.1")
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint,
            api_key,
            model,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl Oracle for ChatOracle {
    async fn complete(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
    ) -> Result<String, OracleError> {
        if self.api_key.is_empty() {
            return Err(OracleError::permanent("ORACLE_API_KEY not configured"));
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(sys) = system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: sys,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user_prompt,
        });

        let req = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.2,
        };

        debug!(chars = user_prompt.len(), "sending prompt to oracle");
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    OracleError::transient(e.to_string())
                } else {
                    OracleError::permanent(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = format!("oracle returned HTTP {status}");
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                OracleError::transient(message)
            } else {
                OracleError::permanent(message)
            });
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| OracleError::malformed(format!("undecodable oracle body: {e}")))?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "chat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyOracle {
        calls: AtomicU32,
        fail_first: u32,
        kind: ErrorKind,
    }

    #[async_trait]
    impl Oracle for FlakyOracle {
        async fn complete(
            &self,
            _system_prompt: Option<&str>,
            _user_prompt: &str,
        ) -> Result<String, OracleError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(OracleError {
                    kind: self.kind,
                    message: "boom".to_string(),
                })
            } else {
                Ok("ok".to_string())
            }
        }
        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(20))
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = RetryPolicy::new(3, Duration::from_secs(3), Duration::from_secs(10));
        assert_eq!(p.delay(0), Duration::from_secs(3));
        assert_eq!(p.delay(1), Duration::from_secs(6));
        assert_eq!(p.delay(2), Duration::from_secs(10));
        assert_eq!(p.delay(5), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let oracle = FlakyOracle {
            calls: AtomicU32::new(0),
            fail_first: 2,
            kind: ErrorKind::Transient,
        };
        let out = call_with_retry(&oracle, None, "p", Duration::from_secs(1), policy()).await;
        assert_eq!(out.unwrap(), "ok");
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_malformed_responses() {
        let oracle = FlakyOracle {
            calls: AtomicU32::new(0),
            fail_first: 10,
            kind: ErrorKind::Malformed,
        };
        let out = call_with_retry(&oracle, None, "p", Duration::from_secs(1), policy()).await;
        assert!(out.is_err());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let oracle = FlakyOracle {
            calls: AtomicU32::new(0),
            fail_first: 10,
            kind: ErrorKind::Transient,
        };
        let out = call_with_retry(&oracle, None, "p", Duration::from_secs(1), policy()).await;
        assert!(out.is_err());
        // initial attempt + 2 retries
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }
}
