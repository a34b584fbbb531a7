//! Streaming client for the podium backend: opens the generate SSE
//! session, classifies open failures as retriable or fatal, and drives the
//! session state machine from the record stream.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use podium_client_core::auth::{AuthInputError, normalize_base_url};

pub mod controller;
pub mod login;
pub mod stream;

pub use controller::{AuthFlowError, SessionController, SubmitError};
pub use login::{LoginError, LoginRequest, LoginResponse, login};
pub use stream::{GenerateRequest, OpenDisposition, StreamEvent, StreamSession};

pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

/// Reconnect policy for retriable stream failures. The default keeps
/// retrying until the session ends some other way; a cap turns exhaustion
/// into a fatal session error.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Doubling backoff, saturating at `max_backoff`. `retries` is how many
    /// reconnects already happened.
    pub fn backoff_for(&self, retries: u32) -> Duration {
        let step = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(retries.min(16)));
        step.min(self.max_backoff)
    }

    pub fn attempts_exhausted(&self, retries: u32) -> bool {
        self.max_attempts.is_some_and(|cap| retries >= cap)
    }
}

#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    base_url: String,
    pub retry: RetryPolicy,
}

impl StreamClientConfig {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, StreamClientError> {
        let base_url = normalize_base_url(base_url.as_ref())?;
        Ok(Self {
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    pub fn login_url(&self) -> String {
        format!("{}/api/login", self.base_url)
    }
}

#[derive(Debug, Error)]
pub enum StreamClientError {
    #[error("invalid base url: {0}")]
    BaseUrl(#[from] AuthInputError),
    #[error("http client construction failed: {message}")]
    Client { message: String },
}

pub(crate) fn build_http_client() -> Result<reqwest::Client, StreamClientError> {
    reqwest::Client::builder()
        .build()
        .map_err(|error| StreamClientError::Client {
            message: error.to_string(),
        })
}

/// Backend error bodies are `{"detail": <message>}`.
#[derive(Debug, Deserialize)]
struct ErrorDetailBody {
    detail: String,
}

pub(crate) fn error_detail(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorDetailBody>(body)
        .ok()
        .map(|body| body.detail)
        .filter(|detail| !detail.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_normalizes_the_base_url_and_builds_endpoints() {
        let config = StreamClientConfig::new(" http://127.0.0.1:8000/ ").expect("config");
        assert_eq!(config.base_url(), "http://127.0.0.1:8000");
        assert_eq!(config.generate_url(), "http://127.0.0.1:8000/api/generate");
        assert_eq!(config.login_url(), "http://127.0.0.1:8000/api/login");
    }

    #[test]
    fn config_rejects_a_schemeless_base_url() {
        let error = StreamClientConfig::new("podium.example").expect_err("invalid");
        assert!(matches!(error, StreamClientError::BaseUrl(_)));
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(450),
            max_attempts: None,
        };
        assert_eq!(policy.backoff_for(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(450));
        assert_eq!(policy.backoff_for(30), Duration::from_millis(450));
    }

    #[test]
    fn unbounded_policy_never_exhausts() {
        let policy = RetryPolicy::default();
        assert!(!policy.attempts_exhausted(0));
        assert!(!policy.attempts_exhausted(10_000));
    }

    #[test]
    fn capped_policy_exhausts_at_the_cap() {
        let policy = RetryPolicy {
            max_attempts: Some(2),
            ..RetryPolicy::default()
        };
        assert!(!policy.attempts_exhausted(0));
        assert!(!policy.attempts_exhausted(1));
        assert!(policy.attempts_exhausted(2));
    }

    #[test]
    fn error_detail_reads_backend_error_bodies() {
        assert_eq!(
            error_detail(br#"{"detail": "Invalid credentials"}"#),
            Some("Invalid credentials".to_string())
        );
        assert_eq!(error_detail(br#"{"detail": "  "}"#), None);
        assert_eq!(error_detail(b"not json"), None);
        assert_eq!(error_detail(br#"{"message": "other shape"}"#), None);
    }
}
