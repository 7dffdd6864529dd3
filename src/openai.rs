//! Shared HTTP plumbing for the OpenAI-compatible embedding and chat APIs.
//!
//! Both adapters go through [`post_json`], which classifies failures into
//! the pipeline's error taxonomy and retries transient ones:
//! - HTTP 429 → [`Error::RateLimit`], retried
//! - HTTP 5xx, network errors, timeouts → [`Error::ServiceUnavailable`], retried
//! - HTTP 401/403 → [`Error::Authentication`], never retried
//! - other 4xx → [`Error::Configuration`], never retried
//!
//! Backoff doubles from 1s and is capped at 32s.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

/// Environment variable holding the API credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Read the API key from the environment. Blank values count as missing.
pub fn api_key_from_env() -> Result<String> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(Error::Authentication(format!(
            "{} is not set. Export it in your environment and restart.",
            API_KEY_ENV
        ))),
    }
}

pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))
}

/// Join the configured base with an endpoint path.
pub fn endpoint(api_base: &str, path: &str) -> String {
    format!("{}/{}", api_base.trim_end_matches('/'), path)
}

/// POST a JSON body with bearer auth, retrying transient failures.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &Value,
    max_retries: u32,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            warn!(
                attempt,
                delay_secs = delay.as_secs(),
                "retrying provider request"
            );
            tokio::time::sleep(delay).await;
        }

        let err = match client.post(url).bearer_auth(api_key).json(body).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response.json::<Value>().await.map_err(|e| {
                        Error::ServiceUnavailable(format!("invalid JSON response: {}", e))
                    });
                }
                let body_text = response.text().await.unwrap_or_default();
                classify_status(status.as_u16(), &body_text)
            }
            Err(e) => Error::ServiceUnavailable(e.to_string()),
        };

        if !err.is_transient() {
            return Err(err);
        }
        last_err = Some(err);
    }

    Err(last_err
        .unwrap_or_else(|| Error::ServiceUnavailable("request failed after retries".to_string())))
}

/// 1s, 2s, 4s, ... capped at 2^5 seconds.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

/// Map a non-success HTTP status to an error.
pub fn classify_status(status: u16, body: &str) -> Error {
    let detail = format!("HTTP {}: {}", status, body);
    match status {
        401 | 403 => Error::Authentication(detail),
        429 => Error::RateLimit(detail),
        500..=599 => Error::ServiceUnavailable(detail),
        _ => Error::Configuration(detail),
    }
}
