//! HTTP API source adapter.
//!
//! One request with configured method, headers, and auth; retried with
//! exponential backoff on 5xx/429 and transport errors; body parsed
//! through the shared JSON envelopes.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use tracing::{info, warn};

use datalink_wire::{ApiConfig, Record};

use crate::error::{AgentError, AgentResult};
use crate::parser;

use super::BatchEmitter;

/// Total per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Retry policy: base 1s, doubling, capped at 30s, up to 3 retries.
const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(30);

pub async fn run(config: &ApiConfig, emitter: &BatchEmitter) -> AgentResult<()> {
    let body = fetch(config).await?;
    let records: Vec<Record> = parser::parse_json(&body)?;

    info!(total = records.len(), "api extraction finished");
    emitter.emit(records).await
}

/// Fetch the response body, retrying retryable failures.
pub async fn fetch(config: &ApiConfig) -> AgentResult<Vec<u8>> {
    if config.url.is_empty() {
        return Err(AgentError::Source("API URL is not configured".into()));
    }

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| AgentError::Source(e.to_string()))?;

    let method = parse_method(&config.method);
    let headers = build_headers(config)?;

    let mut last_error = String::new();
    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let delay = backoff_delay(attempt - 1);
            warn!(attempt, max = MAX_RETRIES, delay_s = delay.as_secs(), "retrying API request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.request(method.clone(), &config.url).headers(headers.clone());
        if !config.body.is_empty() && method != Method::GET {
            request = request.body(config.body.clone());
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                last_error = format!("request failed: {}", e);
                continue;
            }
        };

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .unwrap_or_default();

        if status.is_success() {
            return Ok(bytes);
        }

        let message = format!(
            "API returned status {}: {}",
            status.as_u16(),
            String::from_utf8_lossy(&bytes)
        );
        if is_retryable(status) {
            last_error = message;
            continue;
        }
        // non-retryable 4xx
        return Err(AgentError::Source(message));
    }

    Err(AgentError::Source(format!(
        "all {} retries failed, last error: {}",
        MAX_RETRIES, last_error
    )))
}

fn parse_method(method: &str) -> Method {
    match method.to_uppercase().as_str() {
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "PATCH" => Method::PATCH,
        "DELETE" => Method::DELETE,
        _ => Method::GET,
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn backoff_delay(attempt: u32) -> Duration {
    let delay = BASE_DELAY * 2u32.saturating_pow(attempt);
    delay.min(MAX_DELAY)
}

fn build_headers(config: &ApiConfig) -> AgentResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if !config.body.is_empty() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    // the console stores extra headers as a serialized JSON object
    if !config.headers.is_empty() {
        if let Ok(extra) = serde_json::from_str::<HashMap<String, String>>(&config.headers) {
            for (key, value) in extra {
                let (Ok(name), Ok(value)) = (
                    HeaderName::try_from(key.as_str()),
                    HeaderValue::try_from(value.as_str()),
                ) else {
                    warn!(header = %key, "skipping invalid API header");
                    continue;
                };
                headers.insert(name, value);
            }
        }
    }

    match config.auth_type.to_lowercase().as_str() {
        "bearer" => {
            let value = format!("Bearer {}", config.auth_value);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::try_from(value)
                    .map_err(|_| AgentError::Source("invalid bearer token".into()))?,
            );
        }
        "basic" => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&config.auth_value);
            let value = format!("Basic {}", encoded);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::try_from(value)
                    .map_err(|_| AgentError::Source("invalid basic credentials".into()))?,
            );
        }
        "api_key" => {
            let name = if config.auth_key.is_empty() {
                "X-API-Key"
            } else {
                &config.auth_key
            };
            headers.insert(
                HeaderName::try_from(name)
                    .map_err(|_| AgentError::Source("invalid API key header name".into()))?,
                HeaderValue::try_from(config.auth_value.as_str())
                    .map_err(|_| AgentError::Source("invalid API key value".into()))?,
            );
        }
        _ => {}
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps_at_thirty_seconds() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn only_5xx_and_429_are_retryable() {
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn auth_headers_are_applied() {
        let config = ApiConfig {
            url: "https://api.example.com/items".into(),
            auth_type: "bearer".into(),
            auth_value: "tok123".into(),
            ..Default::default()
        };
        let headers = build_headers(&config).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer tok123");

        let config = ApiConfig {
            url: "https://api.example.com/items".into(),
            auth_type: "api_key".into(),
            auth_key: "X-Custom-Key".into(),
            auth_value: "k".into(),
            ..Default::default()
        };
        let headers = build_headers(&config).unwrap();
        assert_eq!(headers["X-Custom-Key"], "k");
    }

    #[test]
    fn custom_headers_come_from_the_serialized_map() {
        let config = ApiConfig {
            url: "https://api.example.com".into(),
            headers: r#"{"X-Tenant": "acme"}"#.into(),
            ..Default::default()
        };
        let headers = build_headers(&config).unwrap();
        assert_eq!(headers["X-Tenant"], "acme");
    }
}
