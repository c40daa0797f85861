//! Async HTTP client used to replay discovered endpoints.
//!
//! Not a browser — just one HTTP request per call. Non-2xx answers and
//! transport failures come back as [`ScoutError::Network`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use crate::error::{ScoutError, ScoutResult};
use crate::types::HttpMethod;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("apiscout/", env!("CARGO_PKG_VERSION"));
/// How much of an error body is kept in the error message.
const ERROR_EXCERPT_LEN: usize = 200;

/// A request to replay.
#[derive(Debug, Clone)]
pub struct ReplayRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// Decoded response of a successful replay.
#[derive(Debug, Clone)]
pub struct ReplayResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Parsed JSON, or the raw text as a JSON string.
    pub body: Value,
}

/// HTTP client for the replay executor.
#[derive(Clone)]
pub struct ReplayClient {
    client: reqwest::Client,
}

impl Default for ReplayClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ReplayClient {
    pub fn new(timeout: Duration) -> Self {
        Self::with_user_agent(timeout, USER_AGENT)
    }

    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(user_agent)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Wrap an existing reqwest client (custom proxies, TLS roots, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn execute(&self, request: ReplayRequest) -> ScoutResult<ReplayResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| ScoutError::network(&request.url, None, e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| ScoutError::network(&request.url, None, format!("invalid body: {e}")))?;
            builder = builder.body(bytes);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ScoutError::network(&request.url, None, e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let text = response
            .text()
            .await
            .map_err(|e| ScoutError::network(&request.url, Some(status), e.to_string()))?;

        if !(200..300).contains(&status) {
            let excerpt: String = text.chars().take(ERROR_EXCERPT_LEN).collect();
            return Err(ScoutError::network(
                &request.url,
                Some(status),
                format!("HTTP {status}: {excerpt}"),
            ));
        }

        let body = if content_type.as_deref().is_some_and(is_json_content_type) {
            if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).map_err(|e| {
                    ScoutError::network(&request.url, Some(status), format!("invalid JSON body: {e}"))
                })?
            }
        } else {
            Value::String(text)
        };

        Ok(ReplayResponse {
            url: request.url,
            status,
            content_type,
            body,
        })
    }
}

/// `application/json` and `+json` suffixed media types.
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}
