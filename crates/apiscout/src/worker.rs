//! Replay executor.
//!
//! Picks one endpoint of a scouted path, fills its pattern from the caller's
//! data and calls it directly over HTTP. Every attempt is recorded as a run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{ScoutError, ScoutResult};
use crate::replay::{ReplayClient, ReplayRequest};
use crate::store::Store;
use crate::types::{CapturedEndpoint, HttpMethod, RunKind, RunRecord, RunStatus};

pub const NO_ENDPOINTS: &str = "No endpoints found for path";

#[derive(Debug, Clone, Default)]
pub struct WorkerRequest {
    pub path_id: String,
    pub data: Option<Value>,
    /// Extra request headers; these win over the defaults.
    pub headers: BTreeMap<String, String>,
}

impl WorkerRequest {
    pub fn new(path_id: &str) -> Self {
        Self {
            path_id: path_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

pub struct Worker {
    store: Arc<dyn Store>,
    client: ReplayClient,
}

impl Worker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            client: ReplayClient::default(),
        }
    }

    pub fn with_client(mut self, client: ReplayClient) -> Self {
        self.client = client;
        self
    }

    /// Replay one endpoint of `request.path_id`.
    ///
    /// Unknown path → `NotFound`. A path without endpoints is a soft failure.
    /// HTTP failures propagate as `Network` errors after being recorded.
    pub async fn run(&self, request: &WorkerRequest) -> ScoutResult<WorkerOutcome> {
        let started = Instant::now();
        let path = self.store.get_path(&request.path_id).await?;
        let endpoints: Vec<CapturedEndpoint> = self
            .store
            .get_endpoints(&path.site_id)
            .await?
            .into_iter()
            .filter(|e| path.endpoint_ids.contains(&e.id))
            .collect();

        let Some(endpoint) = select_endpoint(&endpoints, request.data.is_some()) else {
            tracing::warn!("path {} has no endpoints to replay", path.id);
            self.record(&path.id, RunStatus::Failure, started, Some(NO_ENDPOINTS), json!({}))
                .await?;
            return Ok(WorkerOutcome {
                success: false,
                response: Some(Value::String(NO_ENDPOINTS.to_string())),
            });
        };

        let replay = build_request(endpoint, request);
        let detail = json!({ "method": replay.method.as_str(), "url": replay.url });
        tracing::debug!("replaying {} {}", replay.method, replay.url);

        match self.client.execute(replay).await {
            Ok(response) => {
                tracing::info!(
                    "path {} replayed with HTTP {} from {}",
                    path.id,
                    response.status,
                    response.url
                );
                // Only the timestamp: a heal may have moved the path meanwhile.
                self.store.touch_path(&path.id, Utc::now()).await?;
                self.record(
                    &path.id,
                    RunStatus::Success,
                    started,
                    None,
                    json!({
                        "request": detail,
                        "status": response.status,
                        "contentType": response.content_type,
                    }),
                )
                .await?;
                Ok(WorkerOutcome {
                    success: true,
                    response: Some(response.body),
                })
            }
            Err(e) => {
                tracing::warn!("replay of path {} failed: {e}", path.id);
                let status = match &e {
                    ScoutError::Network { status, .. } => *status,
                    _ => None,
                };
                self.record(
                    &path.id,
                    RunStatus::Failure,
                    started,
                    Some(&e.to_string()),
                    json!({ "request": detail, "status": status }),
                )
                .await?;
                Err(e)
            }
        }
    }

    async fn record(
        &self,
        path_id: &str,
        status: RunStatus,
        started: Instant,
        error: Option<&str>,
        detail: Value,
    ) -> ScoutResult<()> {
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut run = RunRecord::new(RunKind::Worker, status, elapsed)
            .for_path(path_id)
            .with_detail(detail);
        if let Some(error) = error {
            run = run.with_error(error);
        }
        self.store.save_run(&run).await
    }
}

/// With data, prefer the first body-accepting endpoint; without, the first GET.
/// Otherwise fall back to the first endpoint.
pub fn select_endpoint(endpoints: &[CapturedEndpoint], has_data: bool) -> Option<&CapturedEndpoint> {
    let preferred = if has_data {
        endpoints.iter().find(|e| e.method.accepts_body())
    } else {
        endpoints.iter().find(|e| e.method == HttpMethod::Get)
    };
    preferred.or_else(|| endpoints.first())
}

/// Replace `:name` segments with matching keys of `data`. Unmatched
/// placeholders are left as they are.
pub fn resolve_pattern(pattern: &str, data: Option<&Value>) -> String {
    let Some(fields) = data.and_then(Value::as_object) else {
        return pattern.to_string();
    };
    pattern
        .split('/')
        .map(|segment| {
            let value = segment.strip_prefix(':').and_then(|name| fields.get(name));
            match value {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => segment.to_string(),
                Some(other) => other.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn build_request(endpoint: &CapturedEndpoint, request: &WorkerRequest) -> ReplayRequest {
    let mut headers = BTreeMap::from([("accept".to_string(), "application/json".to_string())]);

    let body = match &request.data {
        Some(data) if endpoint.method.accepts_body() => {
            headers.insert("content-type".to_string(), "application/json".to_string());
            Some(data.clone())
        }
        _ => None,
    };

    for (name, value) in &request.headers {
        headers.insert(name.to_ascii_lowercase(), value.clone());
    }

    ReplayRequest {
        method: endpoint.method,
        url: resolve_pattern(&endpoint.pattern, request.data.as_ref()),
        headers,
        body,
    }
}
