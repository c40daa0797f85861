//! Core records shared across discovery, replay and heal.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::JsonSchema;

/// The seven HTTP verbs an endpoint can be keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// POST, PUT and PATCH carry a JSON request body.
    pub fn accepts_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    /// Case-insensitive; anything outside the seven verbs is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| format!("unsupported HTTP method: {s}"))
    }
}

/// One captured HTTP exchange, as reported by the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub request_id: String,
    pub url: String,
    /// Raw method string; the classifier validates it.
    pub method: String,
    /// Browser resource kind: "xhr", "fetch", "document", "script", ...
    pub resource_type: String,
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
    pub request_body: Option<String>,
    pub response_body: Option<String>,
    pub status: u16,
    pub timestamp: DateTime<Utc>,
}

impl NetworkEvent {
    /// Minimal event builder, mostly for recorded sessions and tests.
    pub fn new(method: &str, url: &str, resource_type: &str, status: u16) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
            method: method.to_string(),
            resource_type: resource_type.to_string(),
            request_headers: BTreeMap::new(),
            response_headers: BTreeMap::new(),
            request_body: None,
            response_body: None,
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn with_request_body(mut self, body: impl Into<String>) -> Self {
        self.request_body = Some(body.into());
        self
    }

    pub fn with_response_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = Some(body.into());
        self
    }
}

/// A site that was scouted. One record per discovery call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub url: String,
    pub domain: String,
    pub first_scouted_at: DateTime<Utc>,
    pub last_scouted_at: DateTime<Utc>,
}

impl Site {
    pub fn new(url: &str, domain: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
            domain: domain.to_string(),
            first_scouted_at: now,
            last_scouted_at: now,
        }
    }
}

/// A deduplicated (method, pattern) API surface with inferred schemas.
///
/// Identity is `(site_id, method, pattern)` and never changes once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEndpoint {
    pub id: String,
    pub site_id: String,
    pub method: HttpMethod,
    pub pattern: String,
    pub request_schema: Option<JsonSchema>,
    pub response_schema: Option<JsonSchema>,
    pub sample_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl CapturedEndpoint {
    /// Fold a repeat observation into this record. Schemas merge, never overwrite.
    pub fn absorb(&mut self, other: &CapturedEndpoint) {
        self.sample_count += other.sample_count;
        self.request_schema = merge_optional(self.request_schema.take(), other.request_schema.clone());
        self.response_schema =
            merge_optional(self.response_schema.take(), other.response_schema.clone());
        if other.first_seen < self.first_seen {
            self.first_seen = other.first_seen;
        }
        if other.last_seen > self.last_seen {
            self.last_seen = other.last_seen;
        }
    }

    pub fn identity(&self) -> (&str, HttpMethod, &str) {
        (&self.site_id, self.method, &self.pattern)
    }
}

fn merge_optional(a: Option<JsonSchema>, b: Option<JsonSchema>) -> Option<JsonSchema> {
    match (a, b) {
        (Some(a), Some(b)) => Some(crate::schema::merge(&a, &b)),
        (a, b) => a.or(b),
    }
}

/// Lifecycle of a scouted path.
///
/// `Active → Broken → Healing → Active | Broken`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Active,
    Broken,
    Healing,
}

impl PathStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathStatus::Active => "active",
            PathStatus::Broken => "broken",
            PathStatus::Healing => "healing",
        }
    }
}

impl FromStr for PathStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PathStatus::Active),
            "broken" => Ok(PathStatus::Broken),
            "healing" => Ok(PathStatus::Healing),
            other => Err(format!("unknown path status: {other}")),
        }
    }
}

/// One step of the navigation that surfaced a path's endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NavigationStep {
    Navigate { url: String },
}

/// A discovery session's navigation plus the endpoints it surfaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutedPath {
    pub id: String,
    pub site_id: String,
    pub task: String,
    pub steps: Vec<NavigationStep>,
    pub endpoint_ids: Vec<String>,
    pub status: PathStatus,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub fail_count: u32,
    pub heal_count: u32,
}

impl ScoutedPath {
    pub fn new(site_id: &str, task: &str, steps: Vec<NavigationStep>, endpoint_ids: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            site_id: site_id.to_string(),
            task: task.to_string(),
            steps,
            endpoint_ids,
            status: PathStatus::Active,
            created_at: Utc::now(),
            last_used_at: None,
            fail_count: 0,
            heal_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Scout,
    Worker,
    Heal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

/// Audit record of one scout, replay or heal attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub kind: RunKind,
    pub status: RunStatus,
    pub path_id: Option<String>,
    pub site_id: Option<String>,
    pub duration_ms: u64,
    pub error: Option<String>,
    #[serde(default)]
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(kind: RunKind, status: RunStatus, duration_ms: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            status,
            path_id: None,
            site_id: None,
            duration_ms,
            error: None,
            detail: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn for_path(mut self, path_id: &str) -> Self {
        self.path_id = Some(path_id.to_string());
        self
    }

    pub fn for_site(mut self, site_id: &str) -> Self {
        self.site_id = Some(site_id.to_string());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}
