//! Directory: a searchable index of domain fingerprints.
//!
//! Publishing validates the contract, then derives a [`Fingerprint`] whose
//! version starts at 1 and increments per publish of the same domain. The
//! read-then-increment is serialized in-process only; two processes sharing
//! one directory file can race.

pub mod local;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{IndexError, IndexResult};
use crate::openapi::OpenApiDocument;

pub use local::LocalDirectory;
pub use memory::MemoryDirectory;

/// Lightweight summary of a domain's discovered capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub domain: String,
    pub url: String,
    pub version: u32,
    pub endpoint_count: usize,
    /// Operation count per HTTP method.
    pub methods: BTreeMap<String, usize>,
    /// First literal path segment of each endpoint, deduplicated.
    pub capabilities: Vec<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DirectorySubmission {
    pub domain: String,
    pub url: String,
    pub spec: OpenApiDocument,
}

/// Domain index used for cross-site search.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Validate and index. Fails with `IndexError::Validation` for bad input.
    async fn publish(&self, submission: DirectorySubmission) -> IndexResult<Fingerprint>;

    async fn get_by_domain(&self, domain: &str) -> IndexResult<Option<Fingerprint>>;

    /// Token search over domain and capabilities.
    async fn search(&self, query: &str, limit: usize) -> IndexResult<Vec<Fingerprint>>;
}

/// Reject submissions that could not describe a usable API.
pub fn validate(submission: &DirectorySubmission) -> IndexResult<()> {
    if submission.domain.trim().is_empty() {
        return Err(IndexError::Validation("domain must not be empty".into()));
    }
    if !submission.spec.openapi.starts_with("3.") {
        return Err(IndexError::Validation(format!(
            "unsupported OpenAPI version {}",
            submission.spec.openapi
        )));
    }
    if submission.spec.paths.is_empty() {
        return Err(IndexError::Validation(format!(
            "contract for {} has no paths",
            submission.domain
        )));
    }
    Ok(())
}

/// Build the fingerprint for a validated submission.
pub fn fingerprint(submission: &DirectorySubmission, version: u32) -> Fingerprint {
    let patterns = submission.spec.endpoint_patterns();

    let mut methods: BTreeMap<String, usize> = BTreeMap::new();
    let mut capabilities: Vec<String> = Vec::new();
    for (method, pattern) in &patterns {
        *methods.entry(method.as_str().to_string()).or_default() += 1;
        if let Some(capability) = first_literal_segment(pattern) {
            if !capabilities.contains(&capability) {
                capabilities.push(capability);
            }
        }
    }

    Fingerprint {
        domain: submission.domain.clone(),
        url: submission.url.clone(),
        version,
        endpoint_count: patterns.len(),
        methods,
        capabilities,
        published_at: Utc::now(),
    }
}

fn first_literal_segment(pattern: &str) -> Option<String> {
    let url = Url::parse(pattern).ok()?;
    url.path_segments()?
        .find(|s| !s.is_empty() && !s.starts_with(':'))
        .map(str::to_lowercase)
}

pub(crate) fn searchable_text(fp: &Fingerprint) -> String {
    format!("{} {}", fp.domain, fp.capabilities.join(" "))
}
