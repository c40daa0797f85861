//! Gallery: a per-domain cache of previously scouted contracts.
//!
//! Consulted before browsing; a hit lets discovery skip the browser entirely.

pub mod local;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexResult;
use crate::openapi::OpenApiDocument;

pub use local::LocalGallery;
pub use memory::MemoryGallery;

/// Cached summary of a domain's latest contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub domain: String,
    pub url: String,
    pub task: String,
    pub site_id: String,
    pub path_id: String,
    pub endpoint_count: usize,
    pub version: u32,
    pub published_at: DateTime<Utc>,
}

/// What a scout hands to the gallery.
#[derive(Debug, Clone)]
pub struct GallerySubmission {
    pub domain: String,
    pub url: String,
    pub task: String,
    pub site_id: String,
    pub path_id: String,
    pub spec: OpenApiDocument,
}

impl GallerySubmission {
    /// Entry for this submission, replacing `previous` if the domain was cached.
    pub fn to_entry(&self, previous: Option<&GalleryEntry>) -> GalleryEntry {
        GalleryEntry {
            domain: self.domain.clone(),
            url: self.url.clone(),
            task: self.task.clone(),
            site_id: self.site_id.clone(),
            path_id: self.path_id.clone(),
            endpoint_count: self.spec.operation_count(),
            version: previous.map(|p| p.version + 1).unwrap_or(1),
            published_at: Utc::now(),
        }
    }
}

/// Contract cache keyed by domain.
#[async_trait]
pub trait Gallery: Send + Sync {
    async fn get_by_domain(&self, domain: &str) -> IndexResult<Option<GalleryEntry>>;

    /// The cached contract for `domain`, if one is stored and readable.
    async fn get_spec(&self, domain: &str) -> IndexResult<Option<OpenApiDocument>>;

    /// Replace the domain's entry; the version increments on every publish.
    async fn publish(&self, submission: GallerySubmission) -> IndexResult<GalleryEntry>;

    /// Token search over domain and task.
    async fn search(&self, query: &str, limit: usize) -> IndexResult<Vec<GalleryEntry>>;
}

pub(crate) fn searchable_text(entry: &GalleryEntry) -> String {
    format!("{} {}", entry.domain, entry.task)
}
