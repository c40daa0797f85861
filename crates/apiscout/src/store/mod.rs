//! Persistence for sites, endpoints, paths, audit runs and blobs.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ScoutResult;
use crate::types::{CapturedEndpoint, RunRecord, ScoutedPath, Site};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage collaborator used by the scout, worker and healer.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_site(&self, site: &Site) -> ScoutResult<()>;

    /// Fails with `NotFound` when no site has this id.
    async fn get_site(&self, id: &str) -> ScoutResult<Site>;

    /// Upsert on `(site_id, method, pattern)`.
    ///
    /// A repeat observation accumulates `sample_count`, merges schemas and
    /// advances `last_seen`; the stored id and `first_seen` are kept. Returns
    /// the persisted records in input order, carrying their canonical ids.
    async fn save_endpoints(&self, endpoints: &[CapturedEndpoint]) -> ScoutResult<Vec<CapturedEndpoint>>;

    /// Endpoints of one site, oldest first.
    async fn get_endpoints(&self, site_id: &str) -> ScoutResult<Vec<CapturedEndpoint>>;

    /// Insert or replace by id.
    async fn save_path(&self, path: &ScoutedPath) -> ScoutResult<()>;

    /// Set `last_used_at` without touching any other column, so a concurrent
    /// status transition is not overwritten. `NotFound` when the id is unknown.
    async fn touch_path(&self, id: &str, at: DateTime<Utc>) -> ScoutResult<()>;

    /// Fails with `NotFound` when no path has this id.
    async fn get_path(&self, id: &str) -> ScoutResult<ScoutedPath>;

    /// All paths, newest first.
    async fn list_paths(&self) -> ScoutResult<Vec<ScoutedPath>>;

    async fn save_run(&self, run: &RunRecord) -> ScoutResult<()>;

    /// Store opaque bytes under a `/`-separated key.
    async fn save_blob(&self, key: &str, bytes: &[u8]) -> ScoutResult<()>;
}

/// Merge `incoming` into the already persisted `existing` record.
pub(crate) fn upsert_into(existing: &mut CapturedEndpoint, incoming: &CapturedEndpoint) {
    let first_seen = existing.first_seen;
    existing.absorb(incoming);
    existing.first_seen = first_seen;
}
