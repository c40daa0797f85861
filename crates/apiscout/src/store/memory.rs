//! In-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{upsert_into, Store};
use crate::error::{ResourceKind, ScoutError, ScoutResult};
use crate::types::{CapturedEndpoint, RunRecord, ScoutedPath, Site};

#[derive(Default)]
struct Tables {
    sites: HashMap<String, Site>,
    endpoints: Vec<CapturedEndpoint>,
    paths: HashMap<String, ScoutedPath>,
    runs: Vec<RunRecord>,
    blobs: HashMap<String, Vec<u8>>,
}

/// Store that keeps everything in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit runs in the order they were saved.
    pub async fn runs(&self) -> Vec<RunRecord> {
        self.tables.lock().await.runs.clone()
    }

    pub async fn blob(&self, key: &str) -> Option<Vec<u8>> {
        self.tables.lock().await.blobs.get(key).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_site(&self, site: &Site) -> ScoutResult<()> {
        self.tables.lock().await.sites.insert(site.id.clone(), site.clone());
        Ok(())
    }

    async fn get_site(&self, id: &str) -> ScoutResult<Site> {
        self.tables
            .lock()
            .await
            .sites
            .get(id)
            .cloned()
            .ok_or_else(|| ScoutError::not_found(ResourceKind::Site, id))
    }

    async fn save_endpoints(&self, endpoints: &[CapturedEndpoint]) -> ScoutResult<Vec<CapturedEndpoint>> {
        let mut tables = self.tables.lock().await;
        let mut persisted = Vec::with_capacity(endpoints.len());
        for incoming in endpoints {
            let existing = tables
                .endpoints
                .iter_mut()
                .find(|e| e.identity() == incoming.identity());
            match existing {
                Some(existing) => {
                    upsert_into(existing, incoming);
                    persisted.push(existing.clone());
                }
                None => {
                    tables.endpoints.push(incoming.clone());
                    persisted.push(incoming.clone());
                }
            }
        }
        Ok(persisted)
    }

    async fn get_endpoints(&self, site_id: &str) -> ScoutResult<Vec<CapturedEndpoint>> {
        Ok(self
            .tables
            .lock()
            .await
            .endpoints
            .iter()
            .filter(|e| e.site_id == site_id)
            .cloned()
            .collect())
    }

    async fn save_path(&self, path: &ScoutedPath) -> ScoutResult<()> {
        self.tables.lock().await.paths.insert(path.id.clone(), path.clone());
        Ok(())
    }

    async fn touch_path(&self, id: &str, at: DateTime<Utc>) -> ScoutResult<()> {
        let mut tables = self.tables.lock().await;
        let path = tables
            .paths
            .get_mut(id)
            .ok_or_else(|| ScoutError::not_found(ResourceKind::Path, id))?;
        path.last_used_at = Some(at);
        Ok(())
    }

    async fn get_path(&self, id: &str) -> ScoutResult<ScoutedPath> {
        self.tables
            .lock()
            .await
            .paths
            .get(id)
            .cloned()
            .ok_or_else(|| ScoutError::not_found(ResourceKind::Path, id))
    }

    async fn list_paths(&self) -> ScoutResult<Vec<ScoutedPath>> {
        let mut paths: Vec<ScoutedPath> = self.tables.lock().await.paths.values().cloned().collect();
        paths.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paths)
    }

    async fn save_run(&self, run: &RunRecord) -> ScoutResult<()> {
        self.tables.lock().await.runs.push(run.clone());
        Ok(())
    }

    async fn save_blob(&self, key: &str, bytes: &[u8]) -> ScoutResult<()> {
        self.tables.lock().await.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
