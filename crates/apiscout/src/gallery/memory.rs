//! In-memory gallery.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{searchable_text, Gallery, GalleryEntry, GallerySubmission};
use crate::error::IndexResult;
use crate::openapi::OpenApiDocument;
use crate::search;

#[derive(Default)]
pub struct MemoryGallery {
    entries: Mutex<HashMap<String, (GalleryEntry, OpenApiDocument)>>,
}

impl MemoryGallery {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Gallery for MemoryGallery {
    async fn get_by_domain(&self, domain: &str) -> IndexResult<Option<GalleryEntry>> {
        Ok(self.entries.lock().await.get(domain).map(|(e, _)| e.clone()))
    }

    async fn get_spec(&self, domain: &str) -> IndexResult<Option<OpenApiDocument>> {
        Ok(self.entries.lock().await.get(domain).map(|(_, s)| s.clone()))
    }

    async fn publish(&self, submission: GallerySubmission) -> IndexResult<GalleryEntry> {
        let mut entries = self.entries.lock().await;
        let entry = submission.to_entry(entries.get(&submission.domain).map(|(e, _)| e));
        entries.insert(submission.domain.clone(), (entry.clone(), submission.spec));
        Ok(entry)
    }

    async fn search(&self, query: &str, limit: usize) -> IndexResult<Vec<GalleryEntry>> {
        let all: Vec<GalleryEntry> = self.entries.lock().await.values().map(|(e, _)| e.clone()).collect();
        Ok(search::rank(all, query, limit, searchable_text, |e| e.published_at))
    }
}
