//! On-disk gallery: a JSON index plus one contract file per domain.
//!
//! Layout under the storage directory:
//! `index.json` (domain → entry) and `specs/<domain>.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{searchable_text, Gallery, GalleryEntry, GallerySubmission};
use crate::error::IndexResult;
use crate::openapi::OpenApiDocument;
use crate::search;

pub struct LocalGallery {
    storage_dir: PathBuf,
    index: Mutex<HashMap<String, GalleryEntry>>,
}

impl LocalGallery {
    /// Create or open a gallery at the given directory.
    pub fn open(storage_dir: &Path) -> IndexResult<Self> {
        std::fs::create_dir_all(storage_dir.join("specs"))?;

        let index_path = storage_dir.join("index.json");
        let index = if index_path.exists() {
            let data = std::fs::read_to_string(&index_path)?;
            serde_json::from_str(&data)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            storage_dir: storage_dir.to_path_buf(),
            index: Mutex::new(index),
        })
    }

    fn spec_path(&self, domain: &str) -> PathBuf {
        let file = domain
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect::<String>();
        self.storage_dir.join("specs").join(format!("{file}.json"))
    }

    async fn save_index(&self, index: &HashMap<String, GalleryEntry>) -> IndexResult<()> {
        let data = serde_json::to_string_pretty(index)?;
        tokio::fs::write(self.storage_dir.join("index.json"), data).await?;
        Ok(())
    }
}

#[async_trait]
impl Gallery for LocalGallery {
    async fn get_by_domain(&self, domain: &str) -> IndexResult<Option<GalleryEntry>> {
        Ok(self.index.lock().await.get(domain).cloned())
    }

    async fn get_spec(&self, domain: &str) -> IndexResult<Option<OpenApiDocument>> {
        if !self.index.lock().await.contains_key(domain) {
            return Ok(None);
        }
        let path = self.spec_path(domain);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn publish(&self, submission: GallerySubmission) -> IndexResult<GalleryEntry> {
        let mut index = self.index.lock().await;
        let entry = submission.to_entry(index.get(&submission.domain));

        let spec = serde_json::to_string_pretty(&submission.spec)?;
        tokio::fs::write(self.spec_path(&submission.domain), spec).await?;

        index.insert(submission.domain.clone(), entry.clone());
        self.save_index(&index).await?;
        Ok(entry)
    }

    async fn search(&self, query: &str, limit: usize) -> IndexResult<Vec<GalleryEntry>> {
        let all: Vec<GalleryEntry> = self.index.lock().await.values().cloned().collect();
        Ok(search::rank(all, query, limit, searchable_text, |e| e.published_at))
    }
}
