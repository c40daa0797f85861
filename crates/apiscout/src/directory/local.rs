//! Directory persisted as a single JSON file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{fingerprint, searchable_text, validate, Directory, DirectorySubmission, Fingerprint};
use crate::error::IndexResult;
use crate::search;

pub struct LocalDirectory {
    index_path: PathBuf,
    entries: Mutex<HashMap<String, Fingerprint>>,
}

impl LocalDirectory {
    /// Create or open `fingerprints.json` under `storage_dir`.
    pub fn open(storage_dir: &Path) -> IndexResult<Self> {
        std::fs::create_dir_all(storage_dir)?;
        let index_path = storage_dir.join("fingerprints.json");
        let entries = if index_path.exists() {
            let data = std::fs::read_to_string(&index_path)?;
            serde_json::from_str(&data)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            index_path,
            entries: Mutex::new(entries),
        })
    }
}

#[async_trait]
impl Directory for LocalDirectory {
    async fn publish(&self, submission: DirectorySubmission) -> IndexResult<Fingerprint> {
        validate(&submission)?;
        let mut entries = self.entries.lock().await;
        let version = entries.get(&submission.domain).map(|f| f.version + 1).unwrap_or(1);
        let fp = fingerprint(&submission, version);
        entries.insert(fp.domain.clone(), fp.clone());

        let data = serde_json::to_string_pretty(&*entries)?;
        tokio::fs::write(&self.index_path, data).await?;
        Ok(fp)
    }

    async fn get_by_domain(&self, domain: &str) -> IndexResult<Option<Fingerprint>> {
        Ok(self.entries.lock().await.get(domain).cloned())
    }

    async fn search(&self, query: &str, limit: usize) -> IndexResult<Vec<Fingerprint>> {
        let all: Vec<Fingerprint> = self.entries.lock().await.values().cloned().collect();
        Ok(search::rank(all, query, limit, searchable_text, |f| f.published_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openapi::generate;
    use crate::types::{CapturedEndpoint, HttpMethod};
    use chrono::Utc;

    fn submission() -> DirectorySubmission {
        let now = Utc::now();
        let endpoint = CapturedEndpoint {
            id: "e1".into(),
            site_id: "s1".into(),
            method: HttpMethod::Post,
            pattern: "https://example.com/api/orders".into(),
            request_schema: None,
            response_schema: None,
            sample_count: 1,
            first_seen: now,
            last_seen: now,
        };
        DirectorySubmission {
            domain: "example.com".into(),
            url: "https://example.com".into(),
            spec: generate("https://example.com", &[endpoint]),
        }
    }

    #[tokio::test]
    async fn test_version_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let directory = LocalDirectory::open(dir.path()).unwrap();
            assert_eq!(directory.publish(submission()).await.unwrap().version, 1);
        }
        let directory = LocalDirectory::open(dir.path()).unwrap();
        let fp = directory.publish(submission()).await.unwrap();
        assert_eq!(fp.version, 2);
        assert_eq!(fp.capabilities, vec!["api".to_string()]);
    }
}
