//! In-memory directory.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{fingerprint, searchable_text, validate, Directory, DirectorySubmission, Fingerprint};
use crate::error::IndexResult;
use crate::search;

#[derive(Default)]
pub struct MemoryDirectory {
    entries: Mutex<HashMap<String, Fingerprint>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn publish(&self, submission: DirectorySubmission) -> IndexResult<Fingerprint> {
        validate(&submission)?;
        let mut entries = self.entries.lock().await;
        let version = entries.get(&submission.domain).map(|f| f.version + 1).unwrap_or(1);
        let fp = fingerprint(&submission, version);
        entries.insert(fp.domain.clone(), fp.clone());
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
    use crate::error::IndexError;
    use crate::openapi::generate;
    use crate::types::{CapturedEndpoint, HttpMethod};
    use chrono::Utc;

    fn submission(domain: &str) -> DirectorySubmission {
        let now = Utc::now();
        let base = format!("https://{domain}");
        let endpoint = CapturedEndpoint {
            id: "e1".into(),
            site_id: "s1".into(),
            method: HttpMethod::Get,
            pattern: format!("{base}/users"),
            request_schema: None,
            response_schema: None,
            sample_count: 1,
            first_seen: now,
            last_seen: now,
        };
        DirectorySubmission {
            domain: domain.into(),
            url: base.clone(),
            spec: generate(&base, &[endpoint]),
        }
    }

    #[tokio::test]
    async fn test_republish_increments_version() {
        let directory = MemoryDirectory::new();
        assert_eq!(directory.publish(submission("example.com")).await.unwrap().version, 1);
        assert_eq!(directory.publish(submission("example.com")).await.unwrap().version, 2);
        assert_eq!(
            directory.get_by_domain("example.com").await.unwrap().unwrap().version,
            2
        );
    }

    #[tokio::test]
    async fn test_invalid_submission_is_not_indexed() {
        let directory = MemoryDirectory::new();
        let mut bad = submission("example.com");
        bad.spec.openapi = "2.0".into();
        assert!(matches!(
            directory.publish(bad).await,
            Err(IndexError::Validation(_))
        ));
        assert!(directory.get_by_domain("example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_by_capability() {
        let directory = MemoryDirectory::new();
        directory.publish(submission("a.example.com")).await.unwrap();
        assert_eq!(directory.search("users", 5).await.unwrap().len(), 1);
        assert!(directory.search("weather", 5).await.unwrap().is_empty());
    }
}
