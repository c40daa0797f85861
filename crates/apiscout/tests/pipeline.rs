//! Discovery → replay → heal against in-memory collaborators and a mock HTTP
//! server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apiscout::{
    Browser, CapturedEndpoint, Directory, DirectorySubmission, Fingerprint, Gallery, GalleryEntry,
    GallerySubmission, HealRequest, Healer, HttpMethod, IndexError, IndexResult, MemoryDirectory,
    MemoryGallery, MemoryStore, NetworkEvent, OpenApiDocument, PathStatus, RecordedBrowser,
    RetryPolicy, RunKind, RunRecord, RunStatus, Scout, ScoutError, ScoutOptions, ScoutRequest,
    ScoutResult, ScoutedPath, Site, SqliteStore, Store, Worker, WorkerRequest,
};
use assert_json_diff::assert_json_include;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetch(method: &str, url: &str, status: u16, body: serde_json::Value) -> NetworkEvent {
    NetworkEvent::new(method, url, "fetch", status).with_response_body(body.to_string())
}

fn fast() -> ScoutOptions {
    ScoutOptions::default().with_settle_delay(Duration::ZERO)
}

fn scout_with(browser: &Arc<RecordedBrowser>, store: &Arc<MemoryStore>) -> Scout {
    Scout::new(browser.clone(), store.clone()).with_options(fast())
}

#[tokio::test]
async fn scout_single_get_yields_one_endpoint() {
    let browser = Arc::new(RecordedBrowser::new(vec![
        NetworkEvent::new("GET", "https://example.com/", "document", 200),
        NetworkEvent::new("GET", "https://example.com/app.js", "script", 200),
        fetch(
            "GET",
            "https://api.example.com/users",
            200,
            json!([{"id": 1, "name": "Alice"}]),
        ),
    ]));
    let store = Arc::new(MemoryStore::new());
    let scout = scout_with(&browser, &store);

    let outcome = scout
        .scout(&ScoutRequest::new("https://example.com", "list users"))
        .await
        .unwrap();

    assert_eq!(outcome.endpoint_count, 1);
    assert_eq!(outcome.from_gallery, None);
    assert_eq!(outcome.open_api_spec.paths.len(), 1);
    let item = outcome.open_api_spec.paths.values().next().unwrap();
    assert_eq!(item.methods(), vec![HttpMethod::Get]);

    assert_json_include!(
        actual: serde_json::to_value(&outcome.open_api_spec).unwrap(),
        expected: json!({
            "openapi": "3.1.0",
            "info": {"title": "API for https://example.com", "version": "1.0.0"},
            "servers": [{"url": "https://example.com"}],
            "paths": {
                "/users": {
                    "servers": [{"url": "https://api.example.com"}],
                    "get": {
                        "responses": {
                            "200": {
                                "description": "Successful response",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": {"type": "object", "required": ["id", "name"]}
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        })
    );

    let path = store.get_path(&outcome.path_id).await.unwrap();
    assert_eq!(path.status, PathStatus::Active);
    assert_eq!(path.endpoint_ids.len(), 1);
    assert_eq!(path.task, "list users");

    let endpoints = store.get_endpoints(&outcome.site_id).await.unwrap();
    assert_eq!(endpoints[0].pattern, "https://api.example.com/users");
    assert_eq!(endpoints[0].sample_count, 1);

    let site = store.get_site(&outcome.site_id).await.unwrap();
    assert_eq!(site.domain, "example.com");

    assert!(store
        .blob(&format!("screenshots/{}/scout.png", outcome.site_id))
        .await
        .is_some());
    assert!(store
        .blob(&format!("specs/{}/openapi.json", outcome.site_id))
        .await
        .is_some());

    let runs = store.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].kind, RunKind::Scout);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(browser.active_sessions(), 0);
}

#[tokio::test]
async fn scout_groups_numeric_ids_into_one_endpoint() {
    let browser = Arc::new(RecordedBrowser::new(vec![
        fetch("GET", "https://api.example.com/users/1", 200, json!({"id": 1})),
        fetch("GET", "https://api.example.com/users/2?expand=true", 200, json!({"id": 2})),
    ]));
    let store = Arc::new(MemoryStore::new());

    let outcome = scout_with(&browser, &store)
        .scout(&ScoutRequest::new("https://api.example.com", "users"))
        .await
        .unwrap();

    assert_eq!(outcome.endpoint_count, 1);
    let endpoints = store.get_endpoints(&outcome.site_id).await.unwrap();
    assert_eq!(endpoints[0].sample_count, 2);
    assert_eq!(endpoints[0].pattern, "https://api.example.com/users/:id");
    assert!(outcome.open_api_spec.paths.contains_key("/users/{id}"));
}

#[tokio::test]
async fn gallery_hit_skips_the_browser() {
    let browser = Arc::new(RecordedBrowser::new(vec![fetch(
        "GET",
        "https://api.example.com/users",
        200,
        json!([{"id": 1}]),
    )]));
    let store = Arc::new(MemoryStore::new());
    let gallery = Arc::new(MemoryGallery::new());
    let directory = Arc::new(MemoryDirectory::new());
    let scout = scout_with(&browser, &store)
        .with_gallery(gallery.clone())
        .with_directory(directory.clone());

    let first = scout
        .scout(&ScoutRequest::new("https://api.example.com", "users"))
        .await
        .unwrap();
    assert_eq!(gallery.get_by_domain("api.example.com").await.unwrap().unwrap().version, 1);
    assert!(directory.get_by_domain("api.example.com").await.unwrap().is_none());

    let cached = scout
        .scout(&ScoutRequest::new("https://api.example.com", "users").with_publish(Some(true)))
        .await
        .unwrap();

    assert_eq!(cached.from_gallery, Some(true));
    assert_eq!(cached.endpoint_count, 1);
    assert_ne!(cached.site_id, first.site_id);
    assert_eq!(browser.visited().await.len(), 1);

    let endpoints = store.get_endpoints(&cached.site_id).await.unwrap();
    assert_eq!(endpoints[0].method, HttpMethod::Get);
    assert_eq!(endpoints[0].pattern, "https://api.example.com/users");
    assert_eq!(endpoints[0].sample_count, 0);
    assert!(endpoints[0].response_schema.is_none());
    assert!(store
        .blob(&format!("specs/{}/openapi.json", cached.site_id))
        .await
        .is_some());

    assert_eq!(gallery.get_by_domain("api.example.com").await.unwrap().unwrap().version, 2);
    assert_eq!(directory.get_by_domain("api.example.com").await.unwrap().unwrap().version, 1);

    scout
        .scout(&ScoutRequest::new("https://api.example.com", "users").with_publish(Some(true)))
        .await
        .unwrap();
    assert_eq!(directory.get_by_domain("api.example.com").await.unwrap().unwrap().version, 2);

    let fresh = scout
        .scout(&ScoutRequest::new("https://api.example.com", "users").without_cache())
        .await
        .unwrap();
    assert_eq!(fresh.from_gallery, None);
    assert_eq!(browser.visited().await.len(), 2);
}

#[tokio::test]
async fn no_publish_leaves_gallery_untouched() {
    let browser = Arc::new(RecordedBrowser::new(vec![fetch(
        "GET",
        "https://api.example.com/users",
        200,
        json!([]),
    )]));
    let store = Arc::new(MemoryStore::new());
    let gallery = Arc::new(MemoryGallery::new());
    let scout = scout_with(&browser, &store).with_gallery(gallery.clone());

    scout
        .scout(&ScoutRequest::new("https://api.example.com", "users").with_publish(Some(false)))
        .await
        .unwrap();
    assert!(gallery.get_by_domain("api.example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn worker_unknown_path_is_not_found() {
    let worker = Worker::new(Arc::new(MemoryStore::new()));
    let err = worker.run(&WorkerRequest::new("missing")).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.status_class(), 404);
}

#[tokio::test]
async fn worker_without_endpoints_is_a_soft_failure() {
    let store = Arc::new(MemoryStore::new());
    let path = ScoutedPath::new("s1", "nothing", Vec::new(), Vec::new());
    store.save_path(&path).await.unwrap();

    let outcome = Worker::new(store.clone())
        .run(&WorkerRequest::new(&path.id))
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.response, Some(json!("No endpoints found for path")));
    let runs = store.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failure);
}

#[tokio::test]
async fn worker_prefers_body_endpoint_when_data_is_given() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("accept", "application/json"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"name": "Bob"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 3, "name": "Bob"})))
        .expect(1)
        .mount(&server)
        .await;

    let browser = Arc::new(RecordedBrowser::new(vec![
        fetch("GET", &format!("{base}/users/42"), 200, json!({"id": 42})),
        NetworkEvent::new("POST", &format!("{base}/users"), "xhr", 201)
            .with_request_body(r#"{"name":"Alice"}"#)
            .with_response_body(r#"{"id":1,"name":"Alice"}"#),
    ]));
    let store = Arc::new(MemoryStore::new());
    let outcome = scout_with(&browser, &store)
        .scout(&ScoutRequest::new(&format!("{base}/app"), "create user"))
        .await
        .unwrap();
    assert_eq!(outcome.endpoint_count, 2);

    let worker = Worker::new(store.clone());
    let result = worker
        .run(&WorkerRequest::new(&outcome.path_id).with_data(json!({"name": "Bob"})))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.response, Some(json!({"id": 3, "name": "Bob"})));
    let path = store.get_path(&outcome.path_id).await.unwrap();
    assert!(path.last_used_at.is_some());
}

#[tokio::test]
async fn worker_substitutes_path_params_and_sends_caller_headers() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/orders/7"))
        .and(header("x-token", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain text"))
        .expect(1)
        .mount(&server)
        .await;

    let browser = Arc::new(RecordedBrowser::new(vec![fetch(
        "GET",
        &format!("{base}/orders/12345"),
        200,
        json!({"id": 12345}),
    )]));
    let store = Arc::new(MemoryStore::new());
    let outcome = scout_with(&browser, &store)
        .scout(&ScoutRequest::new(&base, "orders"))
        .await
        .unwrap();

    let result = Worker::new(store.clone())
        .run(
            &WorkerRequest::new(&outcome.path_id)
                .with_data(json!({"id": 7}))
                .with_header("X-Token", "secret"),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.response, Some(json!("plain text")));
}

#[tokio::test]
async fn worker_http_failure_is_a_network_error() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let browser = Arc::new(RecordedBrowser::new(vec![fetch(
        "GET",
        &format!("{base}/users"),
        200,
        json!([]),
    )]));
    let store = Arc::new(MemoryStore::new());
    let outcome = scout_with(&browser, &store)
        .scout(&ScoutRequest::new(&base, "users"))
        .await
        .unwrap();

    let err = Worker::new(store.clone())
        .run(&WorkerRequest::new(&outcome.path_id))
        .await
        .unwrap_err();
    match err {
        ScoutError::Network { url, status, message } => {
            assert_eq!(url, format!("{base}/users"));
            assert_eq!(status, Some(503));
            assert!(message.contains("maintenance"));
        }
        other => panic!("expected network error, got {other:?}"),
    }

    let runs = store.runs().await;
    let last = runs.last().unwrap();
    assert_eq!(last.kind, RunKind::Worker);
    assert_eq!(last.status, RunStatus::Failure);
}

/// Scout `v1`, then switch the recorded capture to `v2` for re-discovery.
async fn scouted_versions(
    server: &MockServer,
) -> (Arc<RecordedBrowser>, Arc<MemoryStore>, Arc<Scout>, String) {
    let base = server.uri();
    let browser = Arc::new(RecordedBrowser::new(vec![fetch(
        "GET",
        &format!("{base}/api/v1/users"),
        200,
        json!([{"id": 1}]),
    )]));
    let store = Arc::new(MemoryStore::new());
    let scout = Arc::new(scout_with(&browser, &store));
    let outcome = scout
        .scout(&ScoutRequest::new(&format!("{base}/app"), "list users"))
        .await
        .unwrap();

    browser
        .set_events(vec![fetch(
            "GET",
            &format!("{base}/api/v2/users"),
            200,
            json!([{"id": 1}]),
        )])
        .await;

    (browser, store, scout, outcome.path_id)
}

#[tokio::test]
async fn heal_rediscovers_and_restores_original_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let (browser, store, scout, path_id) = scouted_versions(&server).await;
    let healer = Healer::new(scout, Arc::new(Worker::new(store.clone())))
        .with_policy(RetryPolicy::immediate(2));

    let outcome = healer
        .heal(&HealRequest::new(&path_id).with_error("500 from /api/v1/users"))
        .await
        .unwrap();

    assert!(outcome.healed);
    let new_path_id = outcome.new_path_id.unwrap();
    assert_ne!(new_path_id, path_id);
    assert_eq!(outcome.unverified_path_id, None);

    let original = store.get_path(&path_id).await.unwrap();
    assert_eq!(original.status, PathStatus::Active);
    assert_eq!(original.heal_count, 1);
    assert_eq!(original.fail_count, 1);
    assert_eq!(store.get_path(&new_path_id).await.unwrap().status, PathStatus::Active);

    let heal_runs: Vec<_> = store
        .runs()
        .await
        .into_iter()
        .filter(|r| r.kind == RunKind::Heal)
        .collect();
    assert_eq!(heal_runs.len(), 2);
    assert_eq!(heal_runs[0].status, RunStatus::Failure);
    assert_eq!(heal_runs[0].error.as_deref(), Some("500 from /api/v1/users"));
    assert_eq!(heal_runs[1].status, RunStatus::Success);
    assert_eq!(browser.active_sessions(), 0);
}

#[tokio::test]
async fn heal_returns_unverified_path_when_replacement_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_browser, store, scout, path_id) = scouted_versions(&server).await;
    let healer = Healer::new(scout, Arc::new(Worker::new(store.clone())))
        .with_policy(RetryPolicy::immediate(2));

    let outcome = healer.heal(&HealRequest::new(&path_id)).await.unwrap();

    assert!(!outcome.healed);
    assert_eq!(outcome.new_path_id, None);
    let unverified = outcome.unverified_path_id.unwrap();
    assert!(store.get_path(&unverified).await.is_ok());

    let original = store.get_path(&path_id).await.unwrap();
    assert_eq!(original.status, PathStatus::Broken);
    assert_eq!(original.fail_count, 2);
    assert_eq!(original.heal_count, 1);
}

#[tokio::test]
async fn heal_succeeds_on_retry_without_mutation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let (browser, store, scout, path_id) = scouted_versions(&server).await;
    let healer = Healer::new(scout, Arc::new(Worker::new(store.clone())));

    let outcome = healer.heal(&HealRequest::new(&path_id)).await.unwrap();
    assert!(outcome.healed);
    assert_eq!(outcome.new_path_id, None);

    let path = store.get_path(&path_id).await.unwrap();
    assert_eq!(path.status, PathStatus::Active);
    assert_eq!(path.fail_count, 0);
    assert_eq!(browser.visited().await.len(), 1);
}

#[tokio::test]
async fn heal_propagates_missing_site_and_leaves_path_broken() {
    let store = Arc::new(MemoryStore::new());
    let path = ScoutedPath::new("ghost-site", "orphan", Vec::new(), Vec::new());
    store.save_path(&path).await.unwrap();

    let browser = Arc::new(RecordedBrowser::new(Vec::new()));
    let scout = Arc::new(scout_with(&browser, &store));
    let healer = Healer::new(scout, Arc::new(Worker::new(store.clone())))
        .with_policy(RetryPolicy::immediate(1));

    let err = healer.heal(&HealRequest::new(&path.id)).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(store.get_path(&path.id).await.unwrap().status, PathStatus::Broken);

    assert!(healer.heal(&HealRequest::new("nope")).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn sqlite_backed_scout_and_replay() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"sku": "A1"}])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&dir.path().join("apiscout.db"), &dir.path().join("blobs")).unwrap(),
    );
    let browser = Arc::new(RecordedBrowser::new(vec![fetch(
        "GET",
        &format!("{base}/items"),
        200,
        json!([{"sku": "A1"}]),
    )]));
    let outcome = Scout::new(browser, store.clone())
        .with_options(fast())
        .scout(&ScoutRequest::new(&base, "items"))
        .await
        .unwrap();

    let spec_path = dir
        .path()
        .join(format!("blobs/specs/{}/openapi.json", outcome.site_id));
    let spec: serde_json::Value = serde_json::from_slice(&std::fs::read(spec_path).unwrap()).unwrap();
    assert_eq!(spec["openapi"], "3.1.0");

    let result = Worker::new(store)
        .run(&WorkerRequest::new(&outcome.path_id))
        .await
        .unwrap();
    assert_eq!(result.response, Some(json!([{"sku": "A1"}])));
}

fn offline() -> IndexError {
    IndexError::Io(std::io::Error::other("index offline"))
}

/// Gallery whose publishes always fail; lookups fail on request.
struct UnreliableGallery {
    inner: Arc<MemoryGallery>,
    fail_lookups: bool,
}

#[async_trait]
impl Gallery for UnreliableGallery {
    async fn get_by_domain(&self, domain: &str) -> IndexResult<Option<GalleryEntry>> {
        if self.fail_lookups {
            return Err(offline());
        }
        self.inner.get_by_domain(domain).await
    }

    async fn get_spec(&self, domain: &str) -> IndexResult<Option<OpenApiDocument>> {
        if self.fail_lookups {
            return Err(offline());
        }
        self.inner.get_spec(domain).await
    }

    async fn publish(&self, _submission: GallerySubmission) -> IndexResult<GalleryEntry> {
        Err(offline())
    }

    async fn search(&self, query: &str, limit: usize) -> IndexResult<Vec<GalleryEntry>> {
        self.inner.search(query, limit).await
    }
}

struct FailingDirectory;

#[async_trait]
impl Directory for FailingDirectory {
    async fn publish(&self, _submission: DirectorySubmission) -> IndexResult<Fingerprint> {
        Err(offline())
    }

    async fn get_by_domain(&self, _domain: &str) -> IndexResult<Option<Fingerprint>> {
        Err(offline())
    }

    async fn search(&self, _query: &str, _limit: usize) -> IndexResult<Vec<Fingerprint>> {
        Err(offline())
    }
}

/// Memory store whose endpoint table can be made to fail.
#[derive(Default)]
struct FaultyStore {
    inner: MemoryStore,
    fail_endpoint_writes: bool,
    fail_endpoint_reads: bool,
    endpoint_reads: AtomicUsize,
}

impl FaultyStore {
    fn disk_full() -> ScoutError {
        ScoutError::persistence("disk full")
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn save_site(&self, site: &Site) -> ScoutResult<()> {
        self.inner.save_site(site).await
    }

    async fn get_site(&self, id: &str) -> ScoutResult<Site> {
        self.inner.get_site(id).await
    }

    async fn save_endpoints(&self, endpoints: &[CapturedEndpoint]) -> ScoutResult<Vec<CapturedEndpoint>> {
        if self.fail_endpoint_writes {
            return Err(Self::disk_full());
        }
        self.inner.save_endpoints(endpoints).await
    }

    async fn get_endpoints(&self, site_id: &str) -> ScoutResult<Vec<CapturedEndpoint>> {
        self.endpoint_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_endpoint_reads {
            return Err(Self::disk_full());
        }
        self.inner.get_endpoints(site_id).await
    }

    async fn save_path(&self, path: &ScoutedPath) -> ScoutResult<()> {
        self.inner.save_path(path).await
    }

    async fn touch_path(&self, id: &str, at: DateTime<Utc>) -> ScoutResult<()> {
        self.inner.touch_path(id, at).await
    }

    async fn get_path(&self, id: &str) -> ScoutResult<ScoutedPath> {
        self.inner.get_path(id).await
    }

    async fn list_paths(&self) -> ScoutResult<Vec<ScoutedPath>> {
        self.inner.list_paths().await
    }

    async fn save_run(&self, run: &RunRecord) -> ScoutResult<()> {
        self.inner.save_run(run).await
    }

    async fn save_blob(&self, key: &str, bytes: &[u8]) -> ScoutResult<()> {
        self.inner.save_blob(key, bytes).await
    }
}

fn users_capture() -> Arc<RecordedBrowser> {
    Arc::new(RecordedBrowser::new(vec![fetch(
        "GET",
        "https://api.example.com/users",
        200,
        json!([{"id": 1}]),
    )]))
}

#[tokio::test]
async fn live_scout_survives_failing_gallery_and_directory() {
    let browser = users_capture();
    let store = Arc::new(MemoryStore::new());
    let gallery = Arc::new(UnreliableGallery {
        inner: Arc::new(MemoryGallery::new()),
        fail_lookups: true,
    });
    let scout = scout_with(&browser, &store)
        .with_gallery(gallery.clone())
        .with_directory(Arc::new(FailingDirectory));

    let outcome = scout
        .scout(&ScoutRequest::new("https://api.example.com", "users").with_publish(Some(true)))
        .await
        .unwrap();

    assert_eq!(outcome.from_gallery, None);
    assert_eq!(outcome.endpoint_count, 1);
    assert_eq!(browser.visited().await.len(), 1);
    assert!(store.get_path(&outcome.path_id).await.is_ok());
    assert!(gallery.inner.get_by_domain("api.example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn cached_scout_survives_failing_publishes() {
    let browser = users_capture();
    let store = Arc::new(MemoryStore::new());
    let seeded = Arc::new(MemoryGallery::new());
    scout_with(&browser, &store)
        .with_gallery(seeded.clone())
        .scout(&ScoutRequest::new("https://api.example.com", "users"))
        .await
        .unwrap();

    let scout = scout_with(&browser, &store)
        .with_gallery(Arc::new(UnreliableGallery {
            inner: seeded.clone(),
            fail_lookups: false,
        }))
        .with_directory(Arc::new(FailingDirectory));
    let cached = scout
        .scout(&ScoutRequest::new("https://api.example.com", "users").with_publish(Some(true)))
        .await
        .unwrap();

    assert_eq!(cached.from_gallery, Some(true));
    assert_eq!(cached.endpoint_count, 1);
    assert_eq!(browser.visited().await.len(), 1);
    assert_eq!(seeded.get_by_domain("api.example.com").await.unwrap().unwrap().version, 1);
}

#[tokio::test]
async fn directory_rejection_does_not_fail_the_scout() {
    let browser = Arc::new(RecordedBrowser::new(vec![NetworkEvent::new(
        "GET",
        "https://example.com/",
        "document",
        200,
    )]));
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(MemoryDirectory::new());
    let scout = scout_with(&browser, &store).with_directory(directory.clone());

    let outcome = scout
        .scout(&ScoutRequest::new("https://example.com", "browse").with_publish(Some(true)))
        .await
        .unwrap();

    assert_eq!(outcome.endpoint_count, 0);
    assert!(outcome.open_api_spec.paths.is_empty());
    assert!(directory.get_by_domain("example.com").await.unwrap().is_none());
    assert_eq!(store.runs().await[0].status, RunStatus::Success);
}

#[tokio::test]
async fn persistence_failure_aborts_scout_after_closing_session() {
    let browser = users_capture();
    let store = Arc::new(FaultyStore {
        fail_endpoint_writes: true,
        ..Default::default()
    });
    let scout = Scout::new(browser.clone(), store.clone()).with_options(fast());

    let err = scout
        .scout(&ScoutRequest::new("https://api.example.com", "users"))
        .await
        .unwrap_err();

    assert!(matches!(err, ScoutError::Persistence { .. }));
    assert_eq!(err.status_class(), 500);
    assert_eq!(browser.active_sessions(), 0);
    assert!(store.inner.list_paths().await.unwrap().is_empty());
}

#[tokio::test]
async fn heal_does_not_retry_storage_failures() {
    let browser = users_capture();
    let store = Arc::new(FaultyStore {
        fail_endpoint_reads: true,
        ..Default::default()
    });
    let scout = Arc::new(Scout::new(browser, store.clone()).with_options(fast()));
    let outcome = scout
        .scout(&ScoutRequest::new("https://api.example.com", "users"))
        .await
        .unwrap();
    assert_eq!(store.endpoint_reads.load(Ordering::SeqCst), 0);

    let healer = Healer::new(scout, Arc::new(Worker::new(store.clone())))
        .with_policy(RetryPolicy::immediate(3));
    let err = healer.heal(&HealRequest::new(&outcome.path_id)).await.unwrap_err();

    assert!(matches!(err, ScoutError::Persistence { .. }));
    assert_eq!(store.endpoint_reads.load(Ordering::SeqCst), 1);
    let path = store.get_path(&outcome.path_id).await.unwrap();
    assert_eq!(path.status, PathStatus::Active);
    assert_eq!(path.fail_count, 0);
}
