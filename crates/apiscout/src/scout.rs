//! Discovery orchestrator.
//!
//! Browses a site, groups its API traffic into endpoints, infers their schemas,
//! builds the OpenAPI contract and persists everything. A gallery hit for the
//! domain short-circuits the browser entirely.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::browser::{Browser, BrowserSession};
use crate::classify::{group_events, EndpointGroup};
use crate::directory::{Directory, DirectorySubmission};
use crate::error::{IndexError, ScoutError, ScoutResult};
use crate::gallery::{Gallery, GallerySubmission};
use crate::normalize::{domain_of, origin_of};
use crate::openapi::{generate, OpenApiDocument};
use crate::schema::infer;
use crate::store::Store;
use crate::types::{
    CapturedEndpoint, NavigationStep, NetworkEvent, RunKind, RunRecord, RunStatus, ScoutedPath, Site,
};

/// Timing knobs for live discovery.
#[derive(Debug, Clone)]
pub struct ScoutOptions {
    pub navigation_timeout: Duration,
    /// Extra wait after load so late XHR/fetch calls are captured.
    pub settle_delay: Duration,
}

impl Default for ScoutOptions {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
        }
    }
}

impl ScoutOptions {
    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ScoutRequest {
    pub url: String,
    pub task: String,
    /// `None` registers with the gallery only, `Some(true)` with the gallery
    /// and the directory, `Some(false)` with neither.
    pub publish: Option<bool>,
    /// Consult the gallery before browsing.
    pub use_cache: bool,
}

impl ScoutRequest {
    pub fn new(url: &str, task: &str) -> Self {
        Self {
            url: url.to_string(),
            task: task.to_string(),
            publish: None,
            use_cache: true,
        }
    }

    pub fn with_publish(mut self, publish: Option<bool>) -> Self {
        self.publish = publish;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoutOutcome {
    pub site_id: String,
    pub endpoint_count: usize,
    pub path_id: String,
    pub open_api_spec: OpenApiDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_gallery: Option<bool>,
}

/// Discovery orchestrator. Gallery and directory are optional.
pub struct Scout {
    browser: Arc<dyn Browser>,
    store: Arc<dyn Store>,
    gallery: Option<Arc<dyn Gallery>>,
    directory: Option<Arc<dyn Directory>>,
    options: ScoutOptions,
}

impl Scout {
    pub fn new(browser: Arc<dyn Browser>, store: Arc<dyn Store>) -> Self {
        Self {
            browser,
            store,
            gallery: None,
            directory: None,
            options: ScoutOptions::default(),
        }
    }

    pub fn with_gallery(mut self, gallery: Arc<dyn Gallery>) -> Self {
        self.gallery = Some(gallery);
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_options(mut self, options: ScoutOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Discover the API behind `request.url`.
    ///
    /// Automation and persistence failures propagate; gallery and directory
    /// failures are logged and dropped.
    pub async fn scout(&self, request: &ScoutRequest) -> ScoutResult<ScoutOutcome> {
        let domain = domain_of(&request.url)
            .ok_or_else(|| ScoutError::automation(format!("invalid url: {}", request.url)))?;

        if request.use_cache {
            if let Some(outcome) = self.scout_from_gallery(request, &domain).await? {
                return Ok(outcome);
            }
        }

        self.scout_live(request, &domain).await
    }

    async fn cached_spec(&self, domain: &str) -> Option<OpenApiDocument> {
        let gallery = self.gallery.as_ref()?;
        match gallery.get_by_domain(domain).await {
            Ok(Some(_)) => {}
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("gallery lookup for {domain} failed: {e}");
                return None;
            }
        }
        match gallery.get_spec(domain).await {
            Ok(spec) => spec,
            Err(e) => {
                tracing::warn!("gallery spec for {domain} unreadable: {e}");
                None
            }
        }
    }

    async fn scout_from_gallery(
        &self,
        request: &ScoutRequest,
        domain: &str,
    ) -> ScoutResult<Option<ScoutOutcome>> {
        let Some(spec) = self.cached_spec(domain).await else {
            return Ok(None);
        };
        let started = Instant::now();
        tracing::info!("gallery hit for {domain}, skipping browser");

        let site = Site::new(&request.url, domain);
        let now = Utc::now();
        let endpoints: Vec<CapturedEndpoint> = spec
            .endpoint_patterns()
            .into_iter()
            .map(|(method, pattern)| CapturedEndpoint {
                id: uuid::Uuid::new_v4().to_string(),
                site_id: site.id.clone(),
                method,
                pattern,
                request_schema: None,
                response_schema: None,
                sample_count: 0,
                first_seen: now,
                last_seen: now,
            })
            .collect();

        self.store.save_site(&site).await?;
        let endpoints = self.store.save_endpoints(&endpoints).await?;
        let path = self.new_path(&site, request, &endpoints);
        self.store.save_path(&path).await?;
        self.store
            .save_blob(&spec_key(&site.id), spec.to_json_pretty()?.as_bytes())
            .await?;
        self.store
            .save_run(
                &RunRecord::new(RunKind::Scout, RunStatus::Success, elapsed_ms(started))
                    .for_site(&site.id)
                    .for_path(&path.id)
                    .with_detail(json!({
                        "url": request.url,
                        "endpointCount": endpoints.len(),
                        "fromGallery": true,
                    })),
            )
            .await?;

        self.register(request, domain, &site, &path, &spec).await;

        Ok(Some(ScoutOutcome {
            site_id: site.id,
            endpoint_count: endpoints.len(),
            path_id: path.id,
            open_api_spec: spec,
            from_gallery: Some(true),
        }))
    }

    async fn scout_live(&self, request: &ScoutRequest, domain: &str) -> ScoutResult<ScoutOutcome> {
        let started = Instant::now();
        tracing::info!("scouting {} for task {:?}", request.url, request.task);

        let mut session = self.browser.open().await?;
        let captured = self.capture(session.as_mut(), &request.url).await;
        if let Err(e) = session.close().await {
            tracing::warn!("failed to close browser session: {e}");
        }
        let (events, screenshot) = match captured {
            Ok(captured) => captured,
            Err(e) => {
                let run = RunRecord::new(RunKind::Scout, RunStatus::Failure, elapsed_ms(started))
                    .with_error(e.to_string())
                    .with_detail(json!({ "url": request.url }));
                if let Err(save_err) = self.store.save_run(&run).await {
                    tracing::warn!("failed to record scout failure: {save_err}");
                }
                return Err(e);
            }
        };

        let site = Site::new(&request.url, domain);
        let groups = group_events(&events);
        tracing::debug!("{} events grouped into {} endpoints", events.len(), groups.len());
        let endpoints: Vec<CapturedEndpoint> =
            groups.iter().map(|g| build_endpoint(&site.id, g)).collect();

        self.store.save_site(&site).await?;
        let endpoints = self.store.save_endpoints(&endpoints).await?;
        let path = self.new_path(&site, request, &endpoints);
        let base_url = origin_of(&request.url).unwrap_or_else(|| request.url.clone());
        let spec = generate(&base_url, &endpoints);

        self.store.save_path(&path).await?;
        self.store
            .save_blob(&format!("screenshots/{}/scout.png", site.id), &screenshot)
            .await?;
        self.store
            .save_blob(&spec_key(&site.id), spec.to_json_pretty()?.as_bytes())
            .await?;
        self.store
            .save_run(
                &RunRecord::new(RunKind::Scout, RunStatus::Success, elapsed_ms(started))
                    .for_site(&site.id)
                    .for_path(&path.id)
                    .with_detail(json!({
                        "url": request.url,
                        "eventCount": events.len(),
                        "endpointCount": endpoints.len(),
                    })),
            )
            .await?;

        tracing::info!(
            "scouted {domain}: {} endpoints, path {}",
            endpoints.len(),
            path.id
        );

        self.register(request, domain, &site, &path, &spec).await;

        Ok(ScoutOutcome {
            site_id: site.id,
            endpoint_count: endpoints.len(),
            path_id: path.id,
            open_api_spec: spec,
            from_gallery: None,
        })
    }

    /// Navigate, then collect events and a screenshot.
    async fn capture(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
    ) -> ScoutResult<(Vec<NetworkEvent>, Vec<u8>)> {
        let navigated = tokio::time::timeout(self.options.navigation_timeout, session.navigate(url)).await;
        let failure = match navigated {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(ScoutError::automation(format!(
                "navigation to {url} timed out after {}ms",
                self.options.navigation_timeout.as_millis()
            ))),
        };
        if let Some(error) = failure {
            return Err(attach_screenshot(error, session).await);
        }

        if !self.options.settle_delay.is_zero() {
            tokio::time::sleep(self.options.settle_delay).await;
        }

        let events = session.network_events().await?;
        let screenshot = session.screenshot().await?;
        Ok((events, screenshot))
    }

    fn new_path(&self, site: &Site, request: &ScoutRequest, endpoints: &[CapturedEndpoint]) -> ScoutedPath {
        ScoutedPath::new(
            &site.id,
            &request.task,
            vec![NavigationStep::Navigate {
                url: request.url.clone(),
            }],
            endpoints.iter().map(|e| e.id.clone()).collect(),
        )
    }

    /// Best-effort registration with the gallery and the directory.
    async fn register(
        &self,
        request: &ScoutRequest,
        domain: &str,
        site: &Site,
        path: &ScoutedPath,
        spec: &OpenApiDocument,
    ) {
        if request.publish == Some(false) {
            return;
        }

        if let Some(gallery) = &self.gallery {
            let submission = GallerySubmission {
                domain: domain.to_string(),
                url: request.url.clone(),
                task: request.task.clone(),
                site_id: site.id.clone(),
                path_id: path.id.clone(),
                spec: spec.clone(),
            };
            match gallery.publish(submission).await {
                Ok(entry) => tracing::debug!("gallery entry for {domain} at version {}", entry.version),
                Err(e) => tracing::warn!("gallery publish for {domain} failed: {e}"),
            }
        }

        if request.publish != Some(true) {
            return;
        }
        if let Some(directory) = &self.directory {
            let submission = DirectorySubmission {
                domain: domain.to_string(),
                url: request.url.clone(),
                spec: spec.clone(),
            };
            match directory.publish(submission).await {
                Ok(fp) => tracing::info!("published {domain} to directory at version {}", fp.version),
                Err(IndexError::Validation(reason)) => {
                    tracing::warn!("directory rejected {domain}: {reason}")
                }
                Err(e) => tracing::warn!("directory publish for {domain} failed: {e}"),
            }
        }
    }
}

fn spec_key(site_id: &str) -> String {
    format!("specs/{site_id}/openapi.json")
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Give an automation failure the page as it looked when it failed.
async fn attach_screenshot(error: ScoutError, session: &mut dyn BrowserSession) -> ScoutError {
    match error {
        ScoutError::Automation {
            message,
            screenshot: None,
        } => ScoutError::Automation {
            message,
            screenshot: session.screenshot().await.ok(),
        },
        other => other,
    }
}

fn parse_bodies<'a>(bodies: impl Iterator<Item = Option<&'a String>>) -> Vec<Value> {
    bodies
        .flatten()
        .filter_map(|body| serde_json::from_str::<Value>(body).ok())
        .collect()
}

/// Fold a group's samples into one endpoint record.
pub fn build_endpoint(site_id: &str, group: &EndpointGroup) -> CapturedEndpoint {
    let requests = parse_bodies(group.events.iter().map(|e| e.request_body.as_ref()));
    let responses = parse_bodies(group.events.iter().map(|e| e.response_body.as_ref()));

    let now = Utc::now();
    let first_seen = group.events.iter().map(|e| e.timestamp).min().unwrap_or(now);
    let last_seen = group.events.iter().map(|e| e.timestamp).max().unwrap_or(now);

    CapturedEndpoint {
        id: uuid::Uuid::new_v4().to_string(),
        site_id: site_id.to_string(),
        method: group.method,
        pattern: group.pattern.clone(),
        request_schema: (!requests.is_empty()).then(|| infer(&requests)),
        response_schema: (!responses.is_empty()).then(|| infer(&responses)),
        sample_count: u32::try_from(group.events.len()).unwrap_or(u32::MAX),
        first_seen,
        last_seen,
    }
}
