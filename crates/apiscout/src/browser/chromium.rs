//! Chromium-based browser using chromiumoxide.
//!
//! Each session is one tab with CDP network listeners attached before the
//! first navigation. Bodies are fetched per request when events are read.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, EventResponseReceived, GetRequestPostDataParams,
    GetResponseBodyParams, Headers, RequestId,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;

use super::{Browser, BrowserSession};
use crate::classify::is_api_request;
use crate::error::{ScoutError, ScoutResult};
use crate::types::NetworkEvent;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. APISCOUT_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("APISCOUT_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser", "chrome"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 3. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launch settings for [`ChromiumBrowser`].
#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    pub executable: Option<PathBuf>,
    /// Upper bound for one `page.goto` plus the load wait that follows it.
    pub navigation_timeout: Duration,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            executable: None,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// Headless Chromium browser.
pub struct ChromiumBrowser {
    browser: CdpBrowser,
    config: ChromiumConfig,
    active_count: Arc<AtomicUsize>,
    handler_task: JoinHandle<()>,
}

impl ChromiumBrowser {
    /// Launch a headless Chromium instance.
    pub async fn launch(config: ChromiumConfig) -> ScoutResult<Self> {
        let chrome_path = config
            .executable
            .clone()
            .or_else(find_chromium)
            .ok_or_else(|| {
                ScoutError::automation("Chromium not found; set APISCOUT_CHROMIUM_PATH")
            })?;

        let browser_config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .build()
            .map_err(|e| ScoutError::automation(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = CdpBrowser::launch(browser_config)
            .await
            .map_err(|e| ScoutError::automation(format!("failed to launch Chromium: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("chromium handler: {e}");
                }
            }
        });

        Ok(Self {
            browser,
            config,
            active_count: Arc::new(AtomicUsize::new(0)),
            handler_task,
        })
    }
}

impl Drop for ChromiumBrowser {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn open(&self) -> ScoutResult<Box<dyn BrowserSession>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScoutError::automation(format!("failed to create page: {e}")))?;

        let log = Arc::new(Mutex::new(CaptureLog::default()));
        let listeners = match attach_listeners(&page, &log).await {
            Ok(listeners) => listeners,
            Err(e) => {
                let _ = page.close().await;
                return Err(e);
            }
        };

        self.active_count.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ChromiumSession {
            page: Some(page),
            log,
            listeners,
            config: self.config.clone(),
            active_count: Arc::clone(&self.active_count),
        }))
    }

    fn active_sessions(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Chromium launched on the first `open`, so callers that never browse (a
/// gallery hit, a replay) do not pay for a browser process.
pub struct LazyChromiumBrowser {
    config: ChromiumConfig,
    browser: OnceCell<ChromiumBrowser>,
}

impl LazyChromiumBrowser {
    pub fn new(config: ChromiumConfig) -> Self {
        Self {
            config,
            browser: OnceCell::new(),
        }
    }

    pub fn is_launched(&self) -> bool {
        self.browser.initialized()
    }
}

#[async_trait]
impl Browser for LazyChromiumBrowser {
    async fn open(&self) -> ScoutResult<Box<dyn BrowserSession>> {
        let browser = self
            .browser
            .get_or_try_init(|| ChromiumBrowser::launch(self.config.clone()))
            .await?;
        browser.open().await
    }

    fn active_sessions(&self) -> usize {
        self.browser.get().map_or(0, |b| b.active_sessions())
    }
}

/// One exchange as seen through CDP events, before bodies are fetched.
#[derive(Debug, Clone)]
struct PendingExchange {
    url: String,
    method: String,
    resource_type: String,
    request_headers: BTreeMap<String, String>,
    has_post_data: bool,
    status: Option<u16>,
    response_headers: BTreeMap<String, String>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CaptureLog {
    order: Vec<String>,
    exchanges: HashMap<String, PendingExchange>,
}

fn headers_to_map(headers: &Headers) -> BTreeMap<String, String> {
    headers
        .inner()
        .as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let value = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                    (k.to_ascii_lowercase(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn resource_type_name<T: std::fmt::Debug>(kind: &T) -> String {
    format!("{kind:?}").to_ascii_lowercase()
}

async fn attach_listeners(
    page: &Page,
    log: &Arc<Mutex<CaptureLog>>,
) -> ScoutResult<Vec<JoinHandle<()>>> {
    let mut requests = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| ScoutError::automation(format!("failed to attach request listener: {e}")))?;
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| ScoutError::automation(format!("failed to attach response listener: {e}")))?;

    let request_log = Arc::clone(log);
    let request_task = tokio::spawn(async move {
        while let Some(event) = requests.next().await {
            let id = event.request_id.inner().clone();
            let mut log = request_log.lock().await;
            if !log.exchanges.contains_key(&id) {
                log.order.push(id.clone());
            }
            log.exchanges.insert(
                id,
                PendingExchange {
                    url: event.request.url.clone(),
                    method: event.request.method.clone(),
                    resource_type: event
                        .r#type
                        .as_ref()
                        .map(resource_type_name)
                        .unwrap_or_else(|| "other".to_string()),
                    request_headers: headers_to_map(&event.request.headers),
                    has_post_data: event.request.has_post_data.unwrap_or(false),
                    status: None,
                    response_headers: BTreeMap::new(),
                    timestamp: Utc::now(),
                },
            );
        }
    });

    let response_log = Arc::clone(log);
    let response_task = tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            let id = event.request_id.inner().clone();
            let mut log = response_log.lock().await;
            if let Some(exchange) = log.exchanges.get_mut(&id) {
                exchange.status = u16::try_from(event.response.status).ok();
                exchange.response_headers = headers_to_map(&event.response.headers);
                exchange.resource_type = resource_type_name(&event.r#type);
            }
        }
    });

    Ok(vec![request_task, response_task])
}

/// A Chromium tab with network capture.
pub struct ChromiumSession {
    page: Option<Page>,
    log: Arc<Mutex<CaptureLog>>,
    listeners: Vec<JoinHandle<()>>,
    config: ChromiumConfig,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumSession {
    fn page(&self) -> ScoutResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| ScoutError::automation("browser session already closed"))
    }

    async fn response_body(&self, id: &str) -> Option<String> {
        let page = self.page.as_ref()?;
        let resp = page
            .execute(GetResponseBodyParams::new(RequestId::new(id.to_string())))
            .await
            .ok()?;
        if resp.result.base64_encoded {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&resp.result.body)
                .ok()?;
            Some(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Some(resp.result.body.clone())
        }
    }

    async fn request_body(&self, id: &str) -> Option<String> {
        let page = self.page.as_ref()?;
        page.execute(GetRequestPostDataParams::new(RequestId::new(id.to_string())))
            .await
            .ok()
            .map(|resp| resp.result.post_data.clone())
    }

    fn release(&mut self) -> Option<Page> {
        for task in self.listeners.drain(..) {
            task.abort();
        }
        let page = self.page.take();
        if page.is_some() {
            self.active_count.fetch_sub(1, Ordering::SeqCst);
        }
        page
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> ScoutResult<()> {
        let timeout = self.config.navigation_timeout;
        let page = self.page()?;

        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(ScoutError::automation(format!("navigation to {url} failed: {e}"))),
            Err(_) => {
                return Err(ScoutError::automation(format!(
                    "navigation to {url} timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        }

        let _ = tokio::time::timeout(timeout, page.wait_for_navigation()).await;
        Ok(())
    }

    async fn network_events(&mut self) -> ScoutResult<Vec<NetworkEvent>> {
        let snapshot: Vec<(String, PendingExchange)> = {
            let log = self.log.lock().await;
            log.order
                .iter()
                .filter_map(|id| log.exchanges.get(id).map(|e| (id.clone(), e.clone())))
                .collect()
        };

        let mut events = Vec::with_capacity(snapshot.len());
        for (id, exchange) in snapshot {
            let Some(status) = exchange.status else {
                continue;
            };
            // Bodies are only worth a CDP round-trip for API traffic.
            let wanted = is_api_request(&exchange.resource_type, &exchange.url);
            let response_body = if wanted { self.response_body(&id).await } else { None };
            let request_body = if wanted && exchange.has_post_data {
                self.request_body(&id).await
            } else {
                None
            };

            events.push(NetworkEvent {
                request_id: id,
                url: exchange.url,
                method: exchange.method,
                resource_type: exchange.resource_type,
                request_headers: exchange.request_headers,
                response_headers: exchange.response_headers,
                request_body,
                response_body,
                status,
                timestamp: exchange.timestamp,
            });
        }

        Ok(events)
    }

    async fn screenshot(&mut self) -> ScoutResult<Vec<u8>> {
        self.page()?
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| ScoutError::automation(format!("screenshot failed: {e}")))
    }

    async fn close(mut self: Box<Self>) -> ScoutResult<()> {
        if let Some(page) = self.release() {
            page.close()
                .await
                .map_err(|e| ScoutError::automation(format!("failed to close page: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for ChromiumSession {
    /// A session dropped without `close()` (e.g. its future was cancelled by a
    /// deadline) still gives its tab back.
    fn drop(&mut self) {
        if let Some(page) = self.release() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = page.close().await;
                });
            }
        }
    }
}
