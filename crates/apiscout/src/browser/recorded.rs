//! In-memory browser that replays a fixed capture.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Browser, BrowserSession};
use crate::error::{ScoutError, ScoutResult};
use crate::types::NetworkEvent;

/// 1x1 transparent PNG.
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Browser that "captures" a pre-recorded list of events on every navigation.
///
/// Tracks open sessions and visited URLs so tests can assert that sessions are
/// released and which pages were browsed.
#[derive(Clone)]
pub struct RecordedBrowser {
    events: Arc<Mutex<Vec<NetworkEvent>>>,
    screenshot: Vec<u8>,
    fail_navigation: Option<String>,
    active: Arc<AtomicUsize>,
    visited: Arc<Mutex<Vec<String>>>,
}

impl RecordedBrowser {
    pub fn new(events: Vec<NetworkEvent>) -> Self {
        Self {
            events: Arc::new(Mutex::new(events)),
            screenshot: PLACEHOLDER_PNG.to_vec(),
            fail_navigation: None,
            active: Arc::new(AtomicUsize::new(0)),
            visited: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every navigation fails with an automation error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_navigation: Some(message.to_string()),
            ..Self::new(Vec::new())
        }
    }

    /// Replace the capture served to sessions opened from now on.
    pub async fn set_events(&self, events: Vec<NetworkEvent>) {
        *self.events.lock().await = events;
    }

    pub async fn visited(&self) -> Vec<String> {
        self.visited.lock().await.clone()
    }
}

#[async_trait]
impl Browser for RecordedBrowser {
    async fn open(&self) -> ScoutResult<Box<dyn BrowserSession>> {
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordedSession {
            events: self.events.lock().await.clone(),
            navigated: false,
            screenshot: self.screenshot.clone(),
            fail_navigation: self.fail_navigation.clone(),
            active: Arc::clone(&self.active),
            visited: Arc::clone(&self.visited),
        }))
    }

    fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct RecordedSession {
    events: Vec<NetworkEvent>,
    navigated: bool,
    screenshot: Vec<u8>,
    fail_navigation: Option<String>,
    active: Arc<AtomicUsize>,
    visited: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl BrowserSession for RecordedSession {
    async fn navigate(&mut self, url: &str) -> ScoutResult<()> {
        self.visited.lock().await.push(url.to_string());
        if let Some(message) = &self.fail_navigation {
            return Err(ScoutError::automation(format!("navigation to {url} failed: {message}")));
        }
        self.navigated = true;
        Ok(())
    }

    async fn network_events(&mut self) -> ScoutResult<Vec<NetworkEvent>> {
        if !self.navigated {
            return Ok(Vec::new());
        }
        Ok(self.events.clone())
    }

    async fn screenshot(&mut self) -> ScoutResult<Vec<u8>> {
        Ok(self.screenshot.clone())
    }

    async fn close(self: Box<Self>) -> ScoutResult<()> {
        Ok(())
    }
}

impl Drop for RecordedSession {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
