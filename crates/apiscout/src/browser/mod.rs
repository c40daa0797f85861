//! Browser automation abstraction.
//!
//! Defines the `Browser` and `BrowserSession` traits that abstract over the
//! browser engine (Chromium via chromiumoxide in production, a recorded
//! session in tests). A session is scoped to one discovery call and must be
//! closed on every exit path.

pub mod chromium;
pub mod recorded;

use async_trait::async_trait;

use crate::error::ScoutResult;
use crate::types::NetworkEvent;

pub use chromium::{ChromiumBrowser, ChromiumConfig, LazyChromiumBrowser};
pub use recorded::RecordedBrowser;

/// A browser engine that can open capture sessions.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a new session (one tab with network capture attached).
    async fn open(&self) -> ScoutResult<Box<dyn BrowserSession>>;
    /// Number of sessions currently open.
    fn active_sessions(&self) -> usize;
}

/// One browsing session.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and wait for the page (and its API traffic) to settle.
    async fn navigate(&mut self, url: &str) -> ScoutResult<()>;
    /// Every exchange captured since the session opened, in encounter order.
    async fn network_events(&mut self) -> ScoutResult<Vec<NetworkEvent>>;
    /// PNG of the current page.
    async fn screenshot(&mut self) -> ScoutResult<Vec<u8>>;
    /// Release the session.
    async fn close(self: Box<Self>) -> ScoutResult<()>;
}
