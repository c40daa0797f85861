//! apiscout — discover a website's API from live browser traffic.
//!
//! Discovery browses a site and turns its XHR/fetch traffic into endpoints
//! with inferred JSON schemas and an OpenAPI 3.1 contract. Replay calls a
//! discovered endpoint directly over HTTP. Heal retries a failing path, then
//! re-discovers the site and verifies the replacement.

pub mod browser;
pub mod classify;
pub mod directory;
pub mod error;
pub mod gallery;
pub mod heal;
pub mod normalize;
pub mod openapi;
pub mod replay;
pub mod retry;
pub mod schema;
pub mod scout;
pub mod search;
pub mod store;
pub mod types;
pub mod worker;

pub use browser::{
    Browser, BrowserSession, ChromiumBrowser, ChromiumConfig, LazyChromiumBrowser, RecordedBrowser,
};
pub use classify::{group_events, is_api_request, EndpointGroup};
pub use directory::{Directory, DirectorySubmission, Fingerprint, LocalDirectory, MemoryDirectory};
pub use error::{IndexError, IndexResult, ResourceKind, ScoutError, ScoutResult};
pub use gallery::{Gallery, GalleryEntry, GallerySubmission, LocalGallery, MemoryGallery};
pub use heal::{HealOutcome, HealRequest, Healer};
pub use normalize::normalize;
pub use openapi::{generate, OpenApiDocument};
pub use replay::{ReplayClient, ReplayRequest, ReplayResponse};
pub use retry::RetryPolicy;
pub use schema::{infer, merge, JsonSchema};
pub use scout::{Scout, ScoutOptions, ScoutOutcome, ScoutRequest};
pub use store::{MemoryStore, SqliteStore, Store};
pub use types::*;
pub use worker::{Worker, WorkerOutcome, WorkerRequest};
