//! Error taxonomy for discovery, replay and heal.
//!
//! Four kinds, each with its own payload: automation (the browser session could
//! not complete), network (an HTTP replay failed), persistence (storage I/O) and
//! not-found (a referenced record does not exist).

use std::fmt;

/// Kind of persisted record a lookup expected to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Site,
    Path,
    Endpoint,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Site => "site",
            ResourceKind::Path => "path",
            ResourceKind::Endpoint => "endpoint",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the discovery → replay → heal pipeline.
#[derive(thiserror::Error, Debug)]
pub enum ScoutError {
    /// The browser session could not navigate or capture.
    #[error("Automation error: {message}")]
    Automation {
        message: String,
        /// PNG captured at the moment of failure, when the page was still reachable.
        screenshot: Option<Vec<u8>>,
    },

    /// An HTTP replay could not complete, returned non-2xx, or its body did not parse.
    #[error("Network error for {url}: {message}")]
    Network {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// Storage I/O failed.
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{resource} not found: {id}")]
    NotFound { resource: ResourceKind, id: String },
}

impl ScoutError {
    pub fn automation(message: impl Into<String>) -> Self {
        ScoutError::Automation {
            message: message.into(),
            screenshot: None,
        }
    }

    pub fn network(url: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        ScoutError::Network {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        ScoutError::Persistence {
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(resource: ResourceKind, id: impl Into<String>) -> Self {
        ScoutError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ScoutError::NotFound { .. })
    }

    /// HTTP status class a front end should answer with.
    pub fn status_class(&self) -> u16 {
        match self {
            ScoutError::NotFound { .. } => 404,
            ScoutError::Automation { .. }
            | ScoutError::Network { .. }
            | ScoutError::Persistence { .. } => 500,
        }
    }
}

impl From<rusqlite::Error> for ScoutError {
    fn from(e: rusqlite::Error) -> Self {
        ScoutError::Persistence {
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<std::io::Error> for ScoutError {
    fn from(e: std::io::Error) -> Self {
        ScoutError::Persistence {
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(e: serde_json::Error) -> Self {
        ScoutError::Persistence {
            message: format!("serialization failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

/// Convenience result type.
pub type ScoutResult<T> = Result<T, ScoutError>;

/// Errors from the optional gallery and directory collaborators.
///
/// These never fail a discovery; the orchestrator logs and drops them.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;
