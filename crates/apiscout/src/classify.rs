//! Network event classification.
//!
//! Filters captured traffic down to genuine API calls and groups the survivors
//! by `(method, pattern)`, preserving first-seen order of groups and encounter
//! order of events inside each group.

use std::collections::HashMap;

use crate::normalize::normalize;
use crate::types::{HttpMethod, NetworkEvent};

/// Resource kinds that carry API traffic.
const API_RESOURCE_TYPES: &[&str] = &["xhr", "fetch"];

/// Static-asset suffixes: images, fonts, styles and scripts.
const STATIC_SUFFIXES: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".avif", ".ico", ".bmp", ".woff",
    ".woff2", ".ttf", ".otf", ".eot", ".css", ".js", ".mjs", ".map",
];

/// Whether a captured request looks like an API call.
pub fn is_api_request(resource_type: &str, url: &str) -> bool {
    let kind = resource_type.to_ascii_lowercase();
    if !API_RESOURCE_TYPES.contains(&kind.as_str()) {
        return false;
    }

    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_ascii_lowercase();
    !STATIC_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

/// Events sharing one `(method, pattern)` key.
#[derive(Debug, Clone)]
pub struct EndpointGroup {
    pub method: HttpMethod,
    pub pattern: String,
    pub events: Vec<NetworkEvent>,
}

impl EndpointGroup {
    /// Grouping key, `"METHOD pattern"`.
    pub fn key(&self) -> String {
        group_key(self.method, &self.pattern)
    }
}

fn group_key(method: HttpMethod, pattern: &str) -> String {
    format!("{method} {pattern}")
}

/// Group API events by method and normalized pattern.
///
/// Never fails: non-API, unknown-verb and malformed-URL events are skipped.
pub fn group_events(events: &[NetworkEvent]) -> Vec<EndpointGroup> {
    let mut groups: Vec<EndpointGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in events {
        if !is_api_request(&event.resource_type, &event.url) {
            continue;
        }
        let Ok(method) = event.method.parse::<HttpMethod>() else {
            tracing::debug!("skipping {} {}: unsupported method", event.method, event.url);
            continue;
        };
        let pattern = match normalize(&event.url) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("skipping malformed url {}: {e}", event.url);
                continue;
            }
        };

        let key = group_key(method, &pattern);
        match index.get(&key) {
            Some(&i) => groups[i].events.push(event.clone()),
            None => {
                index.insert(key, groups.len());
                groups.push(EndpointGroup {
                    method,
                    pattern,
                    events: vec![event.clone()],
                });
            }
        }
    }

    groups
}
