//! URL pattern normalization.
//!
//! Collapses a concrete URL into a stable endpoint pattern by masking volatile
//! path segments. The query string is dropped and the origin is kept, so
//! `https://api.example.com/users/42?page=2` becomes
//! `https://api.example.com/users/:id`.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Placeholder prefix for masked segments. Later segments get a numeric suffix.
const PLACEHOLDER: &str = ":id";

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
            .expect("uuid regex is valid")
    })
}

fn numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").expect("numeric regex is valid"))
}

fn base64_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9+_-]{16,}={0,2}$").expect("base64 regex is valid"))
}

fn hex_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{8,}$").expect("hex regex is valid"))
}

/// Why a segment was masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatileSegment {
    Uuid,
    Numeric,
    Base64,
    Hex,
}

/// Classify one path segment. Checked in order: UUID, numeric, base64, hex.
pub fn classify_segment(segment: &str) -> Option<VolatileSegment> {
    if segment.is_empty() {
        return None;
    }
    if uuid_re().is_match(segment) {
        Some(VolatileSegment::Uuid)
    } else if numeric_re().is_match(segment) {
        Some(VolatileSegment::Numeric)
    } else if base64_re().is_match(segment) {
        Some(VolatileSegment::Base64)
    } else if hex_re().is_match(segment) {
        Some(VolatileSegment::Hex)
    } else {
        None
    }
}

/// Normalize a URL into its endpoint pattern.
///
/// Returns an error for URLs that do not parse or have no host; callers skip
/// such events instead of failing.
pub fn normalize(raw: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(raw)?;
    if url.host_str().is_none() {
        return Err(url::ParseError::EmptyHost);
    }

    let origin = url.origin().ascii_serialization();
    let mut masked = 0usize;
    let segments: Vec<String> = url
        .path()
        .split('/')
        .map(|segment| {
            if classify_segment(segment).is_some() {
                masked += 1;
                placeholder(masked)
            } else {
                segment.to_string()
            }
        })
        .collect();

    Ok(format!("{origin}{}", segments.join("/")))
}

fn placeholder(n: usize) -> String {
    if n == 1 {
        PLACEHOLDER.to_string()
    } else {
        format!("{PLACEHOLDER}{n}")
    }
}

/// Extract the host of a URL, e.g. `api.example.com`.
pub fn domain_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Extract the origin (`scheme://host[:port]`) of a URL.
pub fn origin_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    url.host_str()?;
    Some(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_segment() {
        assert_eq!(
            normalize("https://api.example.com/users/42").unwrap(),
            "https://api.example.com/users/:id"
        );
    }

    #[test]
    fn test_uuid_segment() {
        assert_eq!(
            normalize("https://api.example.com/orders/3f2b8c1e-9d4a-4e6f-8b2a-1c3d5e7f9a0b").unwrap(),
            "https://api.example.com/orders/:id"
        );
    }

    #[test]
    fn test_base64_segment() {
        assert_eq!(
            normalize("https://api.example.com/sessions/dGhpc0lzQVRva2VuMTIz").unwrap(),
            "https://api.example.com/sessions/:id"
        );
    }

    #[test]
    fn test_hex_segment() {
        assert_eq!(
            normalize("https://api.example.com/commits/deadbeef").unwrap(),
            "https://api.example.com/commits/:id"
        );
    }

    #[test]
    fn test_literal_segments_kept() {
        assert_eq!(
            normalize("https://api.example.com/v2/search").unwrap(),
            "https://api.example.com/v2/search"
        );
        // short hex-looking word stays literal
        assert_eq!(
            normalize("https://api.example.com/cafe/feed").unwrap(),
            "https://api.example.com/cafe/feed"
        );
    }

    #[test]
    fn test_multiple_volatile_segments() {
        assert_eq!(
            normalize("https://api.example.com/users/42/posts/7").unwrap(),
            "https://api.example.com/users/:id/posts/:id2"
        );
    }

    #[test]
    fn test_query_string_dropped() {
        let a = normalize("https://api.example.com/search?q=rust").unwrap();
        let b = normalize("https://api.example.com/search?q=go&page=2").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "https://api.example.com/search");
    }

    #[test]
    fn test_origin_retained() {
        let a = normalize("https://a.example.com/items/1").unwrap();
        let b = normalize("https://b.example.com/items/1").unwrap();
        assert_ne!(a, b);
        assert_eq!(
            normalize("http://localhost:8080/items/1").unwrap(),
            "http://localhost:8080/items/:id"
        );
    }

    #[test]
    fn test_idempotent() {
        for url in [
            "https://api.example.com/users/42",
            "https://api.example.com/users/42/posts/7?x=1",
            "https://api.example.com/a/3f2b8c1e-9d4a-4e6f-8b2a-1c3d5e7f9a0b/b/",
            "https://api.example.com/",
        ] {
            let once = normalize(url).unwrap();
            let twice = normalize(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {url}");
        }
    }

    #[test]
    fn test_malformed_urls_rejected() {
        assert!(normalize("not a url").is_err());
        assert!(normalize("/relative/path").is_err());
        assert!(normalize("data:text/plain,hello").is_err());
    }

    #[test]
    fn test_domain_and_origin() {
        assert_eq!(domain_of("https://Shop.Example.com/a?b=c").as_deref(), Some("shop.example.com"));
        assert_eq!(origin_of("https://shop.example.com/a").as_deref(), Some("https://shop.example.com"));
        assert_eq!(domain_of("nope"), None);
    }
}
