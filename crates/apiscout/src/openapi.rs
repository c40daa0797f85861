//! OpenAPI 3.1 contract generation.
//!
//! Path keys are origin-relative (`/users/{id}`) with the scouted origin as the
//! document server. Endpoints on another origin get a path-level `servers`
//! override; when two origins share one relative path, the later one is keyed
//! by its full URL template instead. [`OpenApiDocument::endpoint_patterns`]
//! reverses exactly this rule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::normalize::origin_of;
use crate::schema::JsonSchema;
use crate::types::{CapturedEndpoint, HttpMethod};

pub const OPENAPI_VERSION: &str = "3.1.0";
const JSON_MEDIA_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: Info,
    #[serde(default)]
    pub servers: Vec<Server>,
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
}

/// Operations of one path, one per method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
}

impl PathItem {
    pub fn operation(&self, method: HttpMethod) -> Option<&Operation> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
            HttpMethod::Head => self.head.as_ref(),
            HttpMethod::Options => self.options.as_ref(),
        }
    }

    fn slot(&mut self, method: HttpMethod) -> &mut Option<Operation> {
        match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Delete => &mut self.delete,
            HttpMethod::Head => &mut self.head,
            HttpMethod::Options => &mut self.options,
        }
    }

    /// Methods with an operation, in declaration order.
    pub fn methods(&self) -> Vec<HttpMethod> {
        HttpMethod::ALL
            .into_iter()
            .filter(|m| self.operation(*m).is_some())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    #[serde(default)]
    pub responses: BTreeMap<String, Response>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
    pub schema: JsonSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub required: bool,
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub description: String,
    #[serde(default)]
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<JsonSchema>,
}

fn json_content(schema: JsonSchema) -> BTreeMap<String, MediaType> {
    BTreeMap::from([(
        JSON_MEDIA_TYPE.to_string(),
        MediaType {
            schema: Some(schema),
        },
    )])
}

/// Split a `scheme://host/path` pattern into origin and path.
fn split_pattern(pattern: &str) -> Option<(String, String)> {
    let url = Url::parse(pattern).ok()?;
    url.host_str()?;
    Some((url.origin().ascii_serialization(), url.path().to_string()))
}

/// Rewrite `:name` segments to `{name}`, collecting one path parameter each.
pub fn rewrite_path(path: &str) -> (String, Vec<Parameter>) {
    let mut params = Vec::new();
    let rewritten: Vec<String> = path
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => {
                params.push(Parameter {
                    name: name.to_string(),
                    location: "path".to_string(),
                    required: true,
                    schema: JsonSchema::string(),
                });
                format!("{{{name}}}")
            }
            _ => segment.to_string(),
        })
        .collect();
    (rewritten.join("/"), params)
}

/// Reverse of [`rewrite_path`]: `{name}` segments back to `:name`.
fn unrewrite_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            match segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
            {
                Some(name) if !name.is_empty() => format!(":{name}"),
                _ => segment.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn build_operation(endpoint: &CapturedEndpoint, parameters: Vec<Parameter>) -> Operation {
    let request_body = match (&endpoint.request_schema, endpoint.method.accepts_body()) {
        (Some(schema), true) => Some(RequestBody {
            required: true,
            content: json_content(schema.clone()),
        }),
        _ => None,
    };

    let response = Response {
        description: "Successful response".to_string(),
        content: json_content(endpoint.response_schema.clone().unwrap_or_default()),
    };

    Operation {
        parameters,
        request_body,
        responses: BTreeMap::from([("200".to_string(), response)]),
    }
}

/// Build the contract for a scouted site.
pub fn generate(base_url: &str, endpoints: &[CapturedEndpoint]) -> OpenApiDocument {
    let base_origin = origin_of(base_url).unwrap_or_else(|| base_url.trim_end_matches('/').to_string());

    // key -> origin that owns the key
    let mut owners: BTreeMap<String, String> = BTreeMap::new();
    let mut paths: BTreeMap<String, PathItem> = BTreeMap::new();

    for endpoint in endpoints {
        let Some((origin, path)) = split_pattern(&endpoint.pattern) else {
            tracing::debug!("skipping unparseable pattern {}", endpoint.pattern);
            continue;
        };
        let (relative, parameters) = rewrite_path(&path);

        let key = match owners.get(&relative) {
            Some(owner) if *owner != origin => format!("{origin}{relative}"),
            _ => relative,
        };
        owners.entry(key.clone()).or_insert_with(|| origin.clone());

        let item = paths.entry(key.clone()).or_default();
        if origin != base_origin && !key.starts_with("http") && item.servers.is_empty() {
            item.servers.push(Server { url: origin.clone() });
        }

        let slot = item.slot(endpoint.method);
        if slot.is_some() {
            tracing::debug!("duplicate operation {} {key}, keeping the first", endpoint.method);
            continue;
        }
        *slot = Some(build_operation(endpoint, parameters));
    }

    OpenApiDocument {
        openapi: OPENAPI_VERSION.to_string(),
        info: Info {
            title: format!("API for {base_url}"),
            version: "1.0.0".to_string(),
        },
        servers: vec![Server {
            url: base_url.to_string(),
        }],
        paths,
    }
}

impl OpenApiDocument {
    /// Recover `(method, pattern)` pairs from the contract, in path-key order.
    ///
    /// Relative keys are resolved against the path-level server, else the
    /// document's first server.
    pub fn endpoint_patterns(&self) -> Vec<(HttpMethod, String)> {
        let doc_base = self
            .servers
            .first()
            .map(|s| s.url.trim_end_matches('/').to_string())
            .unwrap_or_default();

        let mut out = Vec::new();
        for (key, item) in &self.paths {
            let pattern = if key.starts_with("http://") || key.starts_with("https://") {
                unrewrite_path(key)
            } else {
                let base = item
                    .servers
                    .first()
                    .map(|s| s.url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| doc_base.clone());
                format!("{base}{}", unrewrite_path(key))
            };
            for method in item.methods() {
                out.push((method, pattern.clone()));
            }
        }
        out
    }

    pub fn operation_count(&self) -> usize {
        self.paths.values().map(|item| item.methods().len()).sum()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
