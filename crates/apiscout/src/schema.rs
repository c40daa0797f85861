//! JSON Schema inference and merging.
//!
//! `infer` folds a set of sample values into one schema; `merge` combines two
//! schemas into one that accepts both. The same `merge` reconciles a freshly
//! observed schema with the one already stored for an endpoint.
//!
//! `required` is derived per sample (keys present and non-null) and re-derived
//! at merge time as the intersection of both sides, never accumulated.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primitive JSON Schema type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

/// String formats detected from sample values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringFormat {
    DateTime,
    Date,
    Email,
    Uri,
    Uuid,
}

/// A recursive JSON Schema value. The all-`None` value is the empty schema `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<StringFormat>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, JsonSchema>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,

    #[serde(rename = "anyOf", default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<JsonSchema>,
}

impl JsonSchema {
    /// Schema with only a `type`.
    pub fn of_type(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Default::default()
        }
    }

    pub fn string() -> Self {
        Self::of_type(SchemaType::String)
    }

    /// True for `{}`, the schema that accepts anything.
    pub fn is_empty(&self) -> bool {
        *self == JsonSchema::default()
    }

    /// Serialize to a `serde_json::Value`.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn date_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$")
            .expect("date-time regex is valid")
    })
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date regex is valid"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"))
}

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
            .expect("uuid regex is valid")
    })
}

/// Best-effort format detection. First match wins.
pub fn detect_format(s: &str) -> Option<StringFormat> {
    if date_time_re().is_match(s) {
        Some(StringFormat::DateTime)
    } else if date_re().is_match(s) {
        Some(StringFormat::Date)
    } else if email_re().is_match(s) {
        Some(StringFormat::Email)
    } else if s.starts_with("http://") || s.starts_with("https://") {
        Some(StringFormat::Uri)
    } else if uuid_re().is_match(s) {
        Some(StringFormat::Uuid)
    } else {
        None
    }
}

fn is_integral(n: &serde_json::Number) -> bool {
    if n.is_i64() || n.is_u64() {
        return true;
    }
    n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
}

/// Schema of a single value.
pub fn infer_value(value: &Value) -> JsonSchema {
    match value {
        Value::Null => JsonSchema::of_type(SchemaType::Null),
        Value::Bool(_) => JsonSchema::of_type(SchemaType::Boolean),
        Value::Number(n) if is_integral(n) => JsonSchema::of_type(SchemaType::Integer),
        Value::Number(_) => JsonSchema::of_type(SchemaType::Number),
        Value::String(s) => JsonSchema {
            format: detect_format(s),
            ..JsonSchema::string()
        },
        Value::Array(elements) => JsonSchema {
            items: Some(Box::new(infer(elements))),
            ..JsonSchema::of_type(SchemaType::Array)
        },
        Value::Object(map) => {
            let mut schema = JsonSchema::of_type(SchemaType::Object);
            for (key, v) in map {
                schema.properties.insert(key.clone(), infer_value(v));
                if !v.is_null() {
                    schema.required.push(key.clone());
                }
            }
            schema
        }
    }
}

/// Infer one schema accepting every sample. Empty input yields `{}`.
pub fn infer(samples: &[Value]) -> JsonSchema {
    samples
        .iter()
        .map(infer_value)
        .reduce(|acc, next| merge(&acc, &next))
        .unwrap_or_default()
}

/// Merge two schemas into one that accepts values of either.
pub fn merge(a: &JsonSchema, b: &JsonSchema) -> JsonSchema {
    if a.is_empty() {
        return b.clone();
    }
    if b.is_empty() {
        return a.clone();
    }

    match (a.schema_type, b.schema_type) {
        (Some(ta), Some(tb)) if ta == tb => merge_same_type(a, b, ta),
        (Some(SchemaType::Integer), Some(SchemaType::Number))
        | (Some(SchemaType::Number), Some(SchemaType::Integer)) => {
            JsonSchema::of_type(SchemaType::Number)
        }
        _ => union(a, b),
    }
}

fn merge_same_type(a: &JsonSchema, b: &JsonSchema, schema_type: SchemaType) -> JsonSchema {
    match schema_type {
        SchemaType::Object => merge_objects(a, b),
        SchemaType::Array => {
            let items = match (&a.items, &b.items) {
                (Some(ia), Some(ib)) => Some(Box::new(merge(ia, ib))),
                (ia, ib) => ia.clone().or_else(|| ib.clone()),
            };
            JsonSchema {
                items,
                ..JsonSchema::of_type(SchemaType::Array)
            }
        }
        SchemaType::String => JsonSchema {
            format: if a.format == b.format { a.format } else { None },
            ..JsonSchema::string()
        },
        other => JsonSchema::of_type(other),
    }
}

fn merge_objects(a: &JsonSchema, b: &JsonSchema) -> JsonSchema {
    let mut properties = a.properties.clone();
    for (key, b_schema) in &b.properties {
        let merged = match properties.get(key) {
            Some(a_schema) => merge(a_schema, b_schema),
            None => b_schema.clone(),
        };
        properties.insert(key.clone(), merged);
    }

    // Keys present on only one side are never in both required lists.
    let required = a
        .required
        .iter()
        .filter(|key| b.required.contains(key))
        .cloned()
        .collect();

    JsonSchema {
        properties,
        required,
        ..JsonSchema::of_type(SchemaType::Object)
    }
}

fn union(a: &JsonSchema, b: &JsonSchema) -> JsonSchema {
    let mut variants: Vec<JsonSchema> = Vec::new();
    for candidate in flatten(a).into_iter().chain(flatten(b)) {
        if !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }

    if variants.len() == 1 {
        variants.remove(0)
    } else {
        JsonSchema {
            any_of: variants,
            ..Default::default()
        }
    }
}

fn flatten(schema: &JsonSchema) -> Vec<JsonSchema> {
    if schema.any_of.is_empty() {
        vec![schema.clone()]
    } else {
        schema.any_of.clone()
    }
}
