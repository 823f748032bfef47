//! Field names of crawl records. The normalizer reads the same keys.

use serde_json::{Map, Value};

pub const TITLE: &str = "title";
pub const COMPANY: &str = "company";
pub const LOCATION: &str = "location";
pub const DESCRIPTION: &str = "description";
pub const EMPLOYMENT_TYPE: &str = "employment_type";
pub const URL: &str = "url";
pub const NATIVE_ID: &str = "native_id";
pub const PUBLISHER: &str = "publisher";

/// Insert a trimmed, non-empty string value.
pub fn put(fields: &mut Map<String, Value>, key: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        fields.insert(key.to_string(), Value::String(value.to_string()));
    }
}

pub fn put_opt(fields: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        put(fields, key, value);
    }
}
