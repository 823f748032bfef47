//! Upstream job sources for CareerScout.
//!
//! Each job-search API is wrapped in a [`SourceAdapter`] that returns raw,
//! source-shaped [`RawRecord`]s. The [`WebSearch`] capability backs company
//! discovery and careers-page lookup for the crawler.
//!
//! Adapters never retry on their own and never interpret payloads beyond
//! locating the item array: every failure is reported as
//! [`CareerScoutError::SourceUnavailable`] and the pipeline decides what to do.

pub mod adzuna;
pub mod companies;
pub mod jsearch;
pub mod pacing;
pub mod search;

use std::time::Duration;

use async_trait::async_trait;
use careerscout_shared::{CareerScoutError, RawRecord, Result, SearchQuery};
use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value};

pub use adzuna::AdzunaAdapter;
pub use companies::CompanyDiscovery;
pub use jsearch::JSearchAdapter;
pub use pacing::Pacer;
pub use search::{SearchHit, SerperSearch, WebSearch, discover_careers_urls};

/// Maximum number of redirects followed by API clients.
const MAX_REDIRECTS: usize = 3;

/// User-Agent string for API requests.
pub const USER_AGENT: &str = concat!("CareerScout/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// SourceAdapter
// ---------------------------------------------------------------------------

/// A job-search upstream producing raw records for a query.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Provenance tag stamped on every record (`api:jsearch`, ...).
    fn tag(&self) -> &str;

    /// Fetch raw records for the query, bounded by the adapter's own
    /// page and result limits.
    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<RawRecord>>;
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with the shared user agent and a request timeout.
pub fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CareerScoutError::Network(format!("failed to build HTTP client: {e}")))
}

/// Send a request and decode the JSON body, mapping every failure to
/// `SourceUnavailable` for `tag`.
pub(crate) async fn send_json(tag: &str, request: RequestBuilder) -> Result<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| CareerScoutError::source_unavailable(tag, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(CareerScoutError::source_unavailable(tag, format!("HTTP {status}")));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| CareerScoutError::source_unavailable(tag, format!("malformed payload: {e}")))
}

/// Pull the array under `key` out of a payload, keeping object items only.
///
/// A missing or non-array `key` is a malformed payload.
pub(crate) fn item_objects(tag: &str, payload: Value, key: &str) -> Result<Vec<Map<String, Value>>> {
    let items = match payload {
        Value::Object(mut obj) => obj.remove(key),
        _ => None,
    };
    match items {
        Some(Value::Array(items)) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()),
        Some(Value::Null) => Ok(Vec::new()),
        _ => Err(CareerScoutError::source_unavailable(
            tag,
            format!("malformed payload: missing `{key}` array"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_objects_skips_non_objects() {
        let payload = json!({"data": [{"job_id": "a"}, 7, "x", {"job_id": "b"}]});
        let items = item_objects("api:test", payload, "data").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["job_id"], "b");
    }

    #[test]
    fn item_objects_rejects_missing_key() {
        let err = item_objects("api:test", json!({"status": "OK"}), "data").unwrap_err();
        assert!(matches!(err, CareerScoutError::SourceUnavailable { .. }));
        assert!(err.to_string().contains("api:test"));
    }

    #[test]
    fn item_objects_null_is_empty() {
        let items = item_objects("api:test", json!({"data": null}), "data").unwrap();
        assert!(items.is_empty());
    }
}
