//! JSearch job-search API adapter.

use async_trait::async_trait;
use careerscout_shared::{CareerScoutError, JSearchConfig, RawRecord, Result, SearchQuery};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use crate::{Pacer, SourceAdapter, build_client, item_objects, send_json};

/// Provenance tag for JSearch records.
pub const TAG: &str = "api:jsearch";

/// Adapter over `GET {base}/search`.
pub struct JSearchAdapter {
    client: Client,
    base_url: String,
    api_key: String,
    country: String,
    date_posted: String,
    max_pages: u32,
    max_results: usize,
    pacer: Pacer,
}

impl JSearchAdapter {
    pub fn new(config: &JSearchConfig, api_key: String, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            country: config.country.clone(),
            date_posted: config.date_posted.clone(),
            max_pages: config.max_pages.max(1),
            max_results: config.max_results,
            pacer: Pacer::from_millis(config.min_interval_ms),
        })
    }

    async fn fetch_page(&self, term: &str, page: u32) -> Result<Vec<RawRecord>> {
        self.pacer.wait().await;
        let url = format!("{}/search", self.base_url);
        let page = page.to_string();
        let request = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .query(&[
                ("query", term),
                ("page", page.as_str()),
                ("num_pages", "1"),
                ("country", self.country.as_str()),
                ("date_posted", self.date_posted.as_str()),
            ]);

        let payload = send_json(TAG, request).await?;
        let items = item_objects(TAG, payload, "data")?;
        Ok(items.into_iter().map(|fields| RawRecord::new(TAG, fields)).collect())
    }
}

#[async_trait]
impl SourceAdapter for JSearchAdapter {
    fn tag(&self) -> &str {
        TAG
    }

    #[instrument(skip_all, fields(source = TAG, terms = query.terms.len()))]
    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        let mut last_error = None;
        let mut any_ok = false;

        'terms: for term in &query.terms {
            for page in 1..=self.max_pages {
                match self.fetch_page(term, page).await {
                    Ok(batch) => {
                        any_ok = true;
                        debug!(%term, page, count = batch.len(), "jsearch page fetched");
                        if batch.is_empty() {
                            break;
                        }
                        records.extend(batch);
                        if records.len() >= self.max_results {
                            break 'terms;
                        }
                    }
                    Err(e) => {
                        warn!(%term, page, error = %e, "jsearch request failed");
                        last_error = Some(e);
                        break;
                    }
                }
            }
        }

        if !any_ok {
            return Err(last_error.unwrap_or_else(|| {
                CareerScoutError::source_unavailable(TAG, "no search terms")
            }));
        }

        records.truncate(self.max_results);
        info!(count = records.len(), "jsearch fetch complete");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer, max_pages: u32, max_results: usize) -> JSearchAdapter {
        let config = JSearchConfig {
            base_url: server.uri(),
            max_pages,
            max_results,
            min_interval_ms: 0,
            ..JSearchConfig::default()
        };
        JSearchAdapter::new(&config, "test-key".into(), 5).unwrap()
    }

    fn query(terms: &[&str]) -> SearchQuery {
        SearchQuery {
            terms: terms.iter().map(|t| t.to_string()).collect(),
            keywords: vec![],
        }
    }

    #[tokio::test]
    async fn fetches_data_items_with_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(header("x-api-key", "test-key"))
            .and(query_param("query", "rust developer"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "data": [
                    {"job_id": "j1", "job_title": "Rust Engineer", "employer_name": "Acme"},
                    {"job_id": "j2", "job_title": "Backend Engineer", "employer_name": "Globex"}
                ]
            })))
            .mount(&server)
            .await;

        let records = adapter(&server, 1, 100)
            .fetch(&query(&["rust developer"]))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.source == TAG));
        assert!(records.iter().all(|r| r.confidence.is_none()));
        assert_eq!(records[0].fields["job_id"], "j1");
    }

    #[tokio::test]
    async fn respects_max_results() {
        let server = MockServer::start().await;
        let items: Vec<_> = (0..10)
            .map(|i| json!({"job_id": format!("j{i}"), "job_title": "T", "employer_name": "E"}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": items})))
            .mount(&server)
            .await;

        let records = adapter(&server, 3, 4)
            .fetch(&query(&["a", "b"]))
            .await
            .unwrap();
        assert_eq!(records.len(), 4);
    }

    #[tokio::test]
    async fn quota_exhaustion_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = adapter(&server, 1, 100)
            .fetch(&query(&["rust"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CareerScoutError::SourceUnavailable { .. }));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn partial_failure_keeps_successful_terms() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("query", "good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"job_id": "ok", "job_title": "T", "employer_name": "E"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("query", "bad"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let records = adapter(&server, 1, 100)
            .fetch(&query(&["bad", "good"]))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = adapter(&server, 1, 100)
            .fetch(&query(&["rust"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("malformed payload"));
    }
}
