//! Adzuna job-search API adapter.

use async_trait::async_trait;
use careerscout_shared::{AdzunaConfig, CareerScoutError, RawRecord, Result, SearchQuery};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use crate::{Pacer, SourceAdapter, build_client, item_objects, send_json};

/// Provenance tag for Adzuna records.
pub const TAG: &str = "api:adzuna";

/// Adapter over `GET {base}/v1/api/jobs/{country}/search/{page}`.
pub struct AdzunaAdapter {
    client: Client,
    base_url: String,
    app_id: String,
    app_key: String,
    country: String,
    results_per_page: u32,
    max_pages: u32,
    max_results: usize,
    pacer: Pacer,
}

impl AdzunaAdapter {
    pub fn new(
        config: &AdzunaConfig,
        app_id: String,
        app_key: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id,
            app_key,
            country: config.country.to_lowercase(),
            results_per_page: config.results_per_page.max(1),
            max_pages: config.max_pages.max(1),
            max_results: config.max_results,
            pacer: Pacer::from_millis(config.min_interval_ms),
        })
    }

    async fn fetch_page(&self, term: &str, page: u32) -> Result<Vec<RawRecord>> {
        self.pacer.wait().await;
        let url = format!(
            "{}/v1/api/jobs/{}/search/{page}",
            self.base_url, self.country
        );
        let per_page = self.results_per_page.to_string();
        let request = self.client.get(&url).query(&[
            ("app_id", self.app_id.as_str()),
            ("app_key", self.app_key.as_str()),
            ("what", term),
            ("results_per_page", per_page.as_str()),
            ("content-type", "application/json"),
        ]);

        let payload = send_json(TAG, request).await?;
        let items = item_objects(TAG, payload, "results")?;
        Ok(items.into_iter().map(|fields| RawRecord::new(TAG, fields)).collect())
    }
}

#[async_trait]
impl SourceAdapter for AdzunaAdapter {
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
                        debug!(%term, page, count = batch.len(), "adzuna page fetched");
                        let short_page = batch.len() < self.results_per_page as usize;
                        records.extend(batch);
                        if records.len() >= self.max_results {
                            break 'terms;
                        }
                        if short_page {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(%term, page, error = %e, "adzuna request failed");
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
        info!(count = records.len(), "adzuna fetch complete");
        Ok(records)
    }
}
