//! Capability wiring from configuration.
//!
//! Every external capability is individually configured. One whose
//! credential is absent is skipped and reported once, never fatal here.

use std::sync::Arc;

use careerscout_crawler::{CareerCrawler, StructuredExtractor};
use careerscout_shared::{AppConfig, CareerScoutError, CrawlConfig, Result, require_secret};
use careerscout_sources::{
    AdzunaAdapter, CompanyDiscovery, JSearchAdapter, SerperSearch, SourceAdapter, WebSearch,
};
use tracing::{debug, warn};

use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::extraction::OpenAiExtractor;
use crate::pipeline::Pipeline;

/// Capabilities available for this process.
pub struct Capabilities {
    pub adapters: Vec<Arc<dyn SourceAdapter>>,
    pub search: Option<Arc<dyn WebSearch>>,
    pub extractor: Option<Arc<dyn StructuredExtractor>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    /// One [`CareerScoutError::ConfigurationMissing`] per skipped capability.
    pub missing: Vec<CareerScoutError>,
}

impl Capabilities {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let timeout = config.defaults.request_timeout_secs;
        let mut missing = Vec::new();
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();

        let jsearch = &config.sources.jsearch;
        if jsearch.enabled {
            match require_secret("jsearch", &jsearch.api_key_env) {
                Ok(key) => adapters.push(Arc::new(JSearchAdapter::new(jsearch, key, timeout)?)),
                Err(e) => missing.push(e),
            }
        } else {
            debug!("jsearch disabled in config");
        }

        let adzuna = &config.sources.adzuna;
        if adzuna.enabled {
            let credentials = require_secret("adzuna", &adzuna.app_id_env)
                .and_then(|id| Ok((id, require_secret("adzuna", &adzuna.app_key_env)?)));
            match credentials {
                Ok((app_id, app_key)) => {
                    adapters.push(Arc::new(AdzunaAdapter::new(adzuna, app_id, app_key, timeout)?))
                }
                Err(e) => missing.push(e),
            }
        } else {
            debug!("adzuna disabled in config");
        }

        let search: Option<Arc<dyn WebSearch>> =
            match require_secret("web search", &config.search.api_key_env) {
                Ok(key) => Some(Arc::new(SerperSearch::new(&config.search, key, timeout)?)),
                Err(e) => {
                    missing.push(e);
                    None
                }
            };

        let extractor: Option<Arc<dyn StructuredExtractor>> = if config.extraction.enabled {
            match require_secret("structured extraction", &config.extraction.api_key_env) {
                Ok(key) => Some(Arc::new(OpenAiExtractor::new(&config.extraction, key)?)),
                Err(e) => {
                    missing.push(e);
                    None
                }
            }
        } else {
            None
        };

        let embedder: Option<Arc<dyn Embedder>> =
            match require_secret("embedding", &config.embedding.api_key_env) {
                Ok(key) => Some(Arc::new(OpenAiEmbedder::new(&config.embedding, key)?)),
                Err(e) => {
                    missing.push(e);
                    None
                }
            };

        for skipped in &missing {
            warn!(reason = %skipped, "capability skipped");
        }

        Ok(Self {
            adapters,
            search,
            extractor,
            embedder,
            missing,
        })
    }

    /// The embedder, or the `ConfigurationMissing` error ranking reports.
    pub fn require_embedder(&self, config: &AppConfig) -> Result<Arc<dyn Embedder>> {
        self.embedder.clone().ok_or_else(|| {
            CareerScoutError::configuration_missing("embedding", &config.embedding.api_key_env)
        })
    }
}

/// Per-invocation overrides of the `[crawl]` section.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Companies crawled in addition to `crawl.companies`.
    pub extra_companies: Vec<String>,
    /// Skip the crawler for this run.
    pub no_crawl: bool,
}

/// Assemble the ingestion pipeline from config and available capabilities.
pub fn build_pipeline(
    config: &AppConfig,
    capabilities: &Capabilities,
    options: &PipelineOptions,
) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new(config.defaults.concurrency as usize);
    for adapter in &capabilities.adapters {
        pipeline = pipeline.with_adapter(adapter.clone());
    }

    if !config.crawl.enabled || options.no_crawl {
        debug!("crawler disabled for this run");
        return Ok(pipeline);
    }

    let mut crawler = CareerCrawler::new(CrawlConfig::from(config))?;
    if let Some(search) = &capabilities.search {
        crawler = crawler.with_search(search.clone());
        pipeline = pipeline.with_discovery(CompanyDiscovery::new(
            search.clone(),
            config.search.results_per_query as usize,
            config.search.max_companies,
        ));
    }
    if let Some(extractor) = &capabilities.extractor {
        crawler = crawler.with_extractor(extractor.clone());
    }

    let companies = config
        .crawl
        .companies
        .iter()
        .chain(&options.extra_companies)
        .cloned()
        .collect();
    Ok(pipeline.with_crawler(Arc::new(crawler), companies))
}
