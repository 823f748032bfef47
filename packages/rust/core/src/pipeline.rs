//! End-to-end ingestion: sources + discovery + crawl → normalize → merge →
//! atomic dataset replacement.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use careerscout_crawler::CareerCrawler;
use careerscout_shared::{
    CareerScoutError, RawRecord, Result, ResumeProfile, RunId, SearchQuery, text,
};
use careerscout_sources::{CompanyDiscovery, SourceAdapter};
use careerscout_storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{info, instrument, warn};

use crate::{dedup, normalizer};

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

/// Outcome of one source (adapter, discovery, or company crawl) in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    /// `api:jsearch`, `search:discovery`, `crawl:<company>`, ...
    pub source: String,
    /// Raw records produced (companies, for discovery).
    pub records: usize,
    /// Page fetches, for crawls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_fetched: Option<usize>,
    /// Why the source produced nothing usable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Persisted record of an ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub companies_crawled: Vec<String>,
    pub raw_records: usize,
    /// Records without a resolvable title or company.
    pub dropped: usize,
    pub merged: usize,
    /// False when every source failed and the previous dataset was kept.
    pub dataset_replaced: bool,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each source finishes; `total` is the number scheduled so far.
    fn source_done(&self, report: &SourceReport, completed: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn source_done(&self, _report: &SourceReport, _completed: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The configured set of sources for an ingestion run.
pub struct Pipeline {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    discovery: Option<CompanyDiscovery>,
    crawler: Option<Arc<CareerCrawler>>,
    /// Companies crawled regardless of discovery.
    companies: Vec<String>,
    concurrency: usize,
}

struct SourceOutcome {
    report: SourceReport,
    records: Vec<RawRecord>,
}

impl Pipeline {
    pub fn new(concurrency: usize) -> Self {
        Self {
            adapters: Vec::new(),
            discovery: None,
            crawler: None,
            companies: Vec::new(),
            concurrency: concurrency.max(1),
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_discovery(mut self, discovery: CompanyDiscovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Enable career-site crawling for the given companies plus any found by
    /// discovery.
    pub fn with_crawler(mut self, crawler: Arc<CareerCrawler>, companies: Vec<String>) -> Self {
        self.crawler = Some(crawler);
        self.companies = companies;
        self
    }

    fn has_crawl_targets(&self) -> bool {
        self.crawler.is_some() && (!self.companies.is_empty() || self.discovery.is_some())
    }

    /// Run one ingestion pass and persist its result.
    ///
    /// Source failures are isolated and reported in the summary. The dataset
    /// is replaced only when at least one source succeeded.
    #[instrument(skip_all, fields(adapters = self.adapters.len(), crawl = self.crawler.is_some()))]
    pub async fn ingest(
        &self,
        profile: &ResumeProfile,
        storage: &Storage,
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        if self.adapters.is_empty() && !self.has_crawl_targets() {
            return Err(CareerScoutError::NoDataAvailable(
                "no job-search API is configured and the crawler has no targets".into(),
            ));
        }

        let start = Instant::now();
        let run_id = RunId::new();
        let started_at = Utc::now();
        storage.insert_run(&run_id, started_at).await?;

        let query = SearchQuery::from_profile(profile);
        info!(%run_id, terms = ?query.terms, "starting ingestion");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<SourceOutcome> = JoinSet::new();
        // Source name per task, so a panicked task is still reported.
        let mut task_sources: HashMap<task::Id, String> = HashMap::new();
        let mut reports = Vec::new();

        // --- Phase 1: API adapters (in the background) ---
        progress.phase("Querying job-search APIs");
        for adapter in &self.adapters {
            let adapter = adapter.clone();
            let semaphore = semaphore.clone();
            let query = query.clone();
            let source = adapter.tag().to_string();
            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                fetch_adapter(adapter.as_ref(), &query).await
            });
            task_sources.insert(handle.id(), source);
        }
        let mut scheduled = self.adapters.len();

        // --- Phase 2: Company discovery ---
        let mut companies = self.companies.clone();
        if self.crawler.is_some() {
            if let Some(discovery) = &self.discovery {
                progress.phase("Discovering companies");
                let report = match discovery.discover(&query).await {
                    Ok(candidates) => {
                        let count = candidates.len();
                        companies.extend(candidates.into_iter().map(|c| c.name));
                        SourceReport {
                            source: careerscout_sources::companies::TAG.into(),
                            records: count,
                            pages_fetched: None,
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "company discovery failed");
                        SourceReport {
                            source: careerscout_sources::companies::TAG.into(),
                            records: 0,
                            pages_fetched: None,
                            error: Some(e.to_string()),
                        }
                    }
                };
                reports.push(report);
            }
        }
        let companies = unique_companies(companies);

        // --- Phase 3: Career-site crawls ---
        if let Some(crawler) = &self.crawler {
            if !companies.is_empty() {
                progress.phase("Crawling career sites");
            }
            for company in &companies {
                let crawler = crawler.clone();
                let semaphore = semaphore.clone();
                let company = company.clone();
                let keywords = query.keywords.clone();
                let source = format!("crawl:{company}");
                let handle = tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    crawl_one(&crawler, &company, &keywords).await
                });
                task_sources.insert(handle.id(), source);
            }
            scheduled += companies.len();
        }

        let mut records = Vec::new();
        let mut completed = 0;
        let mut any_success = false;
        while let Some(joined) = tasks.join_next_with_id().await {
            completed += 1;
            let outcome = match joined {
                Ok((_, outcome)) => outcome,
                Err(e) => {
                    let source = task_sources
                        .remove(&e.id())
                        .unwrap_or_else(|| "unknown".to_string());
                    warn!(source = %source, error = %e, "source task aborted");
                    SourceOutcome {
                        report: SourceReport {
                            source,
                            records: 0,
                            pages_fetched: None,
                            error: Some(format!("task failed: {e}")),
                        },
                        records: Vec::new(),
                    }
                }
            };
            any_success |= outcome.report.succeeded();
            progress.source_done(&outcome.report, completed, scheduled);
            records.extend(outcome.records);
            reports.push(outcome.report);
        }
        reports.sort_by(|a, b| a.source.cmp(&b.source));

        // --- Phase 4: Normalize and merge ---
        progress.phase("Normalizing and merging");
        let raw_records = records.len();
        let (jobs, dropped) = normalizer::normalize_all(&records);
        let merged = dedup::merge(jobs);

        // --- Phase 5: Persist ---
        let dataset_replaced = if any_success {
            progress.phase("Saving dataset");
            storage.replace_dataset(&merged, &run_id).await?;
            true
        } else {
            warn!("every source failed, keeping the previous dataset");
            false
        };

        let summary = RunSummary {
            run_id: run_id.clone(),
            started_at,
            sources: reports,
            companies_crawled: if self.crawler.is_some() { companies } else { Vec::new() },
            raw_records,
            dropped,
            merged: merged.len(),
            dataset_replaced,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        let summary_json = serde_json::to_string(&summary)
            .map_err(|e| CareerScoutError::Storage(format!("encode run summary: {e}")))?;
        storage.finish_run(&run_id, &summary_json).await?;

        info!(
            %run_id,
            raw_records,
            dropped,
            merged = summary.merged,
            replaced = dataset_replaced,
            elapsed_ms = summary.elapsed_ms,
            "ingestion complete"
        );
        progress.done(&summary);
        Ok(summary)
    }
}

async fn fetch_adapter(adapter: &dyn SourceAdapter, query: &SearchQuery) -> SourceOutcome {
    let source = adapter.tag().to_string();
    match adapter.fetch(query).await {
        Ok(records) => SourceOutcome {
            report: SourceReport {
                source,
                records: records.len(),
                pages_fetched: None,
                error: None,
            },
            records,
        },
        Err(e) => {
            warn!(source = %source, error = %e, "source unavailable, continuing without it");
            SourceOutcome {
                report: SourceReport {
                    source,
                    records: 0,
                    pages_fetched: None,
                    error: Some(e.to_string()),
                },
                records: Vec::new(),
            }
        }
    }
}

async fn crawl_one(crawler: &CareerCrawler, company: &str, keywords: &[String]) -> SourceOutcome {
    let crawl = crawler.crawl_company(company, keywords).await;

    // A crawl that found nothing and hit errors is a failed source; one that
    // found nothing cleanly is just an empty site.
    let error = if crawl.records.is_empty() && !crawl.errors.is_empty() {
        let (url, message) = &crawl.errors[0];
        Some(format!("{} error(s), first: {url}: {message}", crawl.errors.len()))
    } else {
        None
    };

    SourceOutcome {
        report: SourceReport {
            source: format!("crawl:{company}"),
            records: crawl.records.len(),
            pages_fetched: Some(crawl.pages_fetched),
            error,
        },
        records: crawl.records,
    }
}

/// Keep the first spelling of each company, by normalized name.
fn unique_companies(companies: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    companies
        .into_iter()
        .map(|c| text::collapse_whitespace(&c))
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(text::normalize_company(c)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use careerscout_crawler::AtsEndpoints;
    use careerscout_shared::{Confidence, CrawlConfig};
    use serde_json::{Value, json};
    use std::collections::BTreeSet;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedAdapter {
        tag: &'static str,
        items: Vec<Value>,
    }

    #[async_trait]
    impl SourceAdapter for FixedAdapter {
        fn tag(&self) -> &str {
            self.tag
        }

        async fn fetch(&self, _query: &SearchQuery) -> Result<Vec<RawRecord>> {
            Ok(self
                .items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .map(|fields| RawRecord::new(self.tag, fields))
                .collect())
        }
    }

    struct DownAdapter;

    #[async_trait]
    impl SourceAdapter for DownAdapter {
        fn tag(&self) -> &str {
            "api:adzuna"
        }

        async fn fetch(&self, _query: &SearchQuery) -> Result<Vec<RawRecord>> {
            Err(CareerScoutError::source_unavailable("api:adzuna", "HTTP 503"))
        }
    }

    struct PanickingAdapter;

    #[async_trait]
    impl SourceAdapter for PanickingAdapter {
        fn tag(&self) -> &str {
            "api:adzuna"
        }

        async fn fetch(&self, _query: &SearchQuery) -> Result<Vec<RawRecord>> {
            panic!("adapter bug");
        }
    }

    async fn storage() -> Storage {
        let path = std::env::temp_dir().join(format!("cs_pipeline_{}.db", Uuid::now_v7()));
        Storage::open(&path).await.unwrap()
    }

    fn profile() -> ResumeProfile {
        ResumeProfile {
            skills: BTreeSet::from(["Rust".to_string()]),
            job_search_queries: vec!["backend engineer".into()],
            ..ResumeProfile::default()
        }
    }

    fn jsearch() -> Arc<FixedAdapter> {
        Arc::new(FixedAdapter {
            tag: "api:jsearch",
            items: vec![
                json!({"job_id": "j1", "job_title": "Backend Engineer", "employer_name": "Acme",
                       "job_city": "NYC", "job_description": "Build APIs in Rust"}),
                json!({"job_id": "j2", "job_title": "Data Engineer", "employer_name": "Globex",
                       "job_city": "Austin", "job_description": "Pipelines"}),
                json!({"job_id": "j3", "job_title": "No Company"}),
            ],
        })
    }

    #[tokio::test]
    async fn no_sources_is_fatal() {
        let storage = storage().await;
        let err = Pipeline::new(2)
            .ingest(&profile(), &storage, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CareerScoutError::NoDataAvailable(_)));
    }

    #[tokio::test]
    async fn panicked_source_is_reported_as_failed() {
        let storage = storage().await;
        let pipeline = Pipeline::new(2)
            .with_adapter(jsearch())
            .with_adapter(Arc::new(PanickingAdapter));

        let summary = pipeline
            .ingest(&profile(), &storage, &SilentProgress)
            .await
            .unwrap();

        assert!(summary.dataset_replaced);
        assert_eq!(summary.sources.len(), 2);
        let crashed = summary
            .sources
            .iter()
            .find(|r| r.source == "api:adzuna")
            .unwrap();
        assert!(!crashed.succeeded());
        assert!(crashed.error.as_deref().unwrap().contains("task failed"));
        assert_eq!(summary.merged, 2);
    }

    #[tokio::test]
    async fn failing_source_is_isolated() {
        let storage = storage().await;
        let pipeline = Pipeline::new(2)
            .with_adapter(jsearch())
            .with_adapter(Arc::new(DownAdapter));

        let summary = pipeline
            .ingest(&profile(), &storage, &SilentProgress)
            .await
            .unwrap();

        assert!(summary.dataset_replaced);
        assert_eq!(summary.raw_records, 3);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.merged, 2);
        let down = summary
            .sources
            .iter()
            .find(|r| r.source == "api:adzuna")
            .unwrap();
        assert!(down.error.as_deref().unwrap().contains("503"));

        let ids: Vec<String> = storage
            .list_jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        assert_eq!(ids, vec!["api:jsearch:j1", "api:jsearch:j2"]);

        let runs = storage.list_runs(5).await.unwrap();
        assert_eq!(runs.len(), 1);
        let stored: RunSummary =
            serde_json::from_str(runs[0].summary_json.as_deref().unwrap()).unwrap();
        assert_eq!(stored.merged, 2);
    }

    #[tokio::test]
    async fn all_sources_failing_keeps_previous_dataset() {
        let storage = storage().await;
        Pipeline::new(2)
            .with_adapter(jsearch())
            .ingest(&profile(), &storage, &SilentProgress)
            .await
            .unwrap();

        let summary = Pipeline::new(2)
            .with_adapter(Arc::new(DownAdapter))
            .ingest(&profile(), &storage, &SilentProgress)
            .await
            .unwrap();

        assert!(!summary.dataset_replaced);
        assert_eq!(summary.merged, 0);
        assert_eq!(storage.count_jobs().await.unwrap(), 2);
        assert_eq!(storage.list_runs(5).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn api_and_crawl_records_merge() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gh/v1/boards/acme/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobs": [
                    {"id": 77, "title": "backend engineer", "location": {"name": "New York, NY"},
                     "content": "", "absolute_url": "https://boards.example/acme/77"},
                    {"id": 78, "title": "Support Lead", "location": {"name": "Remote"},
                     "content": "Help customers"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/lever/v0/postings/acme"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let crawler = CareerCrawler::new(CrawlConfig {
            rate_limit_ms: 0,
            respect_robots_txt: false,
            timeout_secs: 5,
            ..CrawlConfig::default()
        })
        .unwrap()
        .with_endpoints(AtsEndpoints {
            greenhouse_api: format!("{}/gh", server.uri()),
            lever_api: format!("{}/lever", server.uri()),
            workday_page: format!("{}/workday/{{slug}}", server.uri()),
        })
        .allow_localhost();

        let storage = storage().await;
        let summary = Pipeline::new(4)
            .with_adapter(jsearch())
            .with_crawler(Arc::new(crawler), vec!["Acme".into(), "acme inc".into()])
            .ingest(&profile(), &storage, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.companies_crawled, vec!["Acme"]);
        let crawl = summary
            .sources
            .iter()
            .find(|r| r.source == "crawl:Acme")
            .unwrap();
        assert_eq!(crawl.records, 2);

        let jobs = storage.list_jobs().await.unwrap();
        // j1 absorbs the matching board posting; j2 and the support role stay.
        assert_eq!(jobs.len(), 3);
        let backend = jobs.iter().find(|j| j.job_id == "api:jsearch:j1").unwrap();
        assert_eq!(backend.description, "Build APIs in Rust");
        assert_eq!(backend.url, "https://boards.example/acme/77");
        assert!(backend.sources.contains("api:jsearch"));
        assert!(backend.sources.iter().any(|s| s.starts_with("crawl:")));

        let support = jobs.iter().find(|j| j.title == "Support Lead").unwrap();
        assert_eq!(support.confidence, Confidence::Structured);
        assert!(support.job_id.starts_with("crawl:"));
    }

    #[test]
    fn unique_companies_by_normalized_name() {
        let companies = unique_companies(vec![
            "Acme".into(),
            " acme  Inc. ".into(),
            "Globex".into(),
            "".into(),
        ]);
        assert_eq!(companies, vec!["Acme", "Globex"]);
    }
}
