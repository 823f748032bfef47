//! Career-site crawl engine.
//!
//! For one company: resolve an entry point (ATS boards first, then a
//! Workday page, then web search), read ATS JSON directly, and otherwise run
//! a bounded BFS over job-listing links, extracting JSON-LD postings and
//! falling back to heuristic detail-page classification.

use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use careerscout_shared::{CareerScoutError, Confidence, CrawlConfig, RawRecord, Result};
use careerscout_sources::WebSearch;
use reqwest::Client;
use scraper::Html;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::ats::{self, AtsBoard, AtsEndpoints};
use crate::heuristic::{self, PageLink, StructuredExtractor};
use crate::politeness::{Admission, DomainGate};
use crate::structured;

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("CareerScout/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects followed per page.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// CompanyCrawl
// ---------------------------------------------------------------------------

/// Outcome of crawling one company.
#[derive(Debug, Clone, Default)]
pub struct CompanyCrawl {
    pub company: String,
    /// Raw postings, each tagged with its confidence tier.
    pub records: Vec<RawRecord>,
    /// Fetch attempts charged to the company's page budget.
    pub pages_fetched: usize,
    /// Skipped pages (URL, error message).
    pub errors: Vec<(String, String)>,
}

/// Mutable state of one company crawl.
pub(crate) struct Session<'a> {
    pub(crate) company: &'a str,
    pub(crate) keywords: &'a [String],
    pub(crate) boards_seen: HashSet<AtsBoard>,
    pub(crate) result: CompanyCrawl,
}

/// A BFS seed page, possibly already fetched during entry resolution.
pub(crate) struct EntryPage {
    pub(crate) url: Url,
    pub(crate) body: Option<String>,
}

/// Everything needed from a parsed page. `Html` is not `Send`, so pages are
/// analyzed synchronously and only this summary crosses await points.
struct PageAnalysis {
    postings: Vec<Map<String, Value>>,
    detail: Option<Map<String, Value>>,
    links: Vec<PageLink>,
}

// ---------------------------------------------------------------------------
// CareerCrawler
// ---------------------------------------------------------------------------

/// Polite, bounded crawler for company career sites.
pub struct CareerCrawler {
    pub(crate) config: CrawlConfig,
    gate: DomainGate,
    pub(crate) endpoints: AtsEndpoints,
    pub(crate) search: Option<Arc<dyn WebSearch>>,
    extractor: Option<Arc<dyn StructuredExtractor>>,
    /// Allow localhost/private IPs (for tests against local mock servers).
    allow_localhost: bool,
}

impl CareerCrawler {
    /// Create a new crawler with the given configuration.
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CareerScoutError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            gate: DomainGate::new(client, &config),
            config,
            endpoints: AtsEndpoints::default(),
            search: None,
            extractor: None,
            allow_localhost: false,
        })
    }

    /// Enable careers-page lookup via web search.
    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Refine heuristic pages with a structured-extraction backend.
    pub fn with_extractor(mut self, extractor: Arc<dyn StructuredExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_endpoints(mut self, endpoints: AtsEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Allow crawling localhost/private IPs (for integration tests).
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Crawl one company's career site. Never fails: unreachable sites and
    /// skipped pages end up in `errors` and an empty `records`.
    #[instrument(skip_all, fields(company = %company))]
    pub async fn crawl_company(&self, company: &str, keywords: &[String]) -> CompanyCrawl {
        let mut session = Session {
            company,
            keywords,
            boards_seen: HashSet::new(),
            result: CompanyCrawl {
                company: company.to_string(),
                ..CompanyCrawl::default()
            },
        };

        let entry_pages = self.resolve_entry(&mut session).await;
        if !entry_pages.is_empty() {
            self.traverse(&mut session, entry_pages).await;
        }

        let result = session.result;
        info!(
            records = result.records.len(),
            pages_fetched = result.pages_fetched,
            errors = result.errors.len(),
            "company crawl completed"
        );
        result
    }

    /// Bounded BFS from the entry pages.
    async fn traverse(&self, session: &mut Session<'_>, entry_pages: Vec<EntryPage>) {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<(Url, u32, Option<String>)> = entry_pages
            .into_iter()
            .map(|page| (page.url, 0, page.body))
            .collect();

        while let Some((url, depth, prefetched)) = queue.pop_front() {
            if !visited.insert(normalize_url(&url)) {
                continue;
            }
            let body = match prefetched {
                Some(body) => body,
                None => match self.fetch(session, &url).await {
                    Some(body) => body,
                    None => continue,
                },
            };

            let analysis = analyze_page(&body, &url, session.company, depth > 0);
            let source = source_tag(&url);

            if !analysis.postings.is_empty() {
                debug!(%url, count = analysis.postings.len(), "structured postings found");
                session.result.records.extend(analysis.postings.into_iter().map(|fields| {
                    RawRecord::new(source.clone(), fields).with_confidence(Confidence::Structured)
                }));
            } else if let Some(mut fields) = analysis.detail {
                self.refine(&mut fields).await;
                session
                    .result
                    .records
                    .push(RawRecord::new(source, fields).with_confidence(Confidence::Heuristic));
            }

            if depth >= self.config.depth {
                continue;
            }
            for link in analysis.links {
                if let Some(board) = ats::detect_board(&link.url) {
                    self.crawl_board(session, board).await;
                } else if heuristic::is_job_link(&link, &url) {
                    queue.push_back((link.url, depth + 1, None));
                }
            }
        }
    }

    async fn refine(&self, fields: &mut Map<String, Value>) {
        let Some(extractor) = &self.extractor else {
            return;
        };
        let page_text = fields
            .get(crate::fields::DESCRIPTION)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match extractor.extract(&page_text).await {
            Ok(extracted) => heuristic::apply_extracted(fields, &extracted),
            Err(e) => debug!(error = %e, "structured extraction skipped"),
        }
    }

    /// Fetch a board's JSON and emit its postings at structured confidence.
    /// Returns the number of postings found.
    pub(crate) async fn crawl_board(&self, session: &mut Session<'_>, board: AtsBoard) -> usize {
        if !session.boards_seen.insert(board.clone()) {
            return 0;
        }
        let Ok(url) = Url::parse(&self.endpoints.board_url(&board)) else {
            return 0;
        };
        let Some(body) = self.fetch(session, &url).await else {
            return 0;
        };

        let payload: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) => {
                session.result.errors.push((url.to_string(), format!("malformed board JSON: {e}")));
                return 0;
            }
        };

        let postings = ats::board_postings(board.kind, &payload, session.company);
        let count = postings.len();
        let source = source_tag(&url);
        session.result.records.extend(postings.into_iter().map(|fields| {
            RawRecord::new(source.clone(), fields).with_confidence(Confidence::Structured)
        }));
        debug!(kind = board.kind.name(), slug = %board.slug, count, "ats board read");
        count
    }

    /// Fetch a page under the company budget, SSRF guard and domain gate.
    /// Failures are recorded and yield `None`.
    pub(crate) async fn fetch(&self, session: &mut Session<'_>, url: &Url) -> Option<String> {
        if session.result.pages_fetched >= self.config.max_pages_per_company {
            debug!(%url, "page budget exhausted");
            return None;
        }
        if !self.allow_localhost && is_ssrf_target(url) {
            warn!(%url, "SSRF protection: blocked");
            session
                .result
                .errors
                .push((url.to_string(), "blocked private address".into()));
            return None;
        }

        let result = match self.gate.admit_and_fetch(url).await {
            Admission::Refused(e) => Err(e),
            Admission::Sent(result) => {
                session.result.pages_fetched += 1;
                result
            }
        };
        match result {
            Ok(body) => Some(body),
            Err(e) => {
                debug!(%url, error = %e, "page skipped");
                session.result.errors.push((url.to_string(), e.to_string()));
                None
            }
        }
    }
}

fn analyze_page(body: &str, url: &Url, company: &str, classify: bool) -> PageAnalysis {
    let doc = Html::parse_document(body);
    let postings = structured::extract_job_postings(&doc, url, company);
    let detail = if classify && postings.is_empty() {
        heuristic::classify_detail_page(&doc, url, company)
    } else {
        None
    };
    PageAnalysis {
        postings,
        detail,
        links: heuristic::extract_links(&doc, url),
    }
}

/// Provenance tag for records read from `url`.
pub fn source_tag(url: &Url) -> String {
    format!("crawl:{}", heuristic::site_domain(url))
}

/// Normalize a URL for deduplication (strip fragment and trailing slash).
fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    if s.ends_with('/') && s.matches('/').count() > 3 {
        s.pop();
    }
    s
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    if let Some(host) = url.host_str() {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost" || host.ends_with(".local") || host.ends_with(".internal") {
            return true;
        }
    }

    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
