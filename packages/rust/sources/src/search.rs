//! Web search capability (Serper) and careers-page lookup.

use std::collections::HashSet;

use async_trait::async_trait;
use careerscout_shared::{CareerScoutError, Result, SearchConfig};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{Pacer, build_client};

/// Provenance tag used in errors raised by the search capability.
pub const TAG: &str = "search:serper";

/// URL fragments that mark a plausible careers or job-board page.
const CAREERS_HINTS: &[&str] = &[
    "careers",
    "jobs",
    "join",
    "work-with-us",
    "greenhouse",
    "lever",
    "workday",
];

/// Hits requested per careers lookup.
const CAREERS_SEARCH_RESULTS: usize = 8;

/// Keyword phrase length cap for careers lookups.
const MAX_KEYWORD_CHARS: usize = 120;

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// A general web search backend.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;
}

// ---------------------------------------------------------------------------
// Serper
// ---------------------------------------------------------------------------

/// Serper.dev Google search client (`POST {base}/search`).
pub struct SerperSearch {
    client: Client,
    base_url: String,
    api_key: String,
    pacer: Pacer,
}

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: String,
}

impl SerperSearch {
    pub fn new(config: &SearchConfig, api_key: String, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            pacer: Pacer::from_millis(config.min_interval_ms),
        })
    }
}

#[async_trait]
impl WebSearch for SerperSearch {
    #[instrument(skip_all, fields(query = %query, k = k))]
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.pacer.wait().await;
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest { q: query, num: k })
            .send()
            .await
            .map_err(|e| CareerScoutError::source_unavailable(TAG, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CareerScoutError::source_unavailable(TAG, format!("HTTP {status}")));
        }

        let parsed: SerperResponse = response.json().await.map_err(|e| {
            CareerScoutError::source_unavailable(TAG, format!("malformed payload: {e}"))
        })?;

        let hits: Vec<SearchHit> = parsed
            .organic
            .into_iter()
            .filter_map(|item| {
                let link = item.link.filter(|l| !l.is_empty())?;
                Some(SearchHit {
                    title: item.title,
                    link,
                    snippet: item.snippet,
                })
            })
            .take(k)
            .collect();

        debug!(hits = hits.len(), "search complete");
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// Careers URL discovery
// ---------------------------------------------------------------------------

/// Whether a URL looks like a careers or job-board page.
pub fn is_plausible_careers_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    CAREERS_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Find up to `max` careers URLs for a company via `"<company> careers <keywords>"`,
/// at most one per domain.
#[instrument(skip_all, fields(company = %company))]
pub async fn discover_careers_urls(
    search: &dyn WebSearch,
    company: &str,
    keywords: &[String],
    max: usize,
) -> Result<Vec<Url>> {
    let company = company.trim();
    if company.is_empty() || max == 0 {
        return Ok(Vec::new());
    }

    let mut phrase = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if let Some((idx, _)) = phrase.char_indices().nth(MAX_KEYWORD_CHARS) {
        phrase.truncate(idx);
    }
    let query = format!("{company} careers {phrase}").trim().to_string();

    let hits = search.search(&query, CAREERS_SEARCH_RESULTS).await?;

    let mut seen_domains = HashSet::new();
    let mut urls = Vec::new();
    for hit in hits {
        if !is_plausible_careers_url(&hit.link) {
            continue;
        }
        let Ok(url) = Url::parse(&hit.link) else {
            warn!(link = %hit.link, "skipping unparseable search hit");
            continue;
        };
        let Some(domain) = url.host_str().map(str::to_lowercase) else {
            continue;
        };
        if !seen_domains.insert(domain) {
            continue;
        }
        urls.push(url);
        if urls.len() >= max {
            break;
        }
    }

    debug!(found = urls.len(), "careers urls discovered");
    Ok(urls)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Canned search backend keyed by exact query string.
    pub(crate) struct FakeSearch {
        pub responses: Vec<(String, Vec<SearchHit>)>,
        pub queries: Mutex<Vec<String>>,
    }

    impl FakeSearch {
        pub(crate) fn new(responses: Vec<(&str, Vec<SearchHit>)>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|(q, hits)| (q.to_string(), hits))
                    .collect(),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl WebSearch for FakeSearch {
        async fn search(&self, query: &str, _k: usize) -> Result<Vec<SearchHit>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self
                .responses
                .iter()
                .find(|(q, _)| q == query)
                .map(|(_, hits)| hits.clone())
                .unwrap_or_default())
        }
    }

    pub(crate) fn hit(title: &str, link: &str, snippet: &str) -> SearchHit {
        SearchHit {
            title: title.into(),
            link: link.into(),
            snippet: snippet.into(),
        }
    }

    #[tokio::test]
    async fn serper_posts_query_and_reads_organic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("X-API-KEY", "serper-key"))
            .and(body_json(json!({"q": "acme careers", "num": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "organic": [
                    {"title": "Acme Careers", "link": "https://acme.com/careers", "snippet": "Join us"},
                    {"title": "No link"},
                    {"title": "Jobs at Acme", "link": "https://jobs.lever.co/acme"}
                ]
            })))
            .mount(&server)
            .await;

        let config = SearchConfig {
            base_url: server.uri(),
            min_interval_ms: 0,
            ..SearchConfig::default()
        };
        let search = SerperSearch::new(&config, "serper-key".into(), 5).unwrap();
        let hits = search.search("acme careers", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].link, "https://acme.com/careers");
        assert_eq!(hits[1].snippet, "");
    }

    #[tokio::test]
    async fn serper_error_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let config = SearchConfig {
            base_url: server.uri(),
            min_interval_ms: 0,
            ..SearchConfig::default()
        };
        let search = SerperSearch::new(&config, "bad".into(), 5).unwrap();
        let err = search.search("anything", 5).await.unwrap_err();
        assert!(matches!(err, CareerScoutError::SourceUnavailable { .. }));
    }

    #[test]
    fn careers_url_hints() {
        assert!(is_plausible_careers_url("https://acme.com/careers/"));
        assert!(is_plausible_careers_url("https://boards.greenhouse.io/acme"));
        assert!(is_plausible_careers_url("https://acme.wd1.myworkdayjobs.com/ext"));
        assert!(!is_plausible_careers_url("https://acme.com/about"));
    }

    #[tokio::test]
    async fn careers_urls_one_per_domain() {
        let search = FakeSearch::new(vec![(
            "Acme careers rust backend",
            vec![
                hit("Acme Careers", "https://acme.com/careers", ""),
                hit("Acme Jobs", "https://acme.com/jobs/engineering", ""),
                hit("About Acme", "https://acme.com/about", ""),
                hit("Acme on Lever", "https://jobs.lever.co/acme", ""),
                hit("Acme on Greenhouse", "https://boards.greenhouse.io/acme", ""),
            ],
        )]);

        let keywords = vec!["rust".to_string(), " backend ".to_string()];
        let urls = discover_careers_urls(&search, "Acme", &keywords, 2).await.unwrap();
        let urls: Vec<String> = urls.iter().map(|u| u.to_string()).collect();
        assert_eq!(urls, vec!["https://acme.com/careers", "https://jobs.lever.co/acme"]);
    }

    #[tokio::test]
    async fn careers_urls_empty_company_skips_search() {
        let search = FakeSearch::new(vec![]);
        let urls = discover_careers_urls(&search, "  ", &[], 2).await.unwrap();
        assert!(urls.is_empty());
        assert!(search.queries.lock().unwrap().is_empty());
    }
}
