//! Per-domain politeness: serialized fetches with a minimum interval,
//! robots.txt rules, and a soft circuit breaker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use careerscout_shared::{CareerScoutError, CrawlConfig, Result};
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// Maximum response size accepted for a page (5 MB).
const MAX_PAGE_BYTES: u64 = 5 * 1024 * 1024;

// ---------------------------------------------------------------------------
// robots.txt
// ---------------------------------------------------------------------------

/// `Disallow` rules from the `User-agent: *` groups of a robots.txt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    disallow: Vec<String>,
}

impl RobotsRules {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn parse(body: &str) -> Self {
        let mut disallow = Vec::new();
        let mut in_star_group = false;
        // Consecutive User-agent lines share one group.
        let mut reading_agents = false;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !reading_agents {
                        in_star_group = false;
                    }
                    reading_agents = true;
                    if value == "*" {
                        in_star_group = true;
                    }
                }
                "disallow" => {
                    reading_agents = false;
                    if in_star_group && !value.is_empty() {
                        disallow.push(value.to_string());
                    }
                }
                _ => reading_agents = false,
            }
        }

        Self { disallow }
    }

    pub fn allows(&self, path: &str) -> bool {
        !self.disallow.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

// ---------------------------------------------------------------------------
// DomainGate
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DomainState {
    last_fetch: Option<Instant>,
    failures: u32,
    robots: Option<RobotsRules>,
    /// Set once robots.txt disallowed a request; the domain is done for the run.
    robots_blocked: bool,
}

/// Result of asking the gate for a page.
#[derive(Debug)]
pub enum Admission {
    /// Refused before any request was sent (breaker or robots.txt).
    Refused(CareerScoutError),
    /// The request went out; carries the body or the fetch error.
    Sent(Result<String>),
}

/// Serializes fetches per domain and enforces politeness policies.
///
/// The per-domain lock is held for the whole fetch, so two tasks never hit
/// the same domain concurrently and the interval is measured between
/// consecutive requests.
pub struct DomainGate {
    client: Client,
    min_interval: Duration,
    failure_threshold: u32,
    respect_robots: bool,
    domains: Mutex<HashMap<String, Arc<Mutex<DomainState>>>>,
}

impl DomainGate {
    pub fn new(client: Client, config: &CrawlConfig) -> Self {
        Self {
            client,
            min_interval: Duration::from_millis(config.rate_limit_ms),
            failure_threshold: config.failure_threshold.max(1),
            respect_robots: config.respect_robots_txt,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Domain key: host plus explicit port.
    pub fn domain_key(url: &Url) -> String {
        let host = url.host_str().unwrap_or_default().to_lowercase();
        match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        }
    }

    async fn state(&self, key: &str) -> Arc<Mutex<DomainState>> {
        let mut domains = self.domains.lock().await;
        domains.entry(key.to_string()).or_default().clone()
    }

    /// Whether the domain is short-circuited for the rest of the run,
    /// by the failure threshold or a robots.txt disallow.
    pub async fn is_tripped(&self, url: &Url) -> bool {
        let state = self.state(&Self::domain_key(url)).await;
        let state = state.lock().await;
        state.robots_blocked || state.failures >= self.failure_threshold
    }

    /// Fetch a URL as text under the domain's politeness rules.
    pub async fn fetch(&self, url: &Url) -> Result<String> {
        match self.admit_and_fetch(url).await {
            Admission::Refused(e) => Err(e),
            Admission::Sent(result) => result,
        }
    }

    /// Like [`DomainGate::fetch`], but tells refusals apart from requests
    /// that were actually sent.
    ///
    /// Transport errors, timeouts, 429 and 5xx count toward the breaker;
    /// other non-success statuses are plain errors.
    pub async fn admit_and_fetch(&self, url: &Url) -> Admission {
        let key = Self::domain_key(url);
        let state = self.state(&key).await;
        let mut state = state.lock().await;

        if state.failures >= self.failure_threshold {
            return Admission::Refused(CareerScoutError::source_unavailable(
                format!("crawl:{key}"),
                "failure threshold reached",
            ));
        }
        if state.robots_blocked {
            return Admission::Refused(CareerScoutError::source_unavailable(
                format!("crawl:{key}"),
                "disallowed by robots.txt",
            ));
        }

        if self.respect_robots {
            if state.robots.is_none() {
                let rules = self.load_robots(url, &mut state).await;
                state.robots = Some(rules);
            }
            if let Some(rules) = &state.robots {
                if !rules.allows(url.path()) {
                    state.robots_blocked = true;
                    warn!(domain = %key, %url, "disallowed by robots.txt, skipping domain");
                    return Admission::Refused(CareerScoutError::validation(format!(
                        "{url}: disallowed by robots.txt"
                    )));
                }
            }
        }

        self.wait_turn(&mut state).await;
        let result = self.get(url).await;

        match &result {
            Ok(_) => {}
            Err(FetchError::Retryable(msg)) => {
                state.failures += 1;
                warn!(domain = %key, failures = state.failures, error = %msg, "fetch failed");
            }
            Err(FetchError::Status(status)) => {
                debug!(domain = %key, %url, %status, "non-success status");
            }
        }

        Admission::Sent(result.map_err(|e| match e {
            FetchError::Retryable(msg) => CareerScoutError::Network(msg),
            FetchError::Status(status) => CareerScoutError::Network(format!("{url}: HTTP {status}")),
        }))
    }

    async fn wait_turn(&self, state: &mut DomainState) {
        if let Some(prev) = state.last_fetch {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        state.last_fetch = Some(Instant::now());
    }

    async fn load_robots(&self, url: &Url, state: &mut DomainState) -> RobotsRules {
        let Ok(robots_url) = url.join("/robots.txt") else {
            return RobotsRules::allow_all();
        };
        self.wait_turn(state).await;
        match self.get(&robots_url).await {
            Ok(body) => RobotsRules::parse(&body),
            Err(_) => {
                debug!(%robots_url, "no robots.txt, allowing all");
                RobotsRules::allow_all()
            }
        }
    }

    async fn get(&self, url: &Url) -> std::result::Result<String, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| FetchError::Retryable(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(FetchError::Retryable(format!("{url}: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_PAGE_BYTES {
                return Err(FetchError::Status(StatusCode::PAYLOAD_TOO_LARGE));
            }
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Retryable(format!("{url}: body read failed: {e}")))
    }
}

enum FetchError {
    Retryable(String),
    Status(StatusCode),
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(rate_limit_ms: u64, respect_robots_txt: bool) -> CrawlConfig {
        CrawlConfig {
            rate_limit_ms,
            failure_threshold: 2,
            respect_robots_txt,
            ..CrawlConfig::default()
        }
    }

    fn gate(config: &CrawlConfig) -> DomainGate {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        DomainGate::new(client, config)
    }

    #[test]
    fn robots_star_group_only() {
        let body = "User-agent: Googlebot\nDisallow: /private-google\n\n\
                    User-agent: *\nDisallow: /admin # staff only\nDisallow:\n\n\
                    User-agent: other\nUser-agent: *\nDisallow: /tmp\n";
        let rules = RobotsRules::parse(body);
        assert!(!rules.allows("/admin/users"));
        assert!(!rules.allows("/tmp/x"));
        assert!(rules.allows("/private-google"));
        assert!(rules.allows("/careers"));
    }

    #[test]
    fn robots_disallow_root_blocks_everything() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow: /\n");
        assert!(!rules.allows("/"));
        assert!(!rules.allows("/careers"));
    }

    #[tokio::test]
    async fn serializes_with_min_interval() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let gate = Arc::new(gate(&config(100, false)));
        let base = Url::parse(&server.uri()).unwrap();
        let start = Instant::now();

        let mut handles = Vec::new();
        for i in 0..3 {
            let gate = gate.clone();
            let url = base.join(&format!("/page{i}")).unwrap();
            handles.push(tokio::spawn(async move { gate.fetch(&url).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "ok");
        }

        // Three fetches to one domain: at least two full intervals.
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn breaker_trips_after_threshold() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let gate = gate(&config(0, false));
        let url = Url::parse(&format!("{}/jobs", server.uri())).unwrap();

        assert!(gate.fetch(&url).await.is_err());
        assert!(!gate.is_tripped(&url).await);
        assert!(gate.fetch(&url).await.is_err());
        assert!(gate.is_tripped(&url).await);

        let err = gate.fetch(&url).await.unwrap_err();
        assert!(matches!(err, CareerScoutError::SourceUnavailable { .. }));
        // Only the first two reached the server.
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn not_found_does_not_count_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let gate = gate(&config(0, false));
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        for _ in 0..3 {
            assert!(gate.fetch(&url).await.is_err());
        }
        assert!(!gate.is_tripped(&url).await);
    }

    #[tokio::test]
    async fn robots_disallow_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /careers\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/careers"))
            .respond_with(ResponseTemplate::new(200).set_body_string("jobs"))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(ResponseTemplate::new(200).set_body_string("about"))
            .expect(0)
            .mount(&server)
            .await;

        let gate = gate(&config(0, true));
        let careers = Url::parse(&format!("{}/careers", server.uri())).unwrap();
        let err = gate.fetch(&careers).await.unwrap_err();
        assert!(err.to_string().contains("robots.txt"));
        assert!(gate.is_tripped(&careers).await);

        // The rest of the domain is skipped too, without a request.
        let about = Url::parse(&format!("{}/about", server.uri())).unwrap();
        assert!(matches!(gate.admit_and_fetch(&about).await, Admission::Refused(_)));
        // Only robots.txt reached the server.
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn allowed_path_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("jobs"))
            .mount(&server)
            .await;

        let gate = gate(&config(0, true));
        let jobs = Url::parse(&format!("{}/jobs", server.uri())).unwrap();
        match gate.admit_and_fetch(&jobs).await {
            Admission::Sent(Ok(body)) => assert_eq!(body, "jobs"),
            other => panic!("unexpected admission: {other:?}"),
        }
        assert!(!gate.is_tripped(&jobs).await);
    }
}
