//! Search-driven company discovery.
//!
//! Issues a few hiring-oriented web searches for the profile's keywords,
//! pulls company names out of hit titles and ATS board URLs, and ranks the
//! candidates by how often they were mentioned.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use careerscout_shared::{
    CareerScoutError, CompanyCandidate, Result, SearchQuery, SizeClass, text,
};
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::search::{SearchHit, WebSearch};

/// Provenance tag for discovery failures.
pub const TAG: &str = "search:discovery";

/// Names of job aggregators and boards that show up in titles but are not employers.
const NOT_EMPLOYERS: &[&str] = &[
    "indeed",
    "linkedin",
    "glassdoor",
    "ziprecruiter",
    "monster",
    "simplyhired",
    "wellfound",
    "angellist",
    "built in",
    "builtin",
    "dice",
    "careerbuilder",
    "the muse",
    "greenhouse",
    "lever",
    "workday",
    "remote",
    "top",
    "tech",
    "startup",
    "startups",
];

const BIG_TECH: &[&str] = &[
    "google",
    "alphabet",
    "meta",
    "facebook",
    "amazon",
    "apple",
    "microsoft",
    "netflix",
    "nvidia",
    "ibm",
    "oracle",
    "salesforce",
    "adobe",
    "intel",
    "cisco",
    "uber",
];

const BIG_TECH_MARKERS: &[&str] = &["fortune 500", "big tech", "faang", "maang", "multinational"];

const STARTUP_MARKERS: &[&str] = &[
    "startup",
    "start-up",
    "seed",
    "series a",
    "series b",
    "y combinator",
    "yc-backed",
    "early-stage",
    "early stage",
];

static CAREERS_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:Careers at|Jobs at|Work at|Working at|Join)\s+([A-Z0-9][\w&.' -]{0,60}?)\s*(?:[|\-:–—(]|$)")
        .expect("valid regex")
});

static NAME_CAREERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Z0-9][\w&.' -]{0,60}?)\s+(?:Careers|Jobs)\b").expect("valid regex")
});

/// Ranked company candidates from web search evidence.
pub struct CompanyDiscovery {
    search: Arc<dyn WebSearch>,
    results_per_query: usize,
    max_companies: usize,
}

#[derive(Debug)]
struct Evidence {
    name: String,
    mentions: usize,
    context: String,
}

impl CompanyDiscovery {
    pub fn new(search: Arc<dyn WebSearch>, results_per_query: usize, max_companies: usize) -> Self {
        Self {
            search,
            results_per_query,
            max_companies,
        }
    }

    /// Discover candidate employers for a query, most-mentioned first.
    ///
    /// Individual search failures are logged; only when every search fails is
    /// the whole discovery step reported unavailable.
    #[instrument(skip_all, fields(keywords = %query.keyword_phrase()))]
    pub async fn discover(&self, query: &SearchQuery) -> Result<Vec<CompanyCandidate>> {
        let phrase = query.keyword_phrase();
        if phrase.is_empty() {
            return Ok(Vec::new());
        }

        let searches = [
            format!("{phrase} companies hiring"),
            format!("{phrase} startups hiring"),
            format!("top tech companies hiring {phrase}"),
        ];

        let mut evidence: HashMap<String, Evidence> = HashMap::new();
        let mut failures = 0;
        let mut last_error = None;

        for q in &searches {
            match self.search.search(q, self.results_per_query).await {
                Ok(hits) => {
                    debug!(query = %q, hits = hits.len(), "discovery search");
                    for hit in &hits {
                        record_hit(&mut evidence, hit);
                    }
                }
                Err(e) => {
                    warn!(query = %q, error = %e, "discovery search failed");
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures == searches.len() {
            let message = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "all searches failed".into());
            return Err(CareerScoutError::source_unavailable(TAG, message));
        }

        let mut candidates: Vec<CompanyCandidate> = evidence
            .into_values()
            .map(|ev| CompanyCandidate {
                size_class: classify_size(&ev.name, &ev.context),
                name: ev.name,
                mentions: ev.mentions,
            })
            .collect();

        candidates.sort_by(|a, b| b.mentions.cmp(&a.mentions).then_with(|| a.name.cmp(&b.name)));
        candidates.truncate(self.max_companies);

        info!(count = candidates.len(), "companies discovered");
        Ok(candidates)
    }
}

/// Add every company named by a hit to the evidence table.
fn record_hit(evidence: &mut HashMap<String, Evidence>, hit: &SearchHit) {
    let mut names = Vec::new();
    if let Some(name) = name_from_title(&hit.title) {
        names.push(name);
    }
    if let Some(name) = name_from_ats_url(&hit.link) {
        names.push(name);
    }

    let mut counted = Vec::new();
    for name in names {
        let key = text::normalize_company(&name);
        if key.is_empty() || NOT_EMPLOYERS.contains(&key.as_str()) || counted.contains(&key) {
            continue;
        }
        let entry = evidence.entry(key.clone()).or_insert_with(|| Evidence {
            name: name.clone(),
            mentions: 0,
            context: String::new(),
        });
        entry.mentions += 1;
        entry.context.push(' ');
        entry.context.push_str(&hit.title.to_lowercase());
        entry.context.push(' ');
        entry.context.push_str(&hit.snippet.to_lowercase());
        counted.push(key);
    }
}

/// Extract a company name from `"Careers at Acme"` / `"Acme Careers | ..."` titles.
pub fn name_from_title(title: &str) -> Option<String> {
    let caps = CAREERS_TITLE
        .captures(title)
        .or_else(|| NAME_CAREERS.captures(title))?;
    let name = text::collapse_whitespace(caps.get(1)?.as_str());
    let name = name.trim_end_matches(['.', '-', '\'']).trim().to_string();
    if name.is_empty() { None } else { Some(name) }
}

/// Extract a company from a Greenhouse or Lever board URL slug.
pub fn name_from_ats_url(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    let host = url.host_str()?.to_lowercase();
    let is_board = host == "boards.greenhouse.io"
        || host == "job-boards.greenhouse.io"
        || host == "jobs.lever.co";
    if !is_board {
        return None;
    }
    let slug = url.path_segments()?.find(|s| !s.is_empty())?;
    Some(title_case_slug(slug))
}

fn title_case_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Infer a size class from the company name and the text around its mentions.
pub fn classify_size(name: &str, context: &str) -> SizeClass {
    let key = text::normalize_company(name);
    if BIG_TECH.contains(&key.as_str()) || BIG_TECH_MARKERS.iter().any(|m| context.contains(m)) {
        SizeClass::BigTech
    } else if STARTUP_MARKERS.iter().any(|m| context.contains(m)) {
        SizeClass::Startup
    } else {
        SizeClass::MidSize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tests::{FakeSearch, hit};
    use async_trait::async_trait;

    fn query() -> SearchQuery {
        SearchQuery {
            terms: vec!["rust developer".into()],
            keywords: vec!["rust".into()],
        }
    }

    #[test]
    fn names_from_titles() {
        assert_eq!(name_from_title("Careers at Acme | Open roles").as_deref(), Some("Acme"));
        assert_eq!(name_from_title("Jobs at Globex - Apply now").as_deref(), Some("Globex"));
        assert_eq!(name_from_title("Initech Careers").as_deref(), Some("Initech"));
        assert_eq!(
            name_from_title("Hooli XYZ Jobs | Engineering").as_deref(),
            Some("Hooli XYZ")
        );
        assert_eq!(name_from_title("10 best places to work"), None);
    }

    #[test]
    fn names_from_ats_urls() {
        assert_eq!(
            name_from_ats_url("https://boards.greenhouse.io/acme-robotics/jobs/123").as_deref(),
            Some("Acme Robotics")
        );
        assert_eq!(name_from_ats_url("https://jobs.lever.co/globex").as_deref(), Some("Globex"));
        assert_eq!(name_from_ats_url("https://acme.com/careers"), None);
    }

    #[test]
    fn size_classes() {
        assert_eq!(classify_size("Google", ""), SizeClass::BigTech);
        assert_eq!(classify_size("Acme", "a fortune 500 company"), SizeClass::BigTech);
        assert_eq!(classify_size("Tiny", "seed-funded startup"), SizeClass::Startup);
        assert_eq!(classify_size("Initech", "payments company"), SizeClass::MidSize);
    }

    #[tokio::test]
    async fn ranks_by_mentions_then_name() {
        let search = FakeSearch::new(vec![
            (
                "rust companies hiring",
                vec![
                    hit("Acme Careers", "https://acme.com/careers", "Payments platform"),
                    hit("Jobs at Globex", "https://globex.com/jobs", ""),
                    hit("Indeed Jobs | Rust", "https://indeed.com/q-rust", ""),
                ],
            ),
            (
                "rust startups hiring",
                vec![hit(
                    "Rust Engineer - Acme",
                    "https://boards.greenhouse.io/acme",
                    "Series A startup",
                )],
            ),
            (
                "top tech companies hiring rust",
                vec![hit("Careers at Initech", "https://initech.com/careers", "")],
            ),
        ]);

        let discovery = CompanyDiscovery::new(Arc::new(search), 10, 10);
        let candidates = discovery.discover(&query()).await.unwrap();
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Acme", "Globex", "Initech"]);
        assert_eq!(candidates[0].mentions, 2);
        assert_eq!(candidates[0].size_class, SizeClass::Startup);
        assert_eq!(candidates[1].size_class, SizeClass::MidSize);
    }

    #[tokio::test]
    async fn truncates_to_max_companies() {
        let search = FakeSearch::new(vec![(
            "rust companies hiring",
            vec![
                hit("Acme Careers", "https://acme.com/careers", ""),
                hit("Globex Careers", "https://globex.com/careers", ""),
                hit("Initech Careers", "https://initech.com/careers", ""),
            ],
        )]);
        let discovery = CompanyDiscovery::new(Arc::new(search), 10, 2);
        let candidates = discovery.discover(&query()).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "Acme");
    }

    struct FailingSearch;

    #[async_trait]
    impl WebSearch for FailingSearch {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SearchHit>> {
            Err(CareerScoutError::source_unavailable("search:serper", "HTTP 401"))
        }
    }

    #[tokio::test]
    async fn all_searches_failing_is_unavailable() {
        let discovery = CompanyDiscovery::new(Arc::new(FailingSearch), 10, 5);
        let err = discovery.discover(&query()).await.unwrap_err();
        assert!(matches!(err, CareerScoutError::SourceUnavailable { .. }));
    }
}
