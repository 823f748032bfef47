//! Heuristic fallback: job-listing link selection and job-detail page
//! classification for career sites without structured markup.

use std::sync::LazyLock;

use async_trait::async_trait;
use careerscout_shared::{Result, text};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::fields;

/// Minimum visible body text for a page to count as a job description.
pub const MIN_BODY_CHARS: usize = 200;

/// Longest heading accepted as a job title.
const MAX_TITLE_CHARS: usize = 120;

/// Path or anchor words that mark job-listing navigation.
const LISTING_WORDS: &[&str] = &[
    "career",
    "careers",
    "job",
    "jobs",
    "position",
    "positions",
    "opening",
    "openings",
    "role",
    "roles",
    "vacancies",
    "opportunities",
];

const SKIP_SEGMENTS: &[&str] = &[
    "blog", "news", "press", "privacy", "terms", "legal", "login", "signin", "cookie",
];

const SKIP_EXTENSIONS: &[&str] = &[
    ".pdf", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".css", ".js", ".zip", ".xml",
];

static NUMERIC_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[-_/])\d{3,}($|[-_/])").expect("valid regex"));

static LINKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
static BODY_BLOCKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("main p, main li, article p, article li, body p, body li").expect("valid selector")
});
static APPLY_TARGETS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a, button, input[type=submit]").expect("valid selector"));
static LOCATION_HINT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"[class*="location"], [data-qa*="location"], [itemprop="jobLocation"]"#)
        .expect("valid selector")
});
static EMPLOYMENT_HINT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"[class*="employment"], [class*="commitment"], [itemprop="employmentType"]"#)
        .expect("valid selector")
});

// ---------------------------------------------------------------------------
// Link selection
// ---------------------------------------------------------------------------

/// A link found on a page, resolved against the page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub url: Url,
    pub anchor: String,
}

/// Extract all links from a document, resolved against the base URL.
pub fn extract_links(doc: &Html, base_url: &Url) -> Vec<PageLink> {
    let mut links = Vec::new();

    for el in doc.select(&LINKS) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
            continue;
        }
        if let Ok(mut resolved) = base_url.join(href) {
            resolved.set_fragment(None);
            links.push(PageLink {
                url: resolved,
                anchor: text::collapse_whitespace(&el.text().collect::<String>()),
            });
        }
    }

    links
}

/// Host with any leading `www.` removed.
pub fn site_domain(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Whether a same-site link looks like job-listing navigation or a posting.
pub fn is_job_link(link: &PageLink, site: &Url) -> bool {
    if link.url.scheme() != "http" && link.url.scheme() != "https" {
        return false;
    }
    if site_domain(&link.url) != site_domain(site) || link.url.port() != site.port() {
        return false;
    }

    let path = link.url.path().to_lowercase();
    if SKIP_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| SKIP_SEGMENTS.contains(s)) {
        return false;
    }

    let anchor = link.anchor.to_lowercase();
    let listing_word = segments.iter().any(|s| {
        s.split(['-', '_', '.'])
            .any(|word| LISTING_WORDS.contains(&word))
    }) || anchor
        .split_whitespace()
        .any(|word| LISTING_WORDS.contains(&word.trim_matches(|c: char| !c.is_alphanumeric())));

    let numeric_id = NUMERIC_ID.is_match(&path);
    let long_slug = segments.last().is_some_and(|s| s.matches('-').count() >= 3);

    listing_word || numeric_id || long_slug
}

// ---------------------------------------------------------------------------
// Detail-page classification
// ---------------------------------------------------------------------------

/// Classify a page as a job-detail page and pull its fields.
///
/// Requires an apply action, a title-like `<h1>`, and at least
/// [`MIN_BODY_CHARS`] of paragraph text. Returns `None` otherwise.
pub fn classify_detail_page(doc: &Html, page_url: &Url, company: &str) -> Option<Map<String, Value>> {
    let title = doc
        .select(&H1)
        .next()
        .map(|h| text::collapse_whitespace(&h.text().collect::<String>()))
        .filter(|t| !t.is_empty() && t.chars().count() <= MAX_TITLE_CHARS)?;

    if !has_apply_action(doc) {
        return None;
    }

    let body = body_text(doc);
    if body.chars().count() < MIN_BODY_CHARS {
        return None;
    }

    let mut fields = Map::new();
    fields::put(&mut fields, fields::TITLE, &title);
    fields::put(&mut fields, fields::COMPANY, company);
    fields::put(&mut fields, fields::DESCRIPTION, &body);
    fields::put(&mut fields, fields::URL, page_url.as_str());
    fields::put_opt(&mut fields, fields::LOCATION, first_text(doc, &LOCATION_HINT).as_deref());
    fields::put_opt(
        &mut fields,
        fields::EMPLOYMENT_TYPE,
        first_text(doc, &EMPLOYMENT_HINT).as_deref(),
    );
    Some(fields)
}

fn has_apply_action(doc: &Html) -> bool {
    doc.select(&APPLY_TARGETS).any(|el| {
        let label = el
            .value()
            .attr("value")
            .map(str::to_string)
            .unwrap_or_else(|| el.text().collect::<String>())
            .to_lowercase();
        let href = el.value().attr("href").unwrap_or_default().to_lowercase();
        label.contains("apply") || href.contains("/apply")
    })
}

/// Paragraph and list text, deduplicated where `main`/`article`/`body`
/// selectors hit the same element.
fn body_text(doc: &Html) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut parts = Vec::new();
    for el in doc.select(&BODY_BLOCKS) {
        if !seen.insert(el.id()) || has_block_ancestor(&el) {
            continue;
        }
        let t = text::collapse_whitespace(&el.text().collect::<String>());
        if !t.is_empty() {
            parts.push(t);
        }
    }
    parts.join("\n")
}

/// `<li><p>..</p></li>` would otherwise be counted twice.
fn has_block_ancestor(el: &ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| matches!(a.value().name(), "p" | "li"))
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .map(|el| text::collapse_whitespace(&el.text().collect::<String>()))
        .find(|t| !t.is_empty() && t.chars().count() <= MAX_TITLE_CHARS)
}

// ---------------------------------------------------------------------------
// Structured extraction capability
// ---------------------------------------------------------------------------

/// Fields a structured-extraction backend may recover from page text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub employment_type: Option<String>,
}

/// Refines heuristic pages (for example via an LLM in JSON mode).
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    async fn extract(&self, page_text: &str) -> Result<ExtractedFields>;
}

/// Overwrite heuristic fields with extracted values where present.
pub fn apply_extracted(fields: &mut Map<String, Value>, extracted: &ExtractedFields) {
    fields::put_opt(fields, fields::TITLE, extracted.title.as_deref());
    fields::put_opt(fields, fields::LOCATION, extracted.location.as_deref());
    fields::put_opt(fields, fields::EMPLOYMENT_TYPE, extracted.employment_type.as_deref());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Url {
        Url::parse("https://www.acme.com/careers").unwrap()
    }

    fn link(href: &str, anchor: &str) -> PageLink {
        PageLink {
            url: Url::parse(href).unwrap(),
            anchor: anchor.into(),
        }
    }

    #[test]
    fn job_link_heuristics() {
        assert!(is_job_link(&link("https://acme.com/jobs", "Open roles"), &site()));
        assert!(is_job_link(&link("https://www.acme.com/about", "Open positions"), &site()));
        assert!(is_job_link(&link("https://acme.com/p/48213", "Engineer"), &site()));
        assert!(is_job_link(
            &link("https://acme.com/team/senior-backend-engineer-nyc", "Senior Backend Engineer"),
            &site()
        ));
        // other domain
        assert!(!is_job_link(&link("https://globex.com/jobs", "Jobs"), &site()));
        // no signal
        assert!(!is_job_link(&link("https://acme.com/about", "About us"), &site()));
        // skipped sections and files
        assert!(!is_job_link(&link("https://acme.com/blog/jobs-update", "Jobs"), &site()));
        assert!(!is_job_link(&link("https://acme.com/careers/brochure.pdf", "Careers"), &site()));
    }

    #[test]
    fn extract_links_resolves_and_drops_anchors() {
        let html = r##"<a href="/jobs/1">Job <b>One</b></a><a href="#top">Top</a><a href="mailto:x@acme.com">Mail</a>"##;
        let doc = Html::parse_document(html);
        let links = extract_links(&doc, &site());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url.as_str(), "https://www.acme.com/jobs/1");
        assert_eq!(links[0].anchor, "Job One");
    }

    fn detail_page(apply: bool, body_repeat: usize) -> String {
        let para = "You will design and operate distributed services that move money. ";
        format!(
            r#"<html><body><main>
                <h1>Senior Backend Engineer</h1>
                <span class="job-location">New York, NY</span>
                <p>{}</p>
                <ul><li>Rust</li><li>Postgres</li></ul>
                {}
            </main></body></html>"#,
            para.repeat(body_repeat),
            if apply { r#"<a href="/jobs/1/apply">Apply now</a>"# } else { "" }
        )
    }

    #[test]
    fn classifies_detail_page() {
        let doc = Html::parse_document(&detail_page(true, 4));
        let url = Url::parse("https://acme.com/jobs/1").unwrap();
        let fields = classify_detail_page(&doc, &url, "Acme").expect("detail page");
        assert_eq!(fields[fields::TITLE], "Senior Backend Engineer");
        assert_eq!(fields[fields::LOCATION], "New York, NY");
        assert_eq!(fields[fields::COMPANY], "Acme");
        let description = fields[fields::DESCRIPTION].as_str().unwrap();
        assert!(description.contains("distributed services"));
        assert!(description.ends_with("Rust\nPostgres"));
    }

    #[test]
    fn rejects_pages_without_apply_or_body() {
        let url = Url::parse("https://acme.com/jobs/1").unwrap();
        let no_apply = Html::parse_document(&detail_page(false, 4));
        assert!(classify_detail_page(&no_apply, &url, "Acme").is_none());

        let thin = Html::parse_document(&detail_page(true, 1));
        assert!(classify_detail_page(&thin, &url, "Acme").is_none());
    }

    #[test]
    fn extracted_fields_override() {
        let mut fields = Map::new();
        fields::put(&mut fields, fields::TITLE, "Engineer II");
        let extracted = ExtractedFields {
            title: Some("Backend Engineer II".into()),
            location: None,
            employment_type: Some("Full-time".into()),
        };
        apply_extracted(&mut fields, &extracted);
        assert_eq!(fields[fields::TITLE], "Backend Engineer II");
        assert_eq!(fields[fields::EMPLOYMENT_TYPE], "Full-time");
        assert!(!fields.contains_key(fields::LOCATION));
    }
}
