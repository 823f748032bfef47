//! schema.org `JobPosting` extraction from JSON-LD script blocks.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::fields;

static LD_JSON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector")
});

/// Extract every `JobPosting` on a page as a crawl field bag.
///
/// Accepts a top-level object, an array of objects, or an `@graph` container.
/// `company` is used when a posting names no hiring organization.
pub fn extract_job_postings(doc: &Html, page_url: &Url, company: &str) -> Vec<Map<String, Value>> {
    let mut postings = Vec::new();

    for script in doc.select(&LD_JSON) {
        let raw: String = script.text().collect();
        let value: Value = match serde_json::from_str(raw.trim()) {
            Ok(v) => v,
            Err(e) => {
                debug!(url = %page_url, error = %e, "skipping malformed JSON-LD block");
                continue;
            }
        };

        let mut objects = Vec::new();
        collect_objects(&value, &mut objects);

        postings.extend(
            objects
                .into_iter()
                .filter(|obj| is_job_posting(obj))
                .filter_map(|obj| map_posting(obj, page_url, company)),
        );
    }

    postings
}

fn collect_objects<'a>(value: &'a Value, out: &mut Vec<&'a Map<String, Value>>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_objects(item, out)),
        Value::Object(obj) => {
            out.push(obj);
            if let Some(graph) = obj.get("@graph") {
                collect_objects(graph, out);
            }
        }
        _ => {}
    }
}

fn is_job_posting(obj: &Map<String, Value>) -> bool {
    match obj.get("@type") {
        Some(Value::String(t)) => t == "JobPosting",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("JobPosting")),
        _ => false,
    }
}

fn map_posting(obj: &Map<String, Value>, page_url: &Url, company: &str) -> Option<Map<String, Value>> {
    let title = obj
        .get("title")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)?;

    let mut fields = Map::new();
    fields::put(&mut fields, fields::TITLE, title);

    let org = match obj.get("hiringOrganization") {
        Some(Value::String(name)) => Some(name.as_str()),
        Some(org) => org.get("name").and_then(Value::as_str),
        None => None,
    };
    fields::put(&mut fields, fields::COMPANY, org.unwrap_or(company));

    fields::put_opt(
        &mut fields,
        fields::DESCRIPTION,
        obj.get("description").and_then(Value::as_str),
    );
    fields::put(&mut fields, fields::LOCATION, &location(obj));
    fields::put(&mut fields, fields::EMPLOYMENT_TYPE, &string_or_list(obj.get("employmentType")));

    let url = obj
        .get("url")
        .and_then(Value::as_str)
        .and_then(|u| page_url.join(u).ok())
        .unwrap_or_else(|| page_url.clone());
    fields::put(&mut fields, fields::URL, url.as_str());

    let identifier = match obj.get("identifier") {
        Some(Value::Object(id)) => id.get("value").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    fields::put_opt(&mut fields, fields::NATIVE_ID, identifier.as_deref());

    Some(fields)
}

/// `jobLocation` is an object or a list of objects with a postal address.
fn location(obj: &Map<String, Value>) -> String {
    let places: Vec<&Value> = match obj.get("jobLocation") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item) => vec![item],
        None => Vec::new(),
    };

    for place in places {
        if let Some(name) = place.as_str() {
            return name.to_string();
        }
        let Some(address) = place.get("address") else {
            continue;
        };
        if let Some(addr) = address.as_str() {
            return addr.to_string();
        }
        let parts: Vec<&str> = ["addressLocality", "addressRegion", "addressCountry"]
            .iter()
            .filter_map(|key| match address.get(*key) {
                Some(Value::String(s)) => Some(s.as_str()),
                Some(other) => other.get("name").and_then(Value::as_str),
                None => None,
            })
            .filter(|s| !s.trim().is_empty())
            .collect();
        if !parts.is_empty() {
            return parts.join(", ");
        }
    }

    if obj.get("jobLocationType").and_then(Value::as_str) == Some("TELECOMMUTE") {
        return "Remote".into();
    }
    String::new()
}

fn string_or_list(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://acme.com/careers/backend").unwrap()
    }

    #[test]
    fn extracts_single_posting() {
        let html = r#"<html><head>
            <script type="application/ld+json">
            {
              "@context": "https://schema.org",
              "@type": "JobPosting",
              "title": "Backend Engineer",
              "description": "<p>Build APIs in Rust.</p>",
              "hiringOrganization": {"@type": "Organization", "name": "Acme Inc."},
              "jobLocation": {"@type": "Place", "address": {"addressLocality": "New York", "addressRegion": "NY"}},
              "employmentType": "FULL_TIME",
              "identifier": {"@type": "PropertyValue", "value": 991},
              "datePosted": "2026-09-01"
            }
            </script></head><body></body></html>"#;
        let doc = Html::parse_document(html);
        let postings = extract_job_postings(&doc, &page(), "Acme");
        assert_eq!(postings.len(), 1);
        let p = &postings[0];
        assert_eq!(p[fields::TITLE], "Backend Engineer");
        assert_eq!(p[fields::COMPANY], "Acme Inc.");
        assert_eq!(p[fields::LOCATION], "New York, NY");
        assert_eq!(p[fields::EMPLOYMENT_TYPE], "FULL_TIME");
        assert_eq!(p[fields::NATIVE_ID], "991");
        assert_eq!(p[fields::URL], "https://acme.com/careers/backend");
        // Only keys the normalizer maps are emitted.
        assert!(!p.contains_key("date_posted"));
        assert_eq!(p.len(), 7);
    }

    #[test]
    fn handles_graph_arrays_and_type_lists() {
        let html = r#"<script type="application/ld+json">
            {"@graph": [
                {"@type": "Organization", "name": "Acme"},
                {"@type": ["JobPosting"], "title": "SRE", "jobLocation": [{"address": {"addressLocality": "Berlin", "addressCountry": {"name": "DE"}}}]}
            ]}
            </script>
            <script type="application/ld+json">
            [{"@type": "JobPosting", "name": "Designer", "jobLocationType": "TELECOMMUTE", "url": "/careers/designer"}]
            </script>"#;
        let doc = Html::parse_document(html);
        let postings = extract_job_postings(&doc, &page(), "Acme");
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0][fields::LOCATION], "Berlin, DE");
        assert_eq!(postings[0][fields::COMPANY], "Acme");
        assert_eq!(postings[1][fields::TITLE], "Designer");
        assert_eq!(postings[1][fields::LOCATION], "Remote");
        assert_eq!(postings[1][fields::URL], "https://acme.com/careers/designer");
    }

    #[test]
    fn ignores_malformed_and_non_posting_blocks() {
        let html = r#"<script type="application/ld+json">{ not json</script>
            <script type="application/ld+json">{"@type": "WebSite", "name": "Acme"}</script>
            <script type="application/ld+json">{"@type": "JobPosting"}</script>"#;
        let doc = Html::parse_document(html);
        assert!(extract_job_postings(&doc, &page(), "Acme").is_empty());
    }
}
