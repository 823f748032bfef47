//! Applicant-tracking-system boards: endpoint layout, board link detection,
//! and mapping of board JSON into crawl field bags.
//!
//! Greenhouse and Lever publish machine-readable job boards; postings read
//! from them are emitted at `structured` confidence.

use careerscout_shared::text;
use serde_json::{Map, Value};
use url::Url;

use crate::fields;

/// Which ATS a board belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtsKind {
    Greenhouse,
    Lever,
}

impl AtsKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Greenhouse => "Greenhouse",
            Self::Lever => "Lever",
        }
    }
}

/// A company's board on an ATS.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtsBoard {
    pub kind: AtsKind,
    pub slug: String,
}

/// Base URLs for ATS probes. Overridable so tests can point at a mock server.
#[derive(Debug, Clone)]
pub struct AtsEndpoints {
    pub greenhouse_api: String,
    pub lever_api: String,
    /// Workday careers page template; `{slug}` is replaced by the company slug.
    pub workday_page: String,
}

impl Default for AtsEndpoints {
    fn default() -> Self {
        Self {
            greenhouse_api: "https://boards-api.greenhouse.io".into(),
            lever_api: "https://api.lever.co".into(),
            workday_page: "https://{slug}.wd1.myworkdayjobs.com/{slug}".into(),
        }
    }
}

impl AtsEndpoints {
    /// JSON endpoint listing every posting on a board.
    pub fn board_url(&self, board: &AtsBoard) -> String {
        match board.kind {
            AtsKind::Greenhouse => format!(
                "{}/v1/boards/{}/jobs?content=true",
                self.greenhouse_api.trim_end_matches('/'),
                board.slug
            ),
            AtsKind::Lever => format!(
                "{}/v0/postings/{}?mode=json",
                self.lever_api.trim_end_matches('/'),
                board.slug
            ),
        }
    }

    pub fn workday_url(&self, slug: &str) -> String {
        self.workday_page.replace("{slug}", slug)
    }
}

/// Recognize a link into a Greenhouse or Lever board.
pub fn detect_board(url: &Url) -> Option<AtsBoard> {
    let host = url.host_str()?.to_lowercase();
    let kind = match host.as_str() {
        "boards.greenhouse.io" | "job-boards.greenhouse.io" | "boards-api.greenhouse.io" => {
            AtsKind::Greenhouse
        }
        "jobs.lever.co" | "api.lever.co" => AtsKind::Lever,
        _ => return None,
    };

    // Embedded boards carry the slug in `?for=<slug>`.
    if let Some((_, slug)) = url.query_pairs().find(|(k, _)| k == "for") {
        return board(kind, &slug);
    }

    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let mut first = segments.next()?;
    // API paths: /v1/boards/<slug>/..., /v0/postings/<slug>
    if first == "v1" || first == "v0" {
        segments.next()?;
        first = segments.next()?;
    }
    if first == "embed" {
        return None;
    }
    board(kind, first)
}

fn board(kind: AtsKind, slug: &str) -> Option<AtsBoard> {
    let slug = slug.trim().to_lowercase();
    if slug.is_empty() || !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return None;
    }
    Some(AtsBoard { kind, slug })
}

/// Map a board payload to crawl field bags.
pub fn board_postings(kind: AtsKind, payload: &Value, company: &str) -> Vec<Map<String, Value>> {
    match kind {
        AtsKind::Greenhouse => greenhouse_postings(payload, company),
        AtsKind::Lever => lever_postings(payload, company),
    }
}

/// Greenhouse `GET /v1/boards/<slug>/jobs?content=true`.
fn greenhouse_postings(payload: &Value, company: &str) -> Vec<Map<String, Value>> {
    let Some(jobs) = payload.get("jobs").and_then(Value::as_array) else {
        return Vec::new();
    };

    jobs.iter()
        .filter_map(|job| {
            let title = job.get("title").and_then(Value::as_str)?;
            // Board content arrives entity-escaped.
            let content = job.get("content").and_then(Value::as_str).unwrap_or_default();
            let description = if content.contains("&lt;") {
                text::strip_markup(content)
            } else {
                content.to_string()
            };

            let mut fields = Map::new();
            fields::put(&mut fields, fields::TITLE, title);
            fields::put(&mut fields, fields::COMPANY, company);
            fields::put(&mut fields, fields::DESCRIPTION, &description);
            fields::put_opt(
                &mut fields,
                fields::LOCATION,
                job.pointer("/location/name").and_then(Value::as_str),
            );
            fields::put_opt(
                &mut fields,
                fields::URL,
                job.get("absolute_url").and_then(Value::as_str),
            );
            if let Some(id) = job.get("id").and_then(scalar_string) {
                fields::put(&mut fields, fields::NATIVE_ID, &id);
            }
            fields::put(&mut fields, fields::PUBLISHER, AtsKind::Greenhouse.name());
            Some(fields)
        })
        .collect()
}

/// Lever `GET /v0/postings/<slug>?mode=json`.
fn lever_postings(payload: &Value, company: &str) -> Vec<Map<String, Value>> {
    let Some(postings) = payload.as_array() else {
        return Vec::new();
    };

    postings
        .iter()
        .filter_map(|posting| {
            let title = posting.get("text").and_then(Value::as_str)?;
            let description = posting
                .get("descriptionPlain")
                .or_else(|| posting.get("description"))
                .and_then(Value::as_str)
                .unwrap_or_default();

            let mut fields = Map::new();
            fields::put(&mut fields, fields::TITLE, title);
            fields::put(&mut fields, fields::COMPANY, company);
            fields::put(&mut fields, fields::DESCRIPTION, description);
            fields::put_opt(
                &mut fields,
                fields::LOCATION,
                posting.pointer("/categories/location").and_then(Value::as_str),
            );
            fields::put_opt(
                &mut fields,
                fields::EMPLOYMENT_TYPE,
                posting.pointer("/categories/commitment").and_then(Value::as_str),
            );
            fields::put_opt(
                &mut fields,
                fields::URL,
                posting
                    .get("hostedUrl")
                    .or_else(|| posting.get("applyUrl"))
                    .and_then(Value::as_str),
            );
            fields::put_opt(
                &mut fields,
                fields::NATIVE_ID,
                posting.get("id").and_then(Value::as_str),
            );
            fields::put(&mut fields, fields::PUBLISHER, AtsKind::Lever.name());
            Some(fields)
        })
        .collect()
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
