//! RawRecord -> CanonicalJob normalization.
//!
//! Each source family has a field map of dotted paths into its loose field
//! bag. Normalization is pure: the same record always yields the same job.

use careerscout_crawler::fields;
use careerscout_shared::text;
use careerscout_shared::{CanonicalJob, Confidence, EmploymentType, RawRecord};
use serde_json::{Map, Value};
use tracing::debug;

/// Candidate dotted paths for each canonical field; the first non-empty wins.
struct FieldMap {
    native_id: &'static [&'static str],
    title: &'static [&'static str],
    company: &'static [&'static str],
    /// Joined with `", "` when several are present.
    location_parts: &'static [&'static str],
    /// Set when the bag marks a remote role and no location resolved.
    remote_flag: Option<&'static str>,
    description: &'static [&'static str],
    employment_type: &'static [&'static str],
    url: &'static [&'static str],
    publisher: &'static [&'static str],
}

const JSEARCH: FieldMap = FieldMap {
    native_id: &["job_id"],
    title: &["job_title"],
    company: &["employer_name"],
    location_parts: &["job_city", "job_state", "job_country"],
    remote_flag: Some("job_is_remote"),
    description: &["job_description"],
    employment_type: &["job_employment_type"],
    url: &["job_apply_link", "job_google_link"],
    publisher: &["job_publisher"],
};

const ADZUNA: FieldMap = FieldMap {
    native_id: &["id"],
    title: &["title"],
    company: &["company.display_name"],
    location_parts: &["location.display_name"],
    remote_flag: None,
    description: &["description"],
    employment_type: &["contract_time", "contract_type"],
    url: &["redirect_url"],
    publisher: &[],
};

/// Crawl records and any source that uses the plain crawl keys.
const CRAWL: FieldMap = FieldMap {
    native_id: &[fields::NATIVE_ID],
    title: &[fields::TITLE],
    company: &[fields::COMPANY],
    location_parts: &[fields::LOCATION],
    remote_flag: None,
    description: &[fields::DESCRIPTION],
    employment_type: &[fields::EMPLOYMENT_TYPE],
    url: &[fields::URL],
    publisher: &[fields::PUBLISHER],
};

fn field_map(source: &str) -> &'static FieldMap {
    match source {
        careerscout_sources::jsearch::TAG => &JSEARCH,
        careerscout_sources::adzuna::TAG => &ADZUNA,
        _ => &CRAWL,
    }
}

fn is_api_source(source: &str) -> bool {
    source.starts_with("api:")
}

/// Normalize one record, or `None` when title or company cannot be resolved.
pub fn normalize(record: &RawRecord) -> Option<CanonicalJob> {
    let map = field_map(&record.source);
    let bag = &record.fields;

    let title = text::collapse_whitespace(&first(bag, map.title)?);
    let company = text::collapse_whitespace(&first(bag, map.company)?);
    if title.is_empty() || company.is_empty() {
        return None;
    }

    let location = location(bag, map);
    let description = first(bag, map.description)
        .map(|d| text::strip_markup(&d))
        .unwrap_or_default();
    let employment_type = first(bag, map.employment_type)
        .map(|e| EmploymentType::from_text(&e))
        .unwrap_or_default();
    let url = first(bag, map.url).unwrap_or_default();
    let publisher = first(bag, map.publisher).map(|p| text::collapse_whitespace(&p));

    let confidence = if is_api_source(&record.source) {
        Confidence::Api
    } else {
        record.confidence.unwrap_or(Confidence::Heuristic)
    };

    let fingerprint = text::content_fingerprint(&title, &company, &description);
    let job_id = job_id(
        &record.source,
        first(bag, map.native_id).as_deref(),
        &title,
        &company,
        &location,
        &url,
        &fingerprint,
    );

    Some(CanonicalJob {
        job_id,
        title,
        company,
        location,
        employment_type,
        description,
        sources: [record.source.clone()].into(),
        publisher,
        url,
        confidence,
        fetched_at: record.fetched_at,
        fingerprint,
    })
}

/// Normalize a batch, returning the jobs and the number of dropped records.
pub fn normalize_all(records: &[RawRecord]) -> (Vec<CanonicalJob>, usize) {
    let mut jobs = Vec::with_capacity(records.len());
    let mut dropped = 0;
    for record in records {
        match normalize(record) {
            Some(job) => jobs.push(job),
            None => {
                dropped += 1;
                debug!(source = %record.source, "dropped record without title or company");
            }
        }
    }
    (jobs, dropped)
}

/// API ids come from the native id under the source tag. Crawled postings
/// hash the normalized key together with the content fingerprint.
fn job_id(
    source: &str,
    native_id: Option<&str>,
    title: &str,
    company: &str,
    location: &str,
    url: &str,
    fingerprint: &str,
) -> String {
    let company = text::normalize_company(company);
    let title = text::normalize_title(title);
    let location = text::normalize_location(location);

    if is_api_source(source) {
        return match native_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => format!("{source}:{id}"),
            None => format!(
                "{source}:{}",
                text::stable_id(&[&company, &title, &location, url])
            ),
        };
    }
    format!(
        "crawl:{}",
        text::stable_id(&[&company, &title, &location, fingerprint])
    )
}

fn location(bag: &Map<String, Value>, map: &FieldMap) -> String {
    let parts: Vec<String> = map
        .location_parts
        .iter()
        .filter_map(|path| lookup(bag, path))
        .map(|p| text::collapse_whitespace(&p))
        .filter(|p| !p.is_empty())
        .collect();
    if !parts.is_empty() {
        return parts.join(", ");
    }

    let remote = map
        .remote_flag
        .and_then(|path| resolve(bag, path))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if remote { "Remote".into() } else { String::new() }
}

fn first(bag: &Map<String, Value>, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| lookup(bag, path))
        .find(|v| !v.trim().is_empty())
        .map(|v| v.trim().to_string())
}

/// String value at a dotted path; numbers are rendered as text.
fn lookup(bag: &Map<String, Value>, path: &str) -> Option<String> {
    match resolve(bag, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn resolve<'a>(bag: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = bag.get(segments.next()?)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}
