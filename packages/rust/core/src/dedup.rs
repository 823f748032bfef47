//! Deduplication and merging of canonical jobs across sources.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use careerscout_shared::{CanonicalJob, EmploymentType};
use tracing::debug;

/// Merge duplicates: first by `job_id`, then by normalized
/// `(company, title, location)`.
///
/// The output is sorted by `job_id` and does not depend on input order.
pub fn merge(jobs: Vec<CanonicalJob>) -> Vec<CanonicalJob> {
    let input = jobs.len();
    let by_id = merge_groups(jobs, |job| job.job_id.clone());
    let mut merged = merge_groups(by_id, CanonicalJob::dedup_key);
    merged.sort_by(|a, b| a.job_id.cmp(&b.job_id));

    debug!(input, merged = merged.len(), "deduplicated jobs");
    merged
}

fn merge_groups<K: Ord>(
    jobs: Vec<CanonicalJob>,
    key: impl Fn(&CanonicalJob) -> K,
) -> Vec<CanonicalJob> {
    let mut groups: BTreeMap<K, Vec<CanonicalJob>> = BTreeMap::new();
    for job in jobs {
        groups.entry(key(&job)).or_default().push(job);
    }
    groups.into_values().filter_map(merge_group).collect()
}

/// Survivor tier: machine-readable with a description, machine-readable
/// without one, then heuristic.
fn tier(job: &CanonicalJob) -> u8 {
    match (job.confidence.is_authoritative(), job.description.is_empty()) {
        (true, false) => 2,
        (true, true) => 1,
        (false, _) => 0,
    }
}

/// Best first. Everything after `job_id` only orders members that agree on
/// the ranking keys; it covers every remaining field, so two members compare
/// equal only when they are identical.
fn priority(a: &CanonicalJob, b: &CanonicalJob) -> Ordering {
    tier(b)
        .cmp(&tier(a))
        .then_with(|| b.fetched_at.cmp(&a.fetched_at))
        .then_with(|| a.job_id.cmp(&b.job_id))
        .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        .then_with(|| a.url.cmp(&b.url))
        .then_with(|| a.confidence.cmp(&b.confidence))
        .then_with(|| a.location.cmp(&b.location))
        .then_with(|| a.employment_type.as_str().cmp(b.employment_type.as_str()))
        .then_with(|| a.publisher.cmp(&b.publisher))
        .then_with(|| a.description.cmp(&b.description))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.company.cmp(&b.company))
        .then_with(|| a.sources.cmp(&b.sources))
}

fn merge_group(mut members: Vec<CanonicalJob>) -> Option<CanonicalJob> {
    members.sort_by(priority);
    let mut members = members.into_iter();
    let mut survivor = members.next()?;
    let original_description = survivor.description.clone();

    for other in members {
        survivor.sources.extend(other.sources.iter().cloned());

        if survivor.description.is_empty() && !other.description.is_empty() {
            survivor.description = other.description.clone();
        }
        if survivor.url.is_empty() {
            survivor.url = other.url.clone();
        }
        if survivor.location.is_empty() {
            survivor.location = other.location.clone();
        }
        if survivor.publisher.is_none() {
            survivor.publisher = other.publisher.clone();
        }
        if survivor.employment_type == EmploymentType::Unknown {
            survivor.employment_type = other.employment_type;
        }
    }

    if survivor.description != original_description {
        survivor.refresh_fingerprint();
    }
    Some(survivor)
}
