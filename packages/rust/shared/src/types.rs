//! Core domain types for CareerScout job aggregation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::text;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Confidence & employment type
// ---------------------------------------------------------------------------

/// How a record was obtained. API records come from job-search APIs,
/// `Structured` from machine-readable markup or ATS JSON, `Heuristic` from
/// page classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Api,
    Structured,
    Heuristic,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Structured => "structured",
            Self::Heuristic => "heuristic",
        }
    }

    /// Whether this tier is machine-readable (`api` or `structured`).
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Api | Self::Structured)
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "api" => Ok(Self::Api),
            "structured" => Ok(Self::Structured),
            "heuristic" => Ok(Self::Heuristic),
            other => Err(format!("unknown confidence tier: {other}")),
        }
    }
}

/// Controlled employment-type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Internship,
    Contract,
    #[default]
    Unknown,
}

impl EmploymentType {
    /// Map free text (`"FULLTIME"`, `"Full-time"`, `"contractor"`, ...) onto
    /// the vocabulary. Internship is checked before contract and part-time
    /// so that "part-time internship" stays an internship.
    pub fn from_text(raw: &str) -> Self {
        let folded: String = raw
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();

        if folded.is_empty() {
            Self::Unknown
        } else if folded.contains("intern") {
            Self::Internship
        } else if ["contract", "temporary", "freelance"]
            .iter()
            .any(|k| folded.contains(k))
        {
            Self::Contract
        } else if folded.contains("part") {
            Self::PartTime
        } else if folded.contains("full") || folded.contains("permanent") {
            Self::FullTime
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullTime => "full-time",
            Self::PartTime => "part-time",
            Self::Internship => "internship",
            Self::Contract => "contract",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EmploymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RawRecord
// ---------------------------------------------------------------------------

/// A source-shaped record as fetched. Only the normalizer reads `fields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source tag: `api:jsearch`, `api:adzuna`, `crawl:<domain>`.
    pub source: String,
    /// Untyped field bag, shaped like the upstream payload.
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// Extraction tier, set by the crawler. API records leave it unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    pub fetched_at: DateTime<Utc>,
}

impl RawRecord {
    pub fn new(source: impl Into<String>, fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            source: source.into(),
            fields,
            confidence: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

// ---------------------------------------------------------------------------
// CanonicalJob
// ---------------------------------------------------------------------------

/// The normalized, source-independent posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalJob {
    /// Stable across runs for the same posting.
    pub job_id: String,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub employment_type: EmploymentType,
    /// Plain text, markup stripped.
    #[serde(default)]
    pub description: String,
    /// Provenance: every source tag this posting was seen under.
    pub sources: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default)]
    pub url: String,
    pub confidence: Confidence,
    pub fetched_at: DateTime<Utc>,
    /// SHA-256 of title, company and description.
    pub fingerprint: String,
}

impl CanonicalJob {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.company, &self.title, &self.location)
    }

    /// Recompute `fingerprint` from the current content fields.
    pub fn refresh_fingerprint(&mut self) {
        self.fingerprint = text::content_fingerprint(&self.title, &self.company, &self.description);
    }

    /// Text fed to the embedder for this posting.
    pub fn embedding_text(&self) -> String {
        let mut text = format!("{}\n{}", self.title, self.company);
        if !self.description.is_empty() {
            text.push('\n');
            text.push_str(&self.description);
        }
        text
    }
}

/// Normalized `(company, title, location)`. Equal keys mean the same posting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub company: String,
    pub title: String,
    pub location: String,
}

impl DedupKey {
    pub fn new(company: &str, title: &str, location: &str) -> Self {
        Self {
            company: text::normalize_company(company),
            title: text::normalize_title(title),
            location: text::normalize_location(location),
        }
    }
}

// ---------------------------------------------------------------------------
// Profile & queries
// ---------------------------------------------------------------------------

/// Candidate profile produced by the resume extractor. Read-only input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeProfile {
    #[serde(default)]
    pub skills: BTreeSet<String>,
    #[serde(default)]
    pub experience_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_experience: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub job_search_queries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
}

impl ResumeProfile {
    /// Text fed to the embedder for the profile side of ranking.
    pub fn query_text(&self) -> String {
        let mut lines = Vec::new();
        if !self.skills.is_empty() {
            let skills: Vec<&str> = self.skills.iter().map(String::as_str).collect();
            lines.push(format!("Skills: {}", skills.join(", ")));
        }
        if !self.experience_summary.trim().is_empty() {
            lines.push(format!("Summary: {}", self.experience_summary.trim()));
        }
        if let Some(years) = self.years_experience {
            lines.push(format!("Years of experience: {years:.1}"));
        }
        lines.join("\n")
    }
}

/// Search terms and role keywords derived from a [`ResumeProfile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Strings sent to job-search APIs.
    pub terms: Vec<String>,
    /// Role/domain keywords for discovery and crawl heuristics.
    pub keywords: Vec<String>,
}

/// Skills used when building a fallback search term.
const QUERY_SKILL_COUNT: usize = 3;

impl SearchQuery {
    pub fn from_profile(profile: &ResumeProfile) -> Self {
        let mut terms: Vec<String> = profile
            .job_search_queries
            .iter()
            .map(|q| text::collapse_whitespace(q))
            .filter(|q| !q.is_empty())
            .collect();

        if terms.is_empty() {
            let skills: Vec<&str> = profile
                .skills
                .iter()
                .take(QUERY_SKILL_COUNT)
                .map(String::as_str)
                .collect();
            if !skills.is_empty() {
                terms.push(format!("{} developer", skills.join(" ")));
            } else {
                let summary: Vec<&str> = profile.experience_summary.split_whitespace().take(5).collect();
                if !summary.is_empty() {
                    terms.push(summary.join(" "));
                }
            }
        }

        let mut keywords: Vec<String> = profile.domains.iter().map(|d| d.to_lowercase()).collect();
        keywords.extend(profile.skills.iter().take(QUERY_SKILL_COUNT).map(|s| s.to_lowercase()));
        let mut seen = BTreeSet::new();
        keywords.retain(|k| seen.insert(k.clone()));

        Self { terms, keywords }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.keywords.is_empty()
    }

    /// Short keyword phrase for web searches.
    pub fn keyword_phrase(&self) -> String {
        if self.keywords.is_empty() {
            self.terms.first().cloned().unwrap_or_default()
        } else {
            self.keywords.join(" ")
        }
    }
}

// ---------------------------------------------------------------------------
// Company discovery & ranking outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizeClass {
    BigTech,
    MidSize,
    Startup,
}

/// A company surfaced by discovery, handed to the crawler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyCandidate {
    pub name: String,
    pub size_class: SizeClass,
    /// Evidence count across search hits.
    pub mentions: usize,
}

/// One ranking result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedJob {
    pub job_id: String,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn employment_type_keywords() {
        assert_eq!(EmploymentType::from_text("FULLTIME"), EmploymentType::FullTime);
        assert_eq!(EmploymentType::from_text("Full-time"), EmploymentType::FullTime);
        assert_eq!(EmploymentType::from_text("PART_TIME"), EmploymentType::PartTime);
        assert_eq!(EmploymentType::from_text("Contractor"), EmploymentType::Contract);
        assert_eq!(EmploymentType::from_text("temporary"), EmploymentType::Contract);
        assert_eq!(EmploymentType::from_text("Summer Intern"), EmploymentType::Internship);
        assert_eq!(
            EmploymentType::from_text("part-time internship"),
            EmploymentType::Internship
        );
        assert_eq!(EmploymentType::from_text(""), EmploymentType::Unknown);
        assert_eq!(EmploymentType::from_text("volunteer"), EmploymentType::Unknown);
    }

    #[test]
    fn employment_type_serde_is_kebab_case() {
        let json = serde_json::to_string(&EmploymentType::FullTime).expect("serialize");
        assert_eq!(json, "\"full-time\"");
        let parsed: EmploymentType = serde_json::from_str("\"part-time\"").expect("deserialize");
        assert_eq!(parsed, EmploymentType::PartTime);
    }

    #[test]
    fn dedup_key_matches_across_source_spellings() {
        let a = DedupKey::new("Acme", "Backend Engineer", "NYC");
        let b = DedupKey::new("acme", "backend engineer", "New York, NY");
        assert_eq!(a, b);

        let c = DedupKey::new("Acme, Inc.", "Backend Engineer", "new york city");
        assert_eq!(a, c);
    }

    #[test]
    fn profile_query_text_lines() {
        let profile = ResumeProfile {
            skills: ["rust".to_string(), "postgres".to_string()].into(),
            experience_summary: "Backend engineer.".into(),
            years_experience: Some(4.0),
            ..Default::default()
        };
        let text = profile.query_text();
        assert_eq!(
            text,
            "Skills: postgres, rust\nSummary: Backend engineer.\nYears of experience: 4.0"
        );
    }

    #[test]
    fn search_query_prefers_explicit_queries() {
        let profile = ResumeProfile {
            skills: ["go".to_string(), "kubernetes".to_string()].into(),
            job_search_queries: vec!["  platform   engineer ".into()],
            ..Default::default()
        };
        let query = SearchQuery::from_profile(&profile);
        assert_eq!(query.terms, vec!["platform engineer"]);
        assert_eq!(query.keywords, vec!["go", "kubernetes"]);
    }

    #[test]
    fn search_query_falls_back_to_skills() {
        let profile = ResumeProfile {
            skills: ["python".to_string(), "django".to_string()].into(),
            ..Default::default()
        };
        let query = SearchQuery::from_profile(&profile);
        assert_eq!(query.terms, vec!["django python developer"]);
    }

    #[test]
    fn canonical_job_serialization() {
        let mut job = CanonicalJob {
            job_id: "api:jsearch:abc".into(),
            title: "Backend Engineer".into(),
            company: "Acme".into(),
            location: "New York".into(),
            employment_type: EmploymentType::FullTime,
            description: "Build services.".into(),
            sources: ["api:jsearch".to_string()].into(),
            publisher: Some("LinkedIn".into()),
            url: "https://example.com/apply".into(),
            confidence: Confidence::Api,
            fetched_at: Utc::now(),
            fingerprint: String::new(),
        };
        job.refresh_fingerprint();
        assert_eq!(job.fingerprint.len(), 64);

        let json = serde_json::to_string(&job).expect("serialize");
        assert!(json.contains("\"employment_type\":\"full-time\""));
        assert!(json.contains("\"confidence\":\"api\""));
        let parsed: CanonicalJob = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, job);
    }
}
