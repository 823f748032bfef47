//! Shared types, error model, and configuration for CareerScout.
//!
//! This crate is the foundation depended on by all other CareerScout crates.
//! It provides:
//! - [`CareerScoutError`]: the unified error type
//! - Domain types ([`RawRecord`], [`CanonicalJob`], [`DedupKey`], [`ResumeProfile`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)
//! - Text normalization helpers ([`text`])

pub mod config;
pub mod error;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AdzunaConfig, AppConfig, CrawlConfig, CrawlPoliciesConfig, DefaultsConfig, EmbeddingConfig,
    ExtractionConfig, JSearchConfig, SearchConfig, SourcesConfig, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from, require_secret,
};
pub use error::{CareerScoutError, Result};
pub use types::{
    CanonicalJob, CompanyCandidate, Confidence, DedupKey, EmploymentType, RankedJob, RawRecord,
    ResumeProfile, RunId, SearchQuery, SizeClass,
};
