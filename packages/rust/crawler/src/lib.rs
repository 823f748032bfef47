//! Career-site crawler.
//!
//! This crate provides:
//! - [`engine`]: per-company crawl (entry resolution, bounded BFS, page budget)
//! - [`ats`]: Greenhouse/Lever board detection and JSON mapping
//! - [`structured`]: schema.org `JobPosting` JSON-LD extraction
//! - [`heuristic`]: job-link selection, detail-page classification, and the
//!   [`StructuredExtractor`] refinement capability
//! - [`politeness`]: per-domain interval, robots.txt, and circuit breaker
//! - [`fields`]: field names of the crawl record bag

pub mod ats;
pub mod engine;
mod entry;
pub mod fields;
pub mod heuristic;
pub mod politeness;
pub mod structured;

pub use ats::{AtsBoard, AtsEndpoints, AtsKind};
pub use engine::{CareerCrawler, CompanyCrawl, source_tag};
pub use heuristic::{ExtractedFields, StructuredExtractor};
pub use politeness::{Admission, DomainGate, RobotsRules};
