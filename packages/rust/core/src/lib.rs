//! Core pipeline orchestration and domain logic for CareerScout.
//!
//! This crate ties together the job-search adapters, company discovery and
//! the career-site crawler into an ingestion run (normalize, merge, persist),
//! and ranks the stored dataset against a resume profile.

pub mod dedup;
pub mod embedding;
pub mod extraction;
pub mod normalizer;
pub mod pipeline;
pub mod ranking;
pub mod setup;

pub use embedding::{Embedder, OpenAiEmbedder};
pub use pipeline::{Pipeline, ProgressReporter, RunSummary, SilentProgress, SourceReport};
pub use ranking::{RankStats, Ranking, RankingEngine, cosine_similarity};
pub use setup::{Capabilities, PipelineOptions, build_pipeline};
