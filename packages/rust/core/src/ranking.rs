//! Resume-to-job ranking by embedding cosine similarity, with a persistent
//! per-job vector cache keyed by content fingerprint.

use std::collections::HashMap;
use std::sync::Arc;

use careerscout_shared::{CanonicalJob, CareerScoutError, RankedJob, Result, ResumeProfile};
use careerscout_storage::Storage;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::embedding::Embedder;

/// Cache and embedding outcomes of one ranking pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RankStats {
    /// Vectors served from the cache.
    pub hits: usize,
    /// Vectors computed because the cache had none usable.
    pub computed: usize,
    /// Cache rows that could not be read back and were recomputed.
    pub inconsistent: usize,
    /// Jobs skipped because their embedding call failed.
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct Ranking {
    pub results: Vec<RankedJob>,
    pub stats: RankStats,
}

/// Serializes work per key; different keys proceed independently.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn lock(&self, key: String) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct RankingEngine {
    embedder: Arc<dyn Embedder>,
    storage: Arc<Storage>,
    concurrency: usize,
    locks: Arc<KeyedLocks>,
}

enum VectorOutcome {
    Hit(Vec<f32>),
    Computed { vector: Vec<f32>, inconsistent: bool },
    Failed,
}

struct Scored {
    job_id: String,
    fetched_at: DateTime<Utc>,
    outcome: VectorOutcome,
}

impl RankingEngine {
    pub fn new(embedder: Arc<dyn Embedder>, storage: Arc<Storage>, concurrency: usize) -> Self {
        Self {
            embedder,
            storage,
            concurrency: concurrency.max(1),
            locks: Arc::new(KeyedLocks::default()),
        }
    }

    /// Top `k` jobs for the profile, by score desc, then `fetched_at` desc,
    /// then `job_id` asc.
    ///
    /// Only a failure to embed the profile itself is an error; jobs whose
    /// embedding fails are skipped and counted.
    #[instrument(skip_all, fields(jobs = jobs.len(), k = k))]
    pub async fn rank(&self, profile: &ResumeProfile, jobs: &[CanonicalJob], k: usize) -> Result<Ranking> {
        let query_text = profile.query_text();
        if query_text.trim().is_empty() {
            return Err(CareerScoutError::validation(
                "resume profile has no skills, summary or experience",
            ));
        }

        let query = self
            .embedder
            .embed(&[query_text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CareerScoutError::parse("no vector returned for the profile"))?;

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for job in jobs {
            let semaphore = semaphore.clone();
            let embedder = self.embedder.clone();
            let storage = self.storage.clone();
            let locks = self.locks.clone();
            let job_id = job.job_id.clone();
            let fingerprint = job.fingerprint.clone();
            let fetched_at = job.fetched_at;
            let text = job.embedding_text();
            let dimension = query.len();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = job_vector(
                    embedder.as_ref(),
                    &storage,
                    &locks,
                    &job_id,
                    &fingerprint,
                    &text,
                    dimension,
                )
                .await;
                Scored {
                    job_id,
                    fetched_at,
                    outcome,
                }
            });
        }

        let mut stats = RankStats::default();
        let mut scored = Vec::with_capacity(jobs.len());
        while let Some(joined) = tasks.join_next().await {
            let Ok(result) = joined else {
                stats.failed += 1;
                continue;
            };
            let vector = match result.outcome {
                VectorOutcome::Hit(vector) => {
                    stats.hits += 1;
                    vector
                }
                VectorOutcome::Computed { vector, inconsistent } => {
                    stats.computed += 1;
                    if inconsistent {
                        stats.inconsistent += 1;
                    }
                    vector
                }
                VectorOutcome::Failed => {
                    stats.failed += 1;
                    continue;
                }
            };
            if vector.len() != query.len() {
                warn!(job_id = %result.job_id, "embedding dimension differs from the profile's");
                stats.failed += 1;
                continue;
            }
            scored.push((cosine_similarity(&query, &vector), result.fetched_at, result.job_id));
        }

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        scored.truncate(k);

        info!(
            hits = stats.hits,
            computed = stats.computed,
            inconsistent = stats.inconsistent,
            failed = stats.failed,
            "ranking complete"
        );

        Ok(Ranking {
            results: scored
                .into_iter()
                .map(|(score, _, job_id)| RankedJob { job_id, score })
                .collect(),
            stats,
        })
    }
}

/// Read-then-write-on-miss for one `(job_id, fingerprint)` under its lock.
async fn job_vector(
    embedder: &dyn Embedder,
    storage: &Storage,
    locks: &KeyedLocks,
    job_id: &str,
    fingerprint: &str,
    text: &str,
    dimension: usize,
) -> VectorOutcome {
    let _guard = locks.lock(format!("{job_id}\u{1f}{fingerprint}")).await;

    let mut inconsistent = false;
    match storage.get_embedding(job_id, fingerprint).await {
        Ok(Some(vector)) if vector.len() == dimension => return VectorOutcome::Hit(vector),
        Ok(Some(vector)) => {
            debug!(job_id, cached = vector.len(), dimension, "cached vector has another dimension");
        }
        Ok(None) => {}
        Err(CareerScoutError::CacheInconsistency { message, .. }) => {
            warn!(job_id, %message, "inconsistent cache entry, recomputing");
            inconsistent = true;
        }
        Err(e) => warn!(job_id, error = %e, "cache read failed, recomputing"),
    }

    let vector = match embedder.embed(&[text.to_string()]).await {
        Ok(mut vectors) if vectors.len() == 1 => vectors.remove(0),
        Ok(_) => {
            warn!(job_id, "embedder returned no vector");
            return VectorOutcome::Failed;
        }
        Err(e) => {
            warn!(job_id, error = %e, "embedding failed, skipping job");
            return VectorOutcome::Failed;
        }
    };

    if let Err(e) = storage
        .put_embedding(job_id, fingerprint, &vector, embedder.model())
        .await
    {
        warn!(job_id, error = %e, "could not cache embedding");
    }
    VectorOutcome::Computed {
        vector,
        inconsistent,
    }
}

/// Cosine similarity clamped to `[-1, 1]`; 0 when either vector is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}
