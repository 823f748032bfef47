//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding the current
//! canonical dataset, the embedding cache, and the run history.
//!
//! **Access rules:**
//! - `ingest`/`run` and cache maintenance: read-write via [`Storage::open`]
//! - `rank`/`show`: read-only via [`Storage::open_readonly`] is enough unless
//!   embeddings need to be written

mod migrations;

use std::collections::BTreeSet;
use std::path::Path;

use careerscout_shared::{CanonicalJob, CareerScoutError, Confidence, EmploymentType, Result, RunId};
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn db_err(e: libsql::Error) -> CareerScoutError {
    CareerScoutError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CareerScoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path`; every write is rejected.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CareerScoutError::NoDataAvailable(format!(
                "no dataset at {}; run `careerscout ingest` first",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    CareerScoutError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CareerScoutError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Dataset
    // -----------------------------------------------------------------------

    /// Replace the whole dataset with `jobs`, preserving their order.
    ///
    /// Runs in one transaction: readers see either the old or the new
    /// dataset, never a mix.
    pub async fn replace_dataset(&self, jobs: &[CanonicalJob], run_id: &RunId) -> Result<()> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(db_err)?;

        let written: Result<()> = async {
            tx.execute("DELETE FROM jobs", params![]).await.map_err(db_err)?;
            for (position, job) in jobs.iter().enumerate() {
                insert_job(&tx, job, position as i64, &run_id.to_string()).await?;
            }
            Ok(())
        }
        .await;

        match written {
            Ok(()) => {
                tx.commit().await.map_err(db_err)?;
                info!(jobs = jobs.len(), run_id = %run_id, "dataset replaced");
                Ok(())
            }
            Err(e) => {
                tx.rollback().await.map_err(db_err)?;
                Err(e)
            }
        }
    }

    /// The current dataset in stored order.
    pub async fn list_jobs(&self) -> Result<Vec<CanonicalJob>> {
        let mut rows = self
            .conn
            .query(&format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY position"), params![])
            .await
            .map_err(db_err)?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<CanonicalJob>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?1"),
                params![job_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_job(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn count_jobs(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM jobs").await
    }

    // -----------------------------------------------------------------------
    // Embedding cache
    // -----------------------------------------------------------------------

    /// Cached vector for `(job_id, fingerprint)`.
    ///
    /// A row whose vector cannot be decoded, or whose length disagrees with
    /// its recorded dimension, is reported as
    /// [`CareerScoutError::CacheInconsistency`].
    pub async fn get_embedding(&self, job_id: &str, fingerprint: &str) -> Result<Option<Vec<f32>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT dimension, vector_json FROM embedding_cache
                 WHERE job_id = ?1 AND fingerprint = ?2",
                params![job_id, fingerprint],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = rows.next().await.map_err(db_err)? else {
            return Ok(None);
        };

        let dimension: i64 = row.get(0).map_err(db_err)?;
        let raw: String = row.get(1).map_err(db_err)?;
        let vector: Vec<f32> =
            serde_json::from_str(&raw).map_err(|e| CareerScoutError::CacheInconsistency {
                job_id: job_id.to_string(),
                message: format!("undecodable vector: {e}"),
            })?;

        if vector.len() as i64 != dimension {
            return Err(CareerScoutError::CacheInconsistency {
                job_id: job_id.to_string(),
                message: format!("stored {} values, recorded dimension {dimension}", vector.len()),
            });
        }
        Ok(Some(vector))
    }

    /// Store a vector for `(job_id, fingerprint)` and drop vectors cached
    /// under any other fingerprint of the same job.
    pub async fn put_embedding(
        &self,
        job_id: &str,
        fingerprint: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let vector_json = serde_json::to_string(vector)
            .map_err(|e| CareerScoutError::Storage(format!("encode vector: {e}")))?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO embedding_cache (job_id, fingerprint, dimension, vector_json, model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(job_id, fingerprint) DO UPDATE SET
                   dimension = excluded.dimension,
                   vector_json = excluded.vector_json,
                   model = excluded.model,
                   created_at = excluded.created_at",
                params![job_id, fingerprint, vector.len() as i64, vector_json, model, now],
            )
            .await
            .map_err(db_err)?;

        let stale = self
            .conn
            .execute(
                "DELETE FROM embedding_cache WHERE job_id = ?1 AND fingerprint != ?2",
                params![job_id, fingerprint],
            )
            .await
            .map_err(db_err)?;
        if stale > 0 {
            debug!(job_id, stale, "replaced stale embeddings");
        }
        Ok(())
    }

    /// Delete cached vectors whose job is no longer in the dataset.
    /// Returns the number of rows removed.
    pub async fn evict_orphaned_embeddings(&self) -> Result<u64> {
        self.check_writable()?;
        let removed = self
            .conn
            .execute(
                "DELETE FROM embedding_cache WHERE job_id NOT IN (SELECT job_id FROM jobs)",
                params![],
            )
            .await
            .map_err(db_err)?;
        info!(removed, "evicted orphaned embeddings");
        Ok(removed)
    }

    /// Delete every cached vector.
    pub async fn reset_embedding_cache(&self) -> Result<u64> {
        self.check_writable()?;
        let removed = self
            .conn
            .execute("DELETE FROM embedding_cache", params![])
            .await
            .map_err(db_err)?;
        info!(removed, "embedding cache reset");
        Ok(removed)
    }

    pub async fn count_embeddings(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM embedding_cache").await
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    pub async fn insert_run(&self, run_id: &RunId, started_at: DateTime<Utc>) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO runs (run_id, started_at) VALUES (?1, ?2)",
                params![run_id.to_string(), started_at.to_rfc3339()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Mark a run finished and attach its JSON summary.
    pub async fn finish_run(&self, run_id: &RunId, summary_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, summary_json = ?2 WHERE run_id = ?3",
                params![now, summary_json, run_id.to_string()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT run_id, started_at, finished_at, summary_json
                 FROM runs ORDER BY started_at DESC, run_id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(db_err)?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            runs.push(RunRecord {
                run_id: row.get::<String>(0).map_err(db_err)?,
                started_at: parse_time(&row.get::<String>(1).map_err(db_err)?)?,
                finished_at: match row.get::<String>(2).ok() {
                    Some(s) => Some(parse_time(&s)?),
                    None => None,
                },
                summary_json: row.get::<String>(3).ok(),
            });
        }
        Ok(runs)
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)?.max(0) as u64),
            None => Ok(0),
        }
    }
}

/// A row of the run history.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Serialized run summary; absent while the run is in flight.
    pub summary_json: Option<String>,
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const JOB_COLUMNS: &str = "job_id, title, company, location, employment_type, description, \
                           sources_json, publisher, url, confidence, fetched_at, fingerprint";

async fn insert_job(conn: &Connection, job: &CanonicalJob, position: i64, run_id: &str) -> Result<()> {
    let sources_json = serde_json::to_string(&job.sources)
        .map_err(|e| CareerScoutError::Storage(format!("encode sources: {e}")))?;

    conn.execute(
        "INSERT INTO jobs (job_id, position, title, company, location, employment_type, description,
                           sources_json, publisher, url, confidence, fetched_at, fingerprint, run_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            job.job_id.as_str(),
            position,
            job.title.as_str(),
            job.company.as_str(),
            job.location.as_str(),
            job.employment_type.as_str(),
            job.description.as_str(),
            sources_json,
            job.publisher.as_deref(),
            job.url.as_str(),
            job.confidence.as_str(),
            job.fetched_at.to_rfc3339(),
            job.fingerprint.as_str(),
            run_id,
        ],
    )
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Convert a row selected with [`JOB_COLUMNS`] to a [`CanonicalJob`].
fn row_to_job(row: &libsql::Row) -> Result<CanonicalJob> {
    let sources_json: String = row.get(6).map_err(db_err)?;
    let sources: BTreeSet<String> = serde_json::from_str(&sources_json)
        .map_err(|e| CareerScoutError::Storage(format!("invalid sources: {e}")))?;

    let confidence: String = row.get(9).map_err(db_err)?;
    let confidence: Confidence = confidence.parse().map_err(CareerScoutError::Storage)?;

    Ok(CanonicalJob {
        job_id: row.get::<String>(0).map_err(db_err)?,
        title: row.get::<String>(1).map_err(db_err)?,
        company: row.get::<String>(2).map_err(db_err)?,
        location: row.get::<String>(3).map_err(db_err)?,
        employment_type: EmploymentType::from_text(&row.get::<String>(4).map_err(db_err)?),
        description: row.get::<String>(5).map_err(db_err)?,
        sources,
        publisher: row.get::<String>(7).ok(),
        url: row.get::<String>(8).map_err(db_err)?,
        confidence,
        fetched_at: parse_time(&row.get::<String>(10).map_err(db_err)?)?,
        fingerprint: row.get::<String>(11).map_err(db_err)?,
    })
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CareerScoutError::Storage(format!("invalid date: {e}")))
}
