//! SQL migration definitions for the CareerScout database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: jobs, embedding_cache, runs",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Current canonical dataset, replaced wholesale per successful run
CREATE TABLE IF NOT EXISTS jobs (
    job_id          TEXT PRIMARY KEY,
    position        INTEGER NOT NULL,
    title           TEXT NOT NULL,
    company         TEXT NOT NULL,
    location        TEXT NOT NULL DEFAULT '',
    employment_type TEXT NOT NULL,
    description     TEXT NOT NULL DEFAULT '',
    sources_json    TEXT NOT NULL,
    publisher       TEXT,
    url             TEXT NOT NULL DEFAULT '',
    confidence      TEXT NOT NULL,
    fetched_at      TEXT NOT NULL,
    fingerprint     TEXT NOT NULL,
    run_id          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_position ON jobs(position);

CREATE TABLE IF NOT EXISTS embedding_cache (
    job_id      TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    dimension   INTEGER NOT NULL,
    vector_json TEXT NOT NULL,
    model       TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (job_id, fingerprint)
);

CREATE TABLE IF NOT EXISTS runs (
    run_id       TEXT PRIMARY KEY,
    started_at   TEXT NOT NULL,
    finished_at  TEXT,
    summary_json TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Index embedding cache by job for orphan eviction",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_embedding_cache_job ON embedding_cache(job_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
