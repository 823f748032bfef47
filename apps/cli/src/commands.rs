//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use careerscout_core::pipeline::{ProgressReporter, RunSummary, SourceReport};
use careerscout_core::{Capabilities, PipelineOptions, Ranking, RankingEngine, build_pipeline};
use careerscout_shared::{AppConfig, CareerScoutError, ResumeProfile, init_config, load_config};
use careerscout_storage::Storage;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// CareerScout: find and rank job postings for a resume profile.
#[derive(Parser)]
#[command(
    name = "careerscout",
    version,
    about = "Aggregate, deduplicate and rank job postings against a resume profile.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Job database path (defaults to <data_dir>/careerscout.db).
    #[arg(long, global = true, env = "CAREERSCOUT_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ingest fresh postings, then rank them for the profile.
    Run {
        #[command(flatten)]
        ingest: IngestArgs,

        /// Number of ranked jobs to print.
        #[arg(short, long)]
        top: Option<usize>,

        /// Print the ranking as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Fetch, normalize and merge postings into the job database.
    Ingest {
        #[command(flatten)]
        ingest: IngestArgs,
    },

    /// Rank the stored dataset against a resume profile.
    Rank {
        /// Resume profile JSON file.
        #[arg(short, long)]
        profile: PathBuf,

        /// Number of ranked jobs to print.
        #[arg(short, long)]
        top: Option<usize>,

        /// Print the ranking as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print one stored posting as JSON.
    Show {
        /// Job identifier, as printed by `rank`.
        job_id: String,
    },

    /// Show recent ingestion runs.
    Runs {
        /// Number of runs to list.
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Embedding cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct IngestArgs {
    /// Resume profile JSON file.
    #[arg(short, long)]
    profile: PathBuf,

    /// Extra company to crawl (repeatable).
    #[arg(long = "company")]
    companies: Vec<String>,

    /// Skip career-site crawling for this run.
    #[arg(long)]
    no_crawl: bool,
}

/// Embedding cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Drop vectors of jobs no longer in the dataset.
    Evict,
    /// Drop every cached vector.
    Reset,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "careerscout=info",
        1 => "careerscout=debug",
        _ => "careerscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Run { ingest, top, json } => cmd_run(db, &ingest, top, json).await,
        Command::Ingest { ingest } => cmd_ingest(db, &ingest).await,
        Command::Rank { profile, top, json } => cmd_rank(db, &profile, top, json).await,
        Command::Show { job_id } => cmd_show(db, &job_id).await,
        Command::Runs { limit } => cmd_runs(db, limit).await,
        Command::Cache { action } => match action {
            CacheAction::Evict => cmd_cache_evict(db).await,
            CacheAction::Reset => cmd_cache_reset(db).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn database_path(config: &AppConfig, db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(|| config.database_path())
}

fn load_profile(path: &Path) -> Result<ResumeProfile> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read profile '{}'", path.display()))?;
    serde_json::from_str(&raw).wrap_err_with(|| format!("invalid profile JSON in '{}'", path.display()))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(db: Option<PathBuf>, args: &IngestArgs, top: Option<usize>, json: bool) -> Result<()> {
    let config = load_config()?;
    let capabilities = Capabilities::from_config(&config)?;
    // Fail before spending API quota when ranking cannot happen.
    let embedder = capabilities.require_embedder(&config)?;

    let profile = load_profile(&args.profile)?;
    let storage = Arc::new(Storage::open(&database_path(&config, db)).await?);

    let summary = ingest(&config, &capabilities, &storage, &profile, args).await?;
    print_summary(&summary);

    let engine = RankingEngine::new(embedder, storage.clone(), config.defaults.concurrency as usize);
    let k = top.unwrap_or(config.defaults.top_k);
    let ranking = rank_dataset(&engine, &storage, &profile, k).await?;
    print_ranking(&storage, &ranking, json).await
}

async fn cmd_ingest(db: Option<PathBuf>, args: &IngestArgs) -> Result<()> {
    let config = load_config()?;
    let capabilities = Capabilities::from_config(&config)?;
    let profile = load_profile(&args.profile)?;
    let storage = Storage::open(&database_path(&config, db)).await?;

    let summary = ingest(&config, &capabilities, &storage, &profile, args).await?;
    print_summary(&summary);
    Ok(())
}

async fn ingest(
    config: &AppConfig,
    capabilities: &Capabilities,
    storage: &Storage,
    profile: &ResumeProfile,
    args: &IngestArgs,
) -> Result<RunSummary> {
    let options = PipelineOptions {
        extra_companies: args.companies.clone(),
        no_crawl: args.no_crawl,
    };
    let pipeline = build_pipeline(config, capabilities, &options)?;

    info!(profile = %args.profile.display(), crawl = !args.no_crawl, "starting ingestion");
    let reporter = CliProgress::new();
    Ok(pipeline.ingest(profile, storage, &reporter).await?)
}

async fn cmd_rank(db: Option<PathBuf>, profile: &Path, top: Option<usize>, json: bool) -> Result<()> {
    let config = load_config()?;
    let capabilities = Capabilities::from_config(&config)?;
    let embedder = capabilities.require_embedder(&config)?;

    let profile = load_profile(profile)?;
    let path = database_path(&config, db);
    if !path.exists() {
        return Err(CareerScoutError::NoDataAvailable(format!(
            "no dataset at {}; run `careerscout ingest` first",
            path.display()
        ))
        .into());
    }
    let storage = Arc::new(Storage::open(&path).await?);

    let engine = RankingEngine::new(embedder, storage.clone(), config.defaults.concurrency as usize);
    let k = top.unwrap_or(config.defaults.top_k);
    let ranking = rank_dataset(&engine, &storage, &profile, k).await?;
    print_ranking(&storage, &ranking, json).await
}

async fn rank_dataset(
    engine: &RankingEngine,
    storage: &Storage,
    profile: &ResumeProfile,
    k: usize,
) -> Result<Ranking> {
    let jobs = storage.list_jobs().await?;
    if jobs.is_empty() {
        return Err(CareerScoutError::NoDataAvailable(
            "the job dataset is empty; run `careerscout ingest` first".into(),
        )
        .into());
    }

    let spinner = spinner();
    spinner.set_message(format!("Ranking {} jobs", jobs.len()));
    let ranking = engine.rank(profile, &jobs, k).await;
    spinner.finish_and_clear();
    Ok(ranking?)
}

async fn cmd_show(db: Option<PathBuf>, job_id: &str) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&database_path(&config, db)).await?;
    let job = storage
        .get_job(job_id)
        .await?
        .ok_or_else(|| eyre!("no job with id '{job_id}' in the current dataset"))?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

async fn cmd_runs(db: Option<PathBuf>, limit: u32) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&database_path(&config, db)).await?;
    let runs = storage.list_runs(limit).await?;
    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    for run in runs {
        let summary: Option<RunSummary> = run
            .summary_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        match summary {
            Some(s) => println!(
                "{}  {}  merged={} dropped={} replaced={}",
                run.started_at.format("%Y-%m-%d %H:%M"),
                run.run_id,
                s.merged,
                s.dropped,
                s.dataset_replaced
            ),
            None => println!(
                "{}  {}  (unfinished)",
                run.started_at.format("%Y-%m-%d %H:%M"),
                run.run_id
            ),
        }
    }
    Ok(())
}

async fn cmd_cache_evict(db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open(&database_path(&config, db)).await?;
    let removed = storage.evict_orphaned_embeddings().await?;
    let kept = storage.count_embeddings().await?;
    println!("Evicted {removed} orphaned embedding(s); {kept} remain.");
    Ok(())
}

async fn cmd_cache_reset(db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open(&database_path(&config, db)).await?;
    let removed = storage.reset_embedding_cache().await?;
    println!("Embedding cache cleared ({removed} vector(s) removed).");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  Run {}", summary.run_id);
    for report in &summary.sources {
        match &report.error {
            None => println!("  {:<28} {:>5} records", report.source, report.records),
            Some(e) => println!("  {:<28} failed: {e}", report.source),
        }
    }
    println!("  Raw records: {}", summary.raw_records);
    println!("  Dropped:     {}", summary.dropped);
    println!("  Merged jobs: {}", summary.merged);
    if !summary.dataset_replaced {
        println!("  Every source failed; the previous dataset was kept.");
    }
    println!("  Time:        {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    println!();
}

async fn print_ranking(storage: &Storage, ranking: &Ranking, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&ranking.results)?);
        return Ok(());
    }

    let stats = ranking.stats;
    for (i, ranked) in ranking.results.iter().enumerate() {
        let Some(job) = storage.get_job(&ranked.job_id).await? else {
            continue;
        };
        let location = if job.location.is_empty() { "n/a" } else { job.location.as_str() };
        println!(
            "{:>3}. {:.3}  {} at {} ({location})",
            i + 1,
            ranked.score,
            job.title,
            job.company
        );
        println!("      {}", ranked.job_id);
    }
    println!();
    println!(
        "  cache: {} hit(s), {} computed, {} inconsistent, {} failed",
        stats.hits, stats.computed, stats.inconsistent, stats.failed
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self { spinner: spinner() }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn source_done(&self, report: &SourceReport, completed: usize, total: usize) {
        let status = match &report.error {
            None => format!("{} records", report.records),
            Some(_) => "failed".to_string(),
        };
        self.spinner
            .set_message(format!("Sources [{completed}/{total}] {}: {status}", report.source));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
