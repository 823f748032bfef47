//! Application configuration for CareerScout.
//!
//! User config lives at `~/.careerscout/careerscout.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file: each capability names the
//! environment variable that holds its key.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CareerScoutError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "careerscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".careerscout";

/// Job database file name inside `defaults.data_dir`.
const DATABASE_FILE_NAME: &str = "careerscout.db";

// ---------------------------------------------------------------------------
// Config structs (matching careerscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Job-search API adapters.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Web search capability (company discovery, careers URL lookup).
    #[serde(default)]
    pub search: SearchConfig,

    /// Embedding capability.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Structured-extraction capability (refines heuristic crawl pages).
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Career-site crawler.
    #[serde(default)]
    pub crawl: CrawlPoliciesConfig,
}

impl AppConfig {
    /// Location of the job database.
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.defaults.data_dir).join(DATABASE_FILE_NAME)
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory holding the job database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Number of ranked jobs returned by default.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Worker pool size for adapters, crawls and embedding calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Timeout for job-search API and web-search requests.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            top_k: default_top_k(),
            concurrency: default_concurrency(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_data_dir() -> String {
    "~/.careerscout/data".into()
}
fn default_top_k() -> usize {
    10
}
fn default_concurrency() -> u32 {
    4
}

/// `[sources]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub jsearch: JSearchConfig,

    #[serde(default)]
    pub adzuna: AdzunaConfig,
}

/// `[sources.jsearch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Name of the env var holding the API key.
    #[serde(default = "default_jsearch_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_jsearch_base_url")]
    pub base_url: String,

    /// Country code passed to the search endpoint.
    #[serde(default = "default_country")]
    pub country: String,

    /// Posting age filter (`all`, `today`, `3days`, `week`, `month`).
    #[serde(default = "default_date_posted")]
    pub date_posted: String,

    /// Pages fetched per search term.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Hard cap on records returned per run.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Minimum milliseconds between two calls to this API.
    #[serde(default = "default_api_interval")]
    pub min_interval_ms: u64,
}

impl Default for JSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: default_jsearch_key_env(),
            base_url: default_jsearch_base_url(),
            country: default_country(),
            date_posted: default_date_posted(),
            max_pages: default_max_pages(),
            max_results: default_max_results(),
            min_interval_ms: default_api_interval(),
        }
    }
}

fn default_jsearch_key_env() -> String {
    "JSEARCH_API_KEY".into()
}
fn default_jsearch_base_url() -> String {
    "https://api.openwebninja.com/jsearch".into()
}
fn default_country() -> String {
    "us".into()
}
fn default_date_posted() -> String {
    "month".into()
}
fn default_max_pages() -> u32 {
    1
}
fn default_max_results() -> usize {
    100
}
fn default_api_interval() -> u64 {
    500
}

/// `[sources.adzuna]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdzunaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_adzuna_id_env")]
    pub app_id_env: String,

    #[serde(default = "default_adzuna_key_env")]
    pub app_key_env: String,

    #[serde(default = "default_adzuna_base_url")]
    pub base_url: String,

    #[serde(default = "default_country")]
    pub country: String,

    #[serde(default = "default_results_per_page")]
    pub results_per_page: u32,

    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_api_interval")]
    pub min_interval_ms: u64,
}

impl Default for AdzunaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            app_id_env: default_adzuna_id_env(),
            app_key_env: default_adzuna_key_env(),
            base_url: default_adzuna_base_url(),
            country: default_country(),
            results_per_page: default_results_per_page(),
            max_pages: default_max_pages(),
            max_results: default_max_results(),
            min_interval_ms: default_api_interval(),
        }
    }
}

fn default_adzuna_id_env() -> String {
    "ADZUNA_APP_ID".into()
}
fn default_adzuna_key_env() -> String {
    "ADZUNA_APP_KEY".into()
}
fn default_adzuna_base_url() -> String {
    "https://api.adzuna.com".into()
}
fn default_results_per_page() -> u32 {
    20
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_serper_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_serper_base_url")]
    pub base_url: String,

    /// Results requested per search call.
    #[serde(default = "default_search_results")]
    pub results_per_query: u32,

    /// Companies handed to the crawler from discovery.
    #[serde(default = "default_max_companies")]
    pub max_companies: usize,

    #[serde(default = "default_api_interval")]
    pub min_interval_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_serper_key_env(),
            base_url: default_serper_base_url(),
            results_per_query: default_search_results(),
            max_companies: default_max_companies(),
            min_interval_ms: default_api_interval(),
        }
    }
}

fn default_serper_key_env() -> String {
    "SERPER_API_KEY".into()
}
fn default_serper_base_url() -> String {
    "https://google.serper.dev".into()
}
fn default_search_results() -> u32 {
    10
}
fn default_max_companies() -> usize {
    8
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible base URL (the `/embeddings` path is appended).
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Optional output dimension override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_key_env(),
            base_url: default_openai_base_url(),
            model: default_embedding_model(),
            dimensions: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> usize {
    3
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Opt-in: heuristic crawl pages are only refined when enabled.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_extraction_model")]
    pub model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key_env: default_openai_key_env(),
            base_url: default_openai_base_url(),
            model: default_extraction_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_extraction_model() -> String {
    "gpt-4.1-mini".into()
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlPoliciesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Companies always crawled, in addition to discovered ones.
    #[serde(default)]
    pub companies: Vec<String>,

    /// Maximum link depth from an entry page.
    #[serde(default = "default_crawl_depth")]
    pub depth: u32,

    /// Total page fetches allowed per company per run.
    #[serde(default = "default_max_pages_per_company")]
    pub max_pages_per_company: usize,

    /// Minimum ms between requests to the same domain.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Failed fetches after which a domain is skipped for the run.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Whether to respect robots.txt.
    #[serde(default = "default_true")]
    pub respect_robots_txt: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Careers URLs taken from web search per company.
    #[serde(default = "default_entry_urls")]
    pub max_entry_urls: usize,
}

impl Default for CrawlPoliciesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            companies: Vec::new(),
            depth: default_crawl_depth(),
            max_pages_per_company: default_max_pages_per_company(),
            rate_limit_ms: default_rate_limit(),
            failure_threshold: default_failure_threshold(),
            respect_robots_txt: true,
            timeout_secs: default_timeout_secs(),
            max_entry_urls: default_entry_urls(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_crawl_depth() -> u32 {
    2
}
fn default_max_pages_per_company() -> usize {
    15
}
fn default_rate_limit() -> u64 {
    1_000
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_entry_urls() -> usize {
    2
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, derived from AppConfig)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration, derived from the config file.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum link depth from an entry page.
    pub depth: u32,
    /// Page fetches allowed per company.
    pub max_pages_per_company: usize,
    /// Minimum ms between requests to the same domain.
    pub rate_limit_ms: u64,
    /// Failures before a domain is short-circuited.
    pub failure_threshold: u32,
    /// Whether to respect robots.txt.
    pub respect_robots_txt: bool,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Careers URLs taken from web search per company.
    pub max_entry_urls: usize,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            depth: config.crawl.depth,
            max_pages_per_company: config.crawl.max_pages_per_company,
            rate_limit_ms: config.crawl.rate_limit_ms,
            failure_threshold: config.crawl.failure_threshold,
            respect_robots_txt: config.crawl.respect_robots_txt,
            timeout_secs: config.crawl.timeout_secs,
            max_entry_urls: config.crawl.max_entry_urls,
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.careerscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CareerScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.careerscout/careerscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CareerScoutError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        CareerScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CareerScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CareerScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CareerScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` in a configured path.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Read a secret from the named environment variable.
///
/// Unset and empty values both yield [`CareerScoutError::ConfigurationMissing`].
pub fn require_secret(capability: &str, var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(CareerScoutError::configuration_missing(capability, var_name)),
    }
}
