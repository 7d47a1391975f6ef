//! Application configuration for Greylit.
//!
//! User config lives at `~/.greylit/greylit.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file, only the names of the environment
//! variables that hold them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GreylitError, Result};
use crate::types::{DEFAULT_TARGET_COUNT, QuerySpec, TierSet};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "greylit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".greylit";

/// Airtable's documented per-base request limit.
pub const MAX_RECORD_WRITES_PER_SECOND: u32 = 5;

// ---------------------------------------------------------------------------
// Config structs (matching greylit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Search API settings.
    #[serde(default)]
    pub search: SearchSettings,

    /// Records store (Airtable) settings.
    #[serde(default)]
    pub records: RecordsSettings,

    /// CSV export settings.
    #[serde(default)]
    pub export: ExportSettings,
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Custom Search JSON API endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the shared search-engine id.
    #[serde(default = "default_engine_id_env")]
    pub engine_id_env: String,

    /// Names of the env vars holding the API keys, in rotation order.
    #[serde(default = "default_api_key_envs")]
    pub api_key_envs: Vec<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Unique results to aim for per website.
    #[serde(default = "default_target_count")]
    pub target_count: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            engine_id_env: default_engine_id_env(),
            api_key_envs: default_api_key_envs(),
            timeout_secs: default_timeout_secs(),
            target_count: default_target_count(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://www.googleapis.com/customsearch/v1".into()
}
fn default_engine_id_env() -> String {
    "GS1_CX".into()
}
fn default_api_key_envs() -> Vec<String> {
    vec!["GS1_KEY".into(), "GS2_KEY".into(), "GS3_KEY".into()]
}
fn default_timeout_secs() -> u64 {
    5
}
fn default_target_count() -> usize {
    DEFAULT_TARGET_COUNT
}

/// `[records]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsSettings {
    /// Airtable REST API root.
    #[serde(default = "default_records_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the personal access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Name of the env var holding the base id.
    #[serde(default = "default_base_id_env")]
    pub base_id_env: String,

    /// Target table.
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Request ceiling; values above 5 are capped.
    #[serde(default = "default_writes_per_second")]
    pub writes_per_second: u32,

    /// Look up each link before creating a record.
    #[serde(default = "default_true")]
    pub check_duplicates: bool,
}

impl Default for RecordsSettings {
    fn default() -> Self {
        Self {
            endpoint: default_records_endpoint(),
            token_env: default_token_env(),
            base_id_env: default_base_id_env(),
            table_name: default_table_name(),
            writes_per_second: default_writes_per_second(),
            check_duplicates: true,
        }
    }
}

fn default_records_endpoint() -> String {
    "https://api.airtable.com/v0".into()
}
fn default_token_env() -> String {
    "AIRTABLE_TOKEN".into()
}
fn default_base_id_env() -> String {
    "AIRTABLE_BASE_ID".into()
}
fn default_table_name() -> String {
    "raw_results".into()
}
fn default_writes_per_second() -> u32 {
    MAX_RECORD_WRITES_PER_SECOND
}
fn default_true() -> bool {
    true
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Directory CSV files are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Write one CSV per run instead of one per website.
    #[serde(default)]
    pub combined: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            combined: false,
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}

// ---------------------------------------------------------------------------
// Runtime configs (resolved from config + environment)
// ---------------------------------------------------------------------------

/// Ordered API keys sharing one search-engine id.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPool {
    engine_id: String,
    keys: Vec<String>,
}

impl CredentialPool {
    /// Build a pool, rejecting a blank engine id or an empty key list.
    pub fn new(engine_id: impl Into<String>, keys: Vec<String>) -> Result<Self> {
        let engine_id = engine_id.into();
        if engine_id.trim().is_empty() {
            return Err(GreylitError::config("search engine id is empty"));
        }
        if keys.is_empty() {
            return Err(GreylitError::config("no search API keys configured"));
        }
        if let Some(pos) = keys.iter().position(|k| k.trim().is_empty()) {
            return Err(GreylitError::config(format!(
                "search API key #{} is empty",
                pos + 1
            )));
        }
        Ok(Self { engine_id, keys })
    }

    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    pub fn key(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("engine_id", &self.engine_id)
            .field("keys", &format_args!("[{} redacted]", self.keys.len()))
            .finish()
    }
}

/// Runtime search client configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub credentials: CredentialPool,
    pub timeout: Duration,
}

impl SearchConfig {
    /// Resolve from the config file, reading secrets from the process environment.
    pub fn resolve(config: &AppConfig) -> Result<Self> {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` to read environment variables.
    pub fn resolve_with(
        config: &AppConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let settings = &config.search;

        let engine_id = required_env(&lookup, &settings.engine_id_env, "search engine id")?;

        let keys = settings
            .api_key_envs
            .iter()
            .map(|name| required_env(&lookup, name, "search API key"))
            .collect::<Result<Vec<_>>>()?;

        url::Url::parse(&settings.endpoint).map_err(|e| {
            GreylitError::config(format!("invalid search endpoint '{}': {e}", settings.endpoint))
        })?;

        if settings.timeout_secs == 0 {
            return Err(GreylitError::config("search timeout_secs must be at least 1"));
        }

        Ok(Self {
            endpoint: settings.endpoint.clone(),
            credentials: CredentialPool::new(engine_id, keys)?,
            timeout: Duration::from_secs(settings.timeout_secs),
        })
    }
}

/// Runtime records-store configuration.
#[derive(Clone)]
pub struct RecordsConfig {
    pub endpoint: String,
    pub token: String,
    pub base_id: String,
    pub table_name: String,
    pub writes_per_second: u32,
    pub check_duplicates: bool,
}

impl RecordsConfig {
    /// Resolve from the config file, reading secrets from the process environment.
    pub fn resolve(config: &AppConfig) -> Result<Self> {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` to read environment variables.
    pub fn resolve_with(
        config: &AppConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let settings = &config.records;

        let token = required_env(&lookup, &settings.token_env, "Airtable token")?;
        let base_id = required_env(&lookup, &settings.base_id_env, "Airtable base id")?;

        if settings.table_name.trim().is_empty() {
            return Err(GreylitError::config("records table_name is empty"));
        }
        if settings.writes_per_second == 0 {
            return Err(GreylitError::config("records writes_per_second must be at least 1"));
        }

        let writes_per_second = if settings.writes_per_second > MAX_RECORD_WRITES_PER_SECOND {
            tracing::warn!(
                configured = settings.writes_per_second,
                max = MAX_RECORD_WRITES_PER_SECOND,
                "records write rate capped"
            );
            MAX_RECORD_WRITES_PER_SECOND
        } else {
            settings.writes_per_second
        };

        Ok(Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            token,
            base_id,
            table_name: settings.table_name.clone(),
            writes_per_second,
            check_duplicates: settings.check_duplicates,
        })
    }
}

impl fmt::Debug for RecordsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordsConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"[redacted]")
            .field("base_id", &self.base_id)
            .field("table_name", &self.table_name)
            .field("writes_per_second", &self.writes_per_second)
            .field("check_duplicates", &self.check_duplicates)
            .finish()
    }
}

fn required_env(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    what: &str,
) -> Result<String> {
    match lookup(var_name) {
        Some(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(GreylitError::config(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))),
    }
}

// ---------------------------------------------------------------------------
// Search plans
// ---------------------------------------------------------------------------

/// A saved search: websites plus up to three query tiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPlan {
    /// Websites to search, one per entry.
    #[serde(default)]
    pub websites: Vec<String>,

    /// Overrides `[search].target_count` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_count: Option<usize>,

    /// Query tiers, each tagged with its priority.
    #[serde(default)]
    pub tiers: Vec<QuerySpec>,
}

impl SearchPlan {
    /// Arrange the plan's tiers into slots.
    pub fn tier_set(&self) -> Result<TierSet> {
        TierSet::from_specs(self.tiers.iter().cloned())
    }
}

/// Load a search plan from a TOML file.
pub fn load_plan(path: &Path) -> Result<SearchPlan> {
    let content = std::fs::read_to_string(path).map_err(|e| GreylitError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        GreylitError::config(format!("failed to parse plan {}: {e}", path.display()))
    })
}

/// Split a newline-separated website list, dropping blank lines.
pub fn parse_website_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.greylit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GreylitError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.greylit/greylit.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| GreylitError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| GreylitError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GreylitError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GreylitError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GreylitError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
