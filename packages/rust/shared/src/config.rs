//! Application configuration for SheetGrader.
//!
//! User config lives at `~/.sheetgrader/sheetgrader.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SheetGraderError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sheetgrader.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sheetgrader";

// ---------------------------------------------------------------------------
// Config structs (matching sheetgrader.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Exchange-rate lookup settings.
    #[serde(default)]
    pub rates: RatesConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for per-course workspaces.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,

    /// Worker pool size for per-student phases.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Maximum age (in days, inclusive) a submitted date may have.
    #[serde(default = "default_date_window_days")]
    pub date_window_days: i64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            concurrency: default_concurrency(),
            date_window_days: default_date_window_days(),
        }
    }
}

fn default_workspace_dir() -> String {
    "~/SheetGrader".into()
}
fn default_concurrency() -> u32 {
    4
}
fn default_date_window_days() -> i64 {
    21
}

/// `[rates]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesConfig {
    /// Endpoint returning the current USD exchange-rate table.
    #[serde(default = "default_rates_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_rates_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum fetch attempts before giving up.
    #[serde(default = "default_rates_max_retries")]
    pub max_retries: u32,

    /// Base delay in ms for exponential backoff between attempts.
    #[serde(default = "default_rates_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            base_url: default_rates_base_url(),
            timeout_secs: default_rates_timeout_secs(),
            max_retries: default_rates_max_retries(),
            backoff_base_ms: default_rates_backoff_base_ms(),
        }
    }
}

fn default_rates_base_url() -> String {
    "https://open.er-api.com/v6/latest/USD".into()
}
fn default_rates_timeout_secs() -> u64 {
    10
}
fn default_rates_max_retries() -> u32 {
    3
}
fn default_rates_backoff_base_ms() -> u64 {
    250
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime run configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root directory for per-course workspaces (tilde expanded).
    pub workspace_dir: PathBuf,
    /// Worker pool size for per-student phases.
    pub concurrency: u32,
    /// Maximum accepted date age in days (inclusive).
    pub date_window_days: i64,
    /// Lookup client settings.
    pub rates: RatesConfig,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workspace_dir: expand_tilde(&config.defaults.workspace_dir),
            concurrency: config.defaults.concurrency.max(1),
            date_window_days: config.defaults.date_window_days,
            rates: config.rates.clone(),
        }
    }
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sheetgrader/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SheetGraderError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sheetgrader/sheetgrader.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| SheetGraderError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SheetGraderError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SheetGraderError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SheetGraderError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SheetGraderError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
