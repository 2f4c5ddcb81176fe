//! Application configuration for Buildtrace.
//!
//! User config lives at `~/.buildtrace/buildtrace.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BuildtraceError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "buildtrace.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".buildtrace";

// ---------------------------------------------------------------------------
// Config structs (matching buildtrace.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Crawl behavior.
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// TeamCity endpoint settings.
    #[serde(default)]
    pub teamcity: TeamCityConfig,

    /// Storage backend selection.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Owner of the service, e.g. the team running it.
    #[serde(default = "default_owner")]
    pub owner: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            crawler: CrawlerConfig::default(),
            teamcity: TeamCityConfig::default(),
            storage: StorageConfig::default(),
            owner: default_owner(),
        }
    }
}

fn default_owner() -> String {
    std::env::var("USER").unwrap_or_default()
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_address")]
    pub address: String,

    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    7654
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

/// `[crawler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Which CI system to crawl: "jenkins" or "teamcity".
    #[serde(default = "default_flavor")]
    pub flavor: String,

    /// Two-group capture pattern splitting Jenkins console markup into
    /// (timestamp, line).
    #[serde(default = "default_jenkins_log_pattern")]
    pub jenkins_log_pattern: String,

    /// Two-group capture pattern for TeamCity build logs.
    #[serde(default = "default_teamcity_log_pattern")]
    pub teamcity_log_pattern: String,

    /// Seconds to wait before re-polling a build that is still running.
    #[serde(default = "default_poll_delay_secs")]
    pub poll_delay_secs: u64,

    /// Maximum polling cycles before a stuck build is abandoned.
    /// 0 means poll until a terminal status is observed.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            flavor: default_flavor(),
            jenkins_log_pattern: default_jenkins_log_pattern(),
            teamcity_log_pattern: default_teamcity_log_pattern(),
            poll_delay_secs: default_poll_delay_secs(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

fn default_flavor() -> String {
    "jenkins".into()
}
fn default_jenkins_log_pattern() -> String {
    // The timestamper plugin hides the machine-readable timestamp in a
    // display:none span ahead of the line text.
    r#"<span style="display: none">\[([^\]]*)\]</span> ?(.*)"#.into()
}
fn default_teamcity_log_pattern() -> String {
    r"^\[([^\]]+)\]\s*(.*)$".into()
}
fn default_poll_delay_secs() -> u64 {
    5
}
fn default_max_poll_attempts() -> u32 {
    720
}

/// `[teamcity]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamCityConfig {
    /// Base URL of the TeamCity server's REST API.
    #[serde(default = "default_teamcity_base_url")]
    pub base_url: String,

    /// Name of the env var holding the access token (never store the token
    /// itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for TeamCityConfig {
    fn default() -> Self {
        Self {
            base_url: default_teamcity_base_url(),
            token_env: default_token_env(),
        }
    }
}

fn default_teamcity_base_url() -> String {
    "https://teamcity.local:8080".into()
}
fn default_token_env() -> String {
    "BUILDTRACE_TC_TOKEN".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend: "sql", "file", or "memory".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database file path (sql backend).
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Record folder (file backend).
    #[serde(default = "default_folder")]
    pub folder: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            db_path: default_db_path(),
            folder: default_folder(),
        }
    }
}

fn default_backend() -> String {
    "file".into()
}
fn default_db_path() -> String {
    "buildtrace.db".into()
}
fn default_folder() -> String {
    ".".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.buildtrace/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BuildtraceError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.buildtrace/buildtrace.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| BuildtraceError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        BuildtraceError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BuildtraceError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BuildtraceError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BuildtraceError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the TeamCity access token from the env var named in the config.
pub fn teamcity_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.teamcity.token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(BuildtraceError::config(format!(
            "TeamCity access token not found. Set the {var_name} environment variable."
        ))),
    }
}
