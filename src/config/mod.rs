//! Configuration management for repobin
//!
//! Configuration is read from a TOML file (default `~/.repobin/config.toml`).
//! Every field has a default, so a partial file (or none at all) is valid.
//!
//! Precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values
//!
//! Paths may start with `~`; they are expanded by the command handlers, not
//! here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, RepobinError, Result};
use crate::materialize::{NameFilter, Strategy, StrategySelector};
use crate::source::github::DEFAULT_API_URL;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Packing configuration
    #[serde(default)]
    pub plan: PlanConfig,

    /// Export configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Remote (SFTP) backend configuration
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Repository search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// URL list scan configuration
    #[serde(default)]
    pub scan: ScanConfig,

    /// Local-to-remote sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Packing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanConfig {
    /// Group capacity in bytes
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Item list to pack
    #[serde(default = "default_items_file")]
    pub input: PathBuf,

    /// Where the plan is written
    #[serde(default = "default_plan_file")]
    pub output: PathBuf,
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    /// Local output directory (local mode)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Plan to export
    #[serde(default = "default_plan_file")]
    pub plan_file: PathBuf,

    /// File name glob of the files to keep
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Items fetched at once within a group
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// SSH private key used for fetching
    #[serde(default = "default_identity")]
    pub identity: PathBuf,

    /// Strategy for grouped items
    #[serde(default = "default_grouped_strategy")]
    pub grouped_strategy: String,

    /// Strategy for remainder items
    #[serde(default = "default_remainder_strategy")]
    pub remainder_strategy: String,

    /// Object cache cap while fetching, in MiB
    #[serde(default = "default_fetch_cache_mb")]
    pub fetch_cache_mb: u64,

    /// Look up the default branch of items without a pinned revision
    #[serde(default = "default_true")]
    pub resolve_branches: bool,

    /// Fail an item when its pinned revision cannot be checked out
    #[serde(default)]
    pub strict_revisions: bool,

    /// Do not export the remainder
    #[serde(default)]
    pub skip_remainder: bool,

    /// Export only the remainder
    #[serde(default)]
    pub only_remainder: bool,
}

/// Remote backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    /// `host:port` of the SFTP server
    #[serde(default)]
    pub addr: Option<String>,

    #[serde(default = "default_remote_user")]
    pub user: String,

    /// Private key used to log in
    #[serde(default = "default_identity")]
    pub keyfile: PathBuf,

    #[serde(default)]
    pub passphrase: Option<String>,

    /// Root directory on the server
    #[serde(default = "default_remote_dir")]
    pub remote_dir: PathBuf,
}

/// Repository search configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_query")]
    pub query: String,

    /// Where found items are written
    #[serde(default = "default_items_file")]
    pub output: PathBuf,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Page size (1..=100)
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Requests allowed per two-second window
    #[serde(default = "default_burst")]
    pub burst: u32,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable holding the API token
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

/// URL list scan configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    #[serde(default = "default_scan_concurrency")]
    pub concurrency: usize,

    /// List of `<url> [revision]` lines
    #[serde(default = "default_scan_input")]
    pub input: PathBuf,

    #[serde(default = "default_items_file")]
    pub output: PathBuf,
}

/// Local-to-remote sync configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    #[serde(default = "default_sync_concurrency")]
    pub concurrency: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default)]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_capacity() -> u64 {
    1 << 30
}

fn default_items_file() -> PathBuf {
    PathBuf::from("repos.txt")
}

fn default_plan_file() -> PathBuf {
    PathBuf::from("plan.txt")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("export")
}

fn default_pattern() -> String {
    "*.py".to_string()
}

fn default_concurrency() -> usize {
    10
}

fn default_identity() -> PathBuf {
    PathBuf::from("~/.ssh/id_rsa")
}

fn default_grouped_strategy() -> String {
    Strategy::FetchThenFilterCopy.to_string()
}

fn default_remainder_strategy() -> String {
    Strategy::StreamToDisk.to_string()
}

fn default_fetch_cache_mb() -> u64 {
    crate::materialize::fetch::DEFAULT_CACHE_LIMIT_MB
}

fn default_true() -> bool {
    true
}

fn default_remote_user() -> String {
    "repobin".to_string()
}

fn default_remote_dir() -> PathBuf {
    PathBuf::from("repobin")
}

fn default_query() -> String {
    "language:python".to_string()
}

fn default_limit() -> u64 {
    1000
}

fn default_per_page() -> u32 {
    100
}

fn default_burst() -> u32 {
    10
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_scan_concurrency() -> usize {
    8
}

fn default_scan_input() -> PathBuf {
    PathBuf::from("urls.txt")
}

fn default_sync_concurrency() -> usize {
    4
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            input: default_items_file(),
            output: default_plan_file(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            plan_file: default_plan_file(),
            pattern: default_pattern(),
            concurrency: default_concurrency(),
            identity: default_identity(),
            grouped_strategy: default_grouped_strategy(),
            remainder_strategy: default_remainder_strategy(),
            fetch_cache_mb: default_fetch_cache_mb(),
            resolve_branches: true,
            strict_revisions: false,
            skip_remainder: false,
            only_remainder: false,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            addr: None,
            user: default_remote_user(),
            keyfile: default_identity(),
            passphrase: None,
            remote_dir: default_remote_dir(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            output: default_items_file(),
            limit: default_limit(),
            per_page: default_per_page(),
            burst: default_burst(),
            api_url: default_api_url(),
            token_env: default_token_env(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: default_scan_concurrency(),
            input: default_scan_input(),
            output: default_items_file(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_sync_concurrency(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: false,
        }
    }
}

impl Config {
    /// Default configuration file path below `home`
    pub fn default_path(home: &Path) -> PathBuf {
        home.join(".repobin").join("config.toml")
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Explicit file; it must exist
    /// * `fallback` - Default location; a missing file yields defaults
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>, fallback: Option<&Path>) -> Result<Self> {
        let path = match (path, fallback) {
            (Some(explicit), _) => {
                if !explicit.is_file() {
                    return Err(ConfigError::FileNotFound(explicit.display().to_string()).into());
                }
                explicit
            }
            (None, Some(default)) if default.is_file() => default,
            (None, _) => return Ok(Self::default()),
        };

        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RepobinError::Generic(e.to_string()))
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, the first offending field otherwise
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("export.concurrency", self.export.concurrency),
            ("scan.concurrency", self.scan.concurrency),
            ("sync.concurrency", self.sync.concurrency),
        ] {
            if value == 0 {
                return Err(invalid(field, value));
            }
        }

        if !(1..=100).contains(&self.search.per_page) {
            return Err(invalid("search.per_page", self.search.per_page));
        }
        if self.search.burst == 0 {
            return Err(invalid("search.burst", self.search.burst));
        }
        if self.export.fetch_cache_mb == 0 {
            return Err(invalid("export.fetch_cache_mb", self.export.fetch_cache_mb));
        }

        NameFilter::new(&self.export.pattern)
            .map_err(|_| invalid("export.pattern", &self.export.pattern))?;
        self.export.strategies()?;
        Ok(())
    }
}

impl ExportConfig {
    /// Parse the strategy policy
    pub fn strategies(&self) -> Result<StrategySelector> {
        let parse = |field: &str, value: &str| {
            value
                .parse::<Strategy>()
                .map_err(|_| invalid(field, value))
        };
        Ok(StrategySelector {
            grouped: parse("export.grouped_strategy", &self.grouped_strategy)?,
            remainder: parse("export.remainder_strategy", &self.remainder_strategy)?,
        })
    }
}

fn invalid(field: &str, value: impl ToString) -> RepobinError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
