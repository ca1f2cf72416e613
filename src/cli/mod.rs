//! Command-line interface for repobin
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and merging with flags
//! - Dispatching subcommands to their executors

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::SftpConfig;
use crate::config::{Config, LogLevel};
use crate::error::{ConfigError, Result};
use crate::executor::{
    self, CancelSignal, ExportOptions, ExportRequest, ExportTarget, ScanOptions, SearchOptions,
    SyncOptions,
};
use crate::plan::read_items_from_file;
use crate::source::{GitHubSource, ItemSource, RateLimiter};
use crate::utils::convert::parse_bytes;
use crate::utils::fs::expand_path;

pub mod completion;

/// Window in which `search.burst` API requests are allowed
const RATE_WINDOW: Duration = Duration::from_secs(2);

/// Revision lookups in flight during a search
const SEARCH_LOOKUPS: usize = 4;

/// Pack remote repositories into capacity-bounded groups and export them
#[derive(Parser, Debug)]
#[command(
    name = "repobin",
    version,
    about = "Pack remote repositories into capacity-bounded groups and export them",
    long_about = "Search for repositories, pack them into groups that fit a storage budget,
and export the matching files of every repository to a local directory or an SFTP server."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only, no progress bar)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Disable the progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search repositories and write a search file
    Search {
        /// Search query
        #[arg(long)]
        query: Option<String>,

        /// Output search file
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,

        /// Maximum number of repositories
        #[arg(long)]
        limit: Option<u64>,

        /// API requests per two seconds
        #[arg(long)]
        burst: Option<u32>,
    },

    /// Pack a search file into a plan
    Plan {
        /// Input search file
        #[arg(short = 'i', long = "in", value_name = "FILE")]
        input: Option<PathBuf>,

        /// Output plan file
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,

        /// Group capacity (bytes, or with a KB/MB/GB/TB suffix)
        #[arg(long, value_parser = parse_capacity)]
        capacity: Option<u64>,
    },

    /// Export a plan
    Export(ExportArgs),

    /// Resolve a list of repository URLs into a search file
    Scan {
        /// Input list of `<url> [revision]` lines
        #[arg(short = 'i', long = "in", value_name = "FILE")]
        input: Option<PathBuf>,

        /// Output search file
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,

        /// Lookups in flight
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Upload a local export to the SFTP server
    Sync {
        /// Search file listing the items
        #[arg(long = "search", value_name = "FILE")]
        search: Option<PathBuf>,

        /// Local export directory
        #[arg(long = "local", value_name = "DIR")]
        local: Option<PathBuf>,

        /// Uploads in flight
        #[arg(long)]
        concurrency: Option<usize>,

        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Generate shell completion script
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },

    /// Show version information
    Version,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Plan file
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// File name glob of the files to keep
    #[arg(long)]
    pub pattern: Option<String>,

    /// Items fetched at once within a group
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// SSH key used for fetching
    #[arg(long, value_name = "FILE")]
    pub identity: Option<PathBuf>,

    /// Do not export the remainder
    #[arg(long)]
    pub skip_remainder: bool,

    /// Export only the remainder
    #[arg(long)]
    pub only_remainder: bool,

    /// Strategy for grouped items (stream, fetch-then-copy)
    #[arg(long, value_name = "STRATEGY")]
    pub grouped_strategy: Option<String>,

    /// Strategy for remainder items (stream, fetch-then-copy)
    #[arg(long, value_name = "STRATEGY")]
    pub remainder_strategy: Option<String>,

    /// Fail items whose pinned revision cannot be checked out
    #[arg(long)]
    pub strict_revisions: bool,

    /// Use the remote default branch without looking it up
    #[arg(long)]
    pub no_resolve_branches: bool,

    #[command(subcommand)]
    pub target: ExportTargetArgs,
}

#[derive(Subcommand, Debug)]
pub enum ExportTargetArgs {
    /// Export into a local directory
    Local {
        /// Output directory
        #[arg(short = 'o', long = "out", value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Export to an SFTP server
    Sftp(RemoteArgs),
}

#[derive(Args, Debug, Default)]
pub struct RemoteArgs {
    /// `host:port` of the SFTP server
    #[arg(long)]
    pub addr: Option<String>,

    #[arg(long)]
    pub user: Option<String>,

    /// Private key used to log in
    #[arg(long, value_name = "FILE")]
    pub keyfile: Option<PathBuf>,

    #[arg(long)]
    pub passphrase: Option<String>,

    /// Root directory on the server
    #[arg(long = "remote", value_name = "DIR")]
    pub remote_dir: Option<PathBuf>,
}

fn parse_capacity(value: &str) -> std::result::Result<u64, String> {
    parse_bytes(value).ok_or_else(|| format!("invalid capacity '{value}'"))
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration with flags applied
    config: Config,

    /// Home directory, resolved once at startup
    home: Option<PathBuf>,
}

impl CliInterface {
    /// Parse the process arguments and load the configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse(), dirs::home_dir())
    }

    /// Build from already parsed arguments
    ///
    /// # Arguments
    /// * `args` - Parsed arguments
    /// * `home` - Home directory used for `~` expansion and the default
    ///   config location
    pub fn from_args(args: CliArgs, home: Option<PathBuf>) -> Result<Self> {
        let fallback = home.as_deref().map(Config::default_path);
        let config_file = args
            .config_file
            .as_deref()
            .map(|p| expand_path(p, home.as_deref()));

        let mut config = Config::load_from_file(config_file.as_deref(), fallback.as_deref())?;
        Self::apply_args_to_config(&mut config, &args);
        config.validate()?;

        Ok(Self { args, config, home })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Expand `~` against the home directory
    pub fn expand(&self, path: &Path) -> PathBuf {
        expand_path(path, self.home.as_deref())
    }

    /// Effective log level
    pub fn log_level(&self) -> tracing::Level {
        self.config.logging.level.to_tracing_level()
    }

    pub fn show_progress(&self) -> bool {
        !self.args.no_progress && !self.args.quiet
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.args.timeout.map(Duration::from_secs)
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_logging_args(config, args);

        match &args.command {
            Commands::Search {
                query,
                out,
                limit,
                burst,
            } => {
                override_with(&mut config.search.query, query);
                override_with(&mut config.search.output, out);
                override_with(&mut config.search.limit, limit);
                override_with(&mut config.search.burst, burst);
            }
            Commands::Plan {
                input,
                out,
                capacity,
            } => {
                override_with(&mut config.plan.input, input);
                override_with(&mut config.plan.output, out);
                override_with(&mut config.plan.capacity, capacity);
            }
            Commands::Export(export) => Self::apply_export_args(config, export),
            Commands::Scan {
                input,
                out,
                concurrency,
            } => {
                override_with(&mut config.scan.input, input);
                override_with(&mut config.scan.output, out);
                override_with(&mut config.scan.concurrency, concurrency);
            }
            Commands::Sync {
                search,
                local,
                concurrency,
                remote,
            } => {
                override_with(&mut config.search.output, search);
                override_with(&mut config.export.output_dir, local);
                override_with(&mut config.sync.concurrency, concurrency);
                Self::apply_remote_args(config, remote);
            }
            Commands::Completion { .. } | Commands::Config { .. } | Commands::Version => {}
        }
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    fn apply_export_args(config: &mut Config, args: &ExportArgs) {
        let export = &mut config.export;
        override_with(&mut export.plan_file, &args.file);
        override_with(&mut export.pattern, &args.pattern);
        override_with(&mut export.concurrency, &args.concurrency);
        override_with(&mut export.identity, &args.identity);
        override_with(&mut export.grouped_strategy, &args.grouped_strategy);
        override_with(&mut export.remainder_strategy, &args.remainder_strategy);
        export.skip_remainder |= args.skip_remainder;
        export.only_remainder |= args.only_remainder;
        export.strict_revisions |= args.strict_revisions;
        if args.no_resolve_branches {
            export.resolve_branches = false;
        }

        match &args.target {
            ExportTargetArgs::Local { out } => override_with(&mut export.output_dir, out),
            ExportTargetArgs::Sftp(remote) => Self::apply_remote_args(config, remote),
        }
    }

    fn apply_remote_args(config: &mut Config, args: &RemoteArgs) {
        let remote = &mut config.remote;
        if args.addr.is_some() {
            remote.addr = args.addr.clone();
        }
        override_with(&mut remote.user, &args.user);
        override_with(&mut remote.keyfile, &args.keyfile);
        if args.passphrase.is_some() {
            remote.passphrase = args.passphrase.clone();
        }
        override_with(&mut remote.remote_dir, &args.remote_dir);
    }

    /// SFTP connection parameters from the effective configuration
    pub fn sftp_config(&self) -> Result<SftpConfig> {
        let remote = &self.config.remote;
        let addr = remote
            .addr
            .clone()
            .ok_or_else(|| ConfigError::MissingField("remote.addr".into()))?;
        Ok(SftpConfig {
            addr,
            user: remote.user.clone(),
            keyfile: self.expand(&remote.keyfile),
            passphrase: remote.passphrase.clone(),
            remote_dir: remote.remote_dir.clone(),
        })
    }

    /// Listing client with request spacing tied to `signal`
    fn github_source(&self, signal: &CancelSignal) -> Result<GitHubSource> {
        let search = &self.config.search;
        let token = std::env::var(&search.token_env).ok();
        let limiter = Arc::new(RateLimiter::new(RATE_WINDOW, search.burst));
        Ok(GitHubSource::new(search.api_url.clone(), token.as_deref())?
            .with_limiter(limiter, signal.token().clone()))
    }

    fn export_request(&self, args: &ExportArgs) -> Result<ExportRequest> {
        let export = &self.config.export;
        let target = match &args.target {
            ExportTargetArgs::Local { .. } => ExportTarget::Local {
                dir: self.expand(&export.output_dir),
            },
            ExportTargetArgs::Sftp(_) => ExportTarget::Sftp(self.sftp_config()?),
        };

        Ok(ExportRequest {
            plan_file: self.expand(&export.plan_file),
            pattern: export.pattern.clone(),
            identity: self.expand(&export.identity),
            fetch_cache_mb: export.fetch_cache_mb,
            strict_revisions: export.strict_revisions,
            target,
            options: ExportOptions {
                concurrency: export.concurrency,
                skip_remainder: export.skip_remainder,
                only_remainder: export.only_remainder,
                strategies: export.strategies()?,
                show_progress: self.show_progress(),
            },
        })
    }

    /// Run the selected subcommand
    pub async fn execute(&self, signal: &CancelSignal) -> Result<()> {
        let config = &self.config;

        match &self.args.command {
            Commands::Search { .. } => {
                let source = self.github_source(signal)?;
                let options = SearchOptions {
                    query: config.search.query.clone(),
                    limit: config.search.limit,
                    per_page: config.search.per_page,
                    lookups: SEARCH_LOOKUPS,
                    show_progress: self.show_progress(),
                };
                let output = self.expand(&config.search.output);
                let summary = executor::run_search(&source, &options, &output, signal).await?;
                println!(
                    "{} repositories written to {} ({} matches, {} dropped)",
                    summary.written,
                    output.display(),
                    summary.found,
                    summary.dropped
                );
            }
            Commands::Plan { .. } => {
                let output = self.expand(&config.plan.output);
                let summary = executor::run_plan(
                    &self.expand(&config.plan.input),
                    &output,
                    config.plan.capacity,
                )?;
                println!(
                    "{} items packed into {} groups, {} in remainder ({})",
                    summary.items,
                    summary.groups,
                    summary.remainder,
                    output.display()
                );
            }
            Commands::Export(args) => {
                let request = self.export_request(args)?;
                let source: Option<Arc<dyn ItemSource>> = if config.export.resolve_branches {
                    Some(Arc::new(self.github_source(signal)?))
                } else {
                    None
                };
                let summary = executor::run_export(request, source, signal).await?;
                println!("Export finished: {summary}");
            }
            Commands::Scan { .. } => {
                let source = self.github_source(signal)?;
                let options = ScanOptions {
                    concurrency: config.scan.concurrency,
                    show_progress: self.show_progress(),
                };
                let output = self.expand(&config.scan.output);
                let summary = executor::run_scan(
                    &source,
                    &self.expand(&config.scan.input),
                    &output,
                    &options,
                    signal,
                )
                .await?;
                println!(
                    "{} items written to {}, {} skipped",
                    summary.written,
                    output.display(),
                    summary.skipped
                );
            }
            Commands::Sync { .. } => {
                let items = read_items_from_file(&self.expand(&config.search.output))?;
                let remote = executor::open_backend(&ExportTarget::Sftp(self.sftp_config()?)).await?;
                let options = SyncOptions {
                    concurrency: config.sync.concurrency,
                    show_progress: self.show_progress(),
                };
                let summary = executor::run_sync(
                    items,
                    &self.expand(&config.export.output_dir),
                    remote,
                    &options,
                    signal,
                )
                .await?;
                println!(
                    "{} synced, {} already remote, {} not exported, {} failed",
                    summary.synced, summary.skipped, summary.missing, summary.failed
                );
            }
            Commands::Completion { shell } => {
                completion::generate_completion(*shell, &mut std::io::stdout());
            }
            Commands::Config { show, validate } => self.handle_config_command(*show, *validate)?,
            Commands::Version => self.show_version(),
        }

        Ok(())
    }

    /// Show version information
    fn show_version(&self) {
        println!("repobin version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Handle config subcommand
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            // Loading already validated the file; reaching this point means it is valid.
            println!("Configuration file: {}", self.config_path().display());
            println!("Configuration is valid");
        }

        if show {
            println!("# Configuration file: {}", self.config_path().display());
            println!();
            println!("{}", self.config.to_toml_string()?);
        }

        Ok(())
    }

    /// Configuration file path (from args or default)
    fn config_path(&self) -> PathBuf {
        match (&self.args.config_file, &self.home) {
            (Some(path), _) => self.expand(path),
            (None, Some(home)) => Config::default_path(home),
            (None, None) => PathBuf::from(".repobin/config.toml"),
        }
    }
}

fn override_with<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}
