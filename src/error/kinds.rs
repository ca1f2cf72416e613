use std::path::PathBuf;
use std::{fmt, io};

/// Crate-wide `Result` type using [`RepobinError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, RepobinError>;

/// Top-level error type for repobin operations.
///
/// Wraps the more specific error kinds so every layer can use `?` and the
/// binary only has to decide between "interrupted" and "failed".
#[derive(Debug)]
pub enum RepobinError {
    /// Plan or search file errors.
    Plan(PlanError),

    /// Storage backend errors.
    Backend(BackendError),

    /// Content fetch errors.
    Fetch(FetchError),

    /// Item source (remote listing API) errors.
    Source(SourceError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// The run was interrupted by the user.
    Cancelled,

    /// The run exceeded its time budget.
    Timeout,

    /// Generic error with a free-form message.
    Generic(String),
}

/// Plan and search file errors.
///
/// These indicate a corrupted control file and are never recovered from.
#[derive(Debug)]
pub enum PlanError {
    /// A line did not contain the `name;locator;size` fields.
    MalformedLine { line_no: usize, line: String },

    /// The size field is not an unsigned integer.
    InvalidSize { line_no: usize, value: String },

    /// The item name is not in `owner/name` form.
    InvalidName(String),
}

/// Storage backend errors.
#[derive(Debug)]
pub enum BackendError {
    /// A path resolved outside of the backend root.
    PathEscape { root: PathBuf, path: PathBuf },

    /// The path does not exist.
    NotFound(PathBuf),

    /// Could not establish the transport connection.
    Connection(String),

    /// SSH or SFTP protocol failure.
    Ssh(String),
}

/// Content fetch errors.
#[derive(Debug)]
pub enum FetchError {
    /// An external fetch command exited unsuccessfully.
    CommandFailed { command: String, stderr: String },

    /// The file name filter is not a valid glob.
    InvalidPattern(String),

    /// The fetch credential could not be loaded.
    Credential(String),

    /// The fetch was aborted by cancellation.
    Cancelled,
}

/// Item source errors.
#[derive(Debug)]
pub enum SourceError {
    /// The repository does not exist (or is not visible).
    NotFound(String),

    /// The API refused the request because of rate limits.
    RateLimited,

    /// Transport or decoding failure.
    Http(String),

    /// A locator could not be parsed into owner and name.
    InvalidLocator(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl RepobinError {
    /// Whether this error represents a user interrupt rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            RepobinError::Cancelled | RepobinError::Fetch(FetchError::Cancelled)
        )
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for RepobinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepobinError::Plan(e) => write!(f, "Plan error: {e}"),
            RepobinError::Backend(e) => write!(f, "Backend error: {e}"),
            RepobinError::Fetch(e) => write!(f, "Fetch error: {e}"),
            RepobinError::Source(e) => write!(f, "Source error: {e}"),
            RepobinError::Config(e) => write!(f, "Configuration error: {e}"),
            RepobinError::Io(e) => write!(f, "I/O error: {e}"),
            RepobinError::Cancelled => write!(f, "Operation cancelled"),
            RepobinError::Timeout => write!(f, "Operation timed out"),
            RepobinError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::MalformedLine { line_no, line } => {
                write!(f, "malformed line {line_no}: '{line}'")
            }
            PlanError::InvalidSize { line_no, value } => {
                write!(f, "invalid size '{value}' on line {line_no}")
            }
            PlanError::InvalidName(name) => {
                write!(f, "invalid item name '{name}', expected owner/name")
            }
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::PathEscape { root, path } => write!(
                f,
                "path '{}' escapes backend root '{}'",
                path.display(),
                root.display()
            ),
            BackendError::NotFound(path) => write!(f, "not found: {}", path.display()),
            BackendError::Connection(msg) => write!(f, "connection failed: {msg}"),
            BackendError::Ssh(msg) => write!(f, "ssh: {msg}"),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::CommandFailed { command, stderr } => {
                write!(f, "'{command}' failed: {}", stderr.trim())
            }
            FetchError::InvalidPattern(msg) => write!(f, "invalid pattern: {msg}"),
            FetchError::Credential(msg) => write!(f, "cannot load credential: {msg}"),
            FetchError::Cancelled => write!(f, "fetch cancelled"),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::NotFound(name) => write!(f, "repository not found: {name}"),
            SourceError::RateLimited => write!(f, "rate limited by the API"),
            SourceError::Http(msg) => write!(f, "request failed: {msg}"),
            SourceError::InvalidLocator(loc) => write!(f, "cannot parse locator '{loc}'"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for RepobinError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RepobinError::Io(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for PlanError {}
impl std::error::Error for BackendError {}
impl std::error::Error for FetchError {}
impl std::error::Error for SourceError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to RepobinError ========================= */

impl From<io::Error> for RepobinError {
    fn from(err: io::Error) -> Self {
        RepobinError::Io(err)
    }
}

impl From<PlanError> for RepobinError {
    fn from(err: PlanError) -> Self {
        RepobinError::Plan(err)
    }
}

impl From<BackendError> for RepobinError {
    fn from(err: BackendError) -> Self {
        RepobinError::Backend(err)
    }
}

impl From<FetchError> for RepobinError {
    fn from(err: FetchError) -> Self {
        RepobinError::Fetch(err)
    }
}

impl From<SourceError> for RepobinError {
    fn from(err: SourceError) -> Self {
        RepobinError::Source(err)
    }
}

impl From<ConfigError> for RepobinError {
    fn from(err: ConfigError) -> Self {
        RepobinError::Config(err)
    }
}

impl From<ssh2::Error> for RepobinError {
    fn from(err: ssh2::Error) -> Self {
        RepobinError::Backend(BackendError::Ssh(err.to_string()))
    }
}

impl From<reqwest::Error> for RepobinError {
    fn from(err: reqwest::Error) -> Self {
        RepobinError::Source(SourceError::Http(err.to_string()))
    }
}

impl From<globset::Error> for RepobinError {
    fn from(err: globset::Error) -> Self {
        RepobinError::Fetch(FetchError::InvalidPattern(err.to_string()))
    }
}

impl From<walkdir::Error> for RepobinError {
    fn from(err: walkdir::Error) -> Self {
        RepobinError::Io(err.into())
    }
}

impl From<tokio::task::JoinError> for RepobinError {
    fn from(err: tokio::task::JoinError) -> Self {
        RepobinError::Generic(format!("worker task failed: {err}"))
    }
}

impl From<String> for RepobinError {
    fn from(msg: String) -> Self {
        RepobinError::Generic(msg)
    }
}

impl From<&str> for RepobinError {
    fn from(msg: &str) -> Self {
        RepobinError::Generic(msg.to_owned())
    }
}
