//! Error handling for repobin.
//!
//! Errors are grouped by the layer that produces them:
//! - `PlanError`: corrupted plan or search files (always fatal)
//! - `BackendError`: storage backend and transport failures
//! - `FetchError`: content fetch and filter failures (per item)
//! - `SourceError`: remote listing API failures
//! - `ConfigError`: configuration loading and validation
//!
//! `RepobinError::Cancelled` and `RepobinError::Timeout` are kept apart from
//! content errors so the binary can exit cleanly on an interrupt.

pub mod kinds;

// Re-export commonly used types
pub use kinds::{
    BackendError, ConfigError, FetchError, PlanError, RepobinError, Result, SourceError,
};
