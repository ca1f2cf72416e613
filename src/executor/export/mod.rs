//! Plan export
//!
//! The export pipeline is built from three parts:
//!
//! 1. **Backend**: local directory or SFTP server the items are written to
//! 2. **Materializer**: fetches one item and filters its files into the backend
//! 3. **ExportCoordinator**: walks the plan group by group with bounded
//!    concurrency, skipping items that are already present
//!
//! [`run_export`] performs the fatal setup steps (plan, pattern, credential,
//! backend) and then hands over to the coordinator.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::backend::{Backend, LocalBackend, SftpBackend, SftpConfig};
use crate::error::Result;
use crate::executor::cancel::CancelSignal;
use crate::materialize::{GitCredential, GitFetcher, Materializer, NameFilter};
use crate::plan::Plan;
use crate::source::ItemSource;

pub mod coordinator;

pub use coordinator::{ExportCoordinator, ExportOptions, ExportSummary};

/// Where exported items go
#[derive(Debug, Clone)]
pub enum ExportTarget {
    Local { dir: PathBuf },
    Sftp(SftpConfig),
}

/// Everything an export run needs, with paths already expanded
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub plan_file: PathBuf,
    pub pattern: String,
    /// SSH key used for fetching
    pub identity: PathBuf,
    pub fetch_cache_mb: u64,
    pub strict_revisions: bool,
    pub target: ExportTarget,
    pub options: ExportOptions,
}

/// Open the storage backend of `target`.
pub async fn open_backend(target: &ExportTarget) -> Result<Arc<dyn Backend>> {
    match target {
        ExportTarget::Local { dir } => Ok(Arc::new(LocalBackend::open(dir.clone())?)),
        ExportTarget::Sftp(config) => {
            let config = config.clone();
            let backend = tokio::task::spawn_blocking(move || SftpBackend::connect(&config)).await??;
            Ok(Arc::new(backend))
        }
    }
}

/// Export the plan described by `request`.
///
/// # Arguments
/// * `request` - Plan, filter, credential and target
/// * `source` - Used to resolve default branches when given
/// * `signal` - Run-wide cancellation
pub async fn run_export(
    request: ExportRequest,
    source: Option<Arc<dyn ItemSource>>,
    signal: &CancelSignal,
) -> Result<ExportSummary> {
    let plan = Plan::read_from_file(&request.plan_file)?;
    let filter = NameFilter::new(&request.pattern)?;
    let credential = GitCredential::load(&request.identity)?;
    info!(
        "plan {}: {} groups, {} in remainder",
        request.plan_file.display(),
        plan.groups().len(),
        plan.remainder().len()
    );

    let backend = open_backend(&request.target).await?;

    let fetcher = GitFetcher::new(Some(credential)).with_cache_limit(request.fetch_cache_mb);
    let mut materializer = Materializer::new(Arc::new(fetcher), filter)
        .with_strict_revisions(request.strict_revisions);
    if let Some(source) = source {
        materializer = materializer.with_source(source);
    }

    ExportCoordinator::new(materializer, backend, request.options)
        .with_cancellation(signal.clone())
        .run(&plan)
        .await
}
