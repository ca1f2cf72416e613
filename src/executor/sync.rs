//! `sync` command: copy a local export to the remote backend
//!
//! Every item of a search file whose directory exists below the local
//! export root is uploaded to the same directory name on the remote side.
//! Items already present remotely are skipped, so the command can be
//! repeated after an interruption.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::error::Result;
use crate::executor::cancel::CancelSignal;
use crate::executor::progress::ProgressTracker;
use crate::item::Item;
use crate::materialize::filter;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Items uploaded at once
    pub concurrency: usize,
    pub show_progress: bool,
}

/// Counts reported after a sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Items uploaded
    pub synced: usize,
    /// Already present remotely
    pub skipped: usize,
    /// Not exported locally
    pub missing: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncOutcome {
    Synced(usize),
    Skipped,
    Missing,
    Failed,
}

fn sync_item(local: &Path, remote: &dyn Backend, dir: &Path) -> Result<SyncOutcome> {
    if !local.is_dir() {
        return Ok(SyncOutcome::Missing);
    }
    if remote.exists(dir)? {
        return Ok(SyncOutcome::Skipped);
    }

    let scoped = remote.scoped(dir)?;
    let copied = filter::upload_tree(local, scoped.as_ref())?;
    scoped.mkdir_all(Path::new(""))?;
    Ok(SyncOutcome::Synced(copied))
}

/// Upload the local export of `items` below `local_root` to `remote`.
pub async fn run_sync(
    items: Vec<Item>,
    local_root: &Path,
    remote: Arc<dyn Backend>,
    options: &SyncOptions,
    signal: &CancelSignal,
) -> Result<SyncSummary> {
    let tracker = ProgressTracker::new(items.len() as u64, "items", options.show_progress);
    let mut summary = SyncSummary::default();

    let uploads = stream::iter(items)
        .map(|item| {
            let local = local_root.join(item.dir_name());
            let dir = PathBuf::from(item.dir_name());
            let remote = remote.clone();
            async move {
                let task = tokio::task::spawn_blocking(move || {
                    let outcome = sync_item(&local, remote.as_ref(), &dir);
                    if outcome.is_err() {
                        if let Err(e) = filter::remove_tree(remote.as_ref(), &dir) {
                            warn!("could not remove partial upload {}: {e}", dir.display());
                        }
                    }
                    outcome
                });
                let outcome = match task.await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        error!("{}: {e}", item.name());
                        SyncOutcome::Failed
                    }
                    Err(e) => {
                        error!("{}: {e}", item.name());
                        SyncOutcome::Failed
                    }
                };
                (item, outcome)
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .take_until(signal.token().cancelled());
    tokio::pin!(uploads);

    while let Some((item, outcome)) = uploads.next().await {
        match outcome {
            SyncOutcome::Synced(files) => {
                debug!("{}: {files} files uploaded", item.name());
                summary.synced += 1;
                tracker.inc();
            }
            SyncOutcome::Skipped => {
                debug!("{}: already on remote", item.name());
                summary.skipped += 1;
                tracker.dec_total();
            }
            SyncOutcome::Missing => {
                debug!("{}: not exported locally", item.name());
                summary.missing += 1;
                tracker.dec_total();
            }
            SyncOutcome::Failed => {
                summary.failed += 1;
                tracker.dec_total();
            }
        }
    }
    tracker.finish();

    if signal.is_cancelled() {
        return Err(signal.error());
    }

    info!(
        "{} synced, {} already remote, {} not exported, {} failed",
        summary.synced, summary.skipped, summary.missing, summary.failed
    );
    Ok(summary)
}
