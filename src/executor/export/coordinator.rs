//! Export coordinator
//!
//! Walks a plan group by group. Each group gets a fresh semaphore-bounded
//! worker set and is drained completely before the next one starts; the
//! remainder, when selected, comes last. Items whose directory already
//! exists in the backend are skipped, so an interrupted export can simply
//! be run again.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::error::Result;
use crate::executor::cancel::CancelSignal;
use crate::executor::progress::ProgressTracker;
use crate::item::Item;
use crate::materialize::{Materializer, Strategy, StrategySelector, filter};
use crate::plan::Plan;
use crate::utils::time::format_duration;

/// Knobs of one export run
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Items materialized at once within a group
    pub concurrency: usize,
    pub skip_remainder: bool,
    pub only_remainder: bool,
    pub strategies: StrategySelector,
    /// Display a progress bar
    pub show_progress: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            skip_remainder: false,
            only_remainder: false,
            strategies: StrategySelector::default(),
            show_progress: false,
        }
    }
}

/// Result of an export run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub completed: usize,
    /// Already present in the backend
    pub skipped: usize,
    pub failed: usize,
    /// Stopped by cancellation before finishing
    pub interrupted: usize,
    pub elapsed: Duration,
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} completed, {} skipped, {} failed",
            self.completed, self.skipped, self.failed
        )?;
        if self.interrupted > 0 {
            write!(f, ", {} interrupted", self.interrupted)?;
        }
        write!(f, " in {}", format_duration(self.elapsed))
    }
}

#[derive(Debug, Default)]
struct Tally {
    completed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    interrupted: AtomicUsize,
}

impl Tally {
    fn summary(&self, elapsed: Duration) -> ExportSummary {
        ExportSummary {
            completed: self.completed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            interrupted: self.interrupted.load(Ordering::SeqCst),
            elapsed,
        }
    }
}

/// State shared by the workers of a run
struct Shared {
    materializer: Arc<Materializer>,
    backend: Arc<dyn Backend>,
    signal: CancelSignal,
    tracker: ProgressTracker,
    tally: Tally,
}

/// Coordinator for export runs
pub struct ExportCoordinator {
    materializer: Arc<Materializer>,
    backend: Arc<dyn Backend>,
    options: ExportOptions,
    signal: CancelSignal,
}

impl ExportCoordinator {
    pub fn new(materializer: Materializer, backend: Arc<dyn Backend>, options: ExportOptions) -> Self {
        Self {
            materializer: Arc::new(materializer),
            backend,
            options,
            signal: CancelSignal::new(),
        }
    }

    /// Set the cancellation signal for this run
    pub fn with_cancellation(mut self, signal: CancelSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Export every selected group of `plan`.
    ///
    /// Per-item failures are logged and counted, never returned.
    ///
    /// # Returns
    /// * `Ok(ExportSummary)` - the plan was walked to the end
    /// * `Err(Cancelled | Timeout)` - the run was stopped; in-flight items
    ///   were drained first
    pub async fn run(&self, plan: &Plan) -> Result<ExportSummary> {
        let start = Instant::now();
        let (skip, only) = (self.options.skip_remainder, self.options.only_remainder);
        let total = plan.total(skip, only);

        info!(
            "exporting {total} items into {}",
            self.backend.root().display()
        );

        let shared = Arc::new(Shared {
            materializer: self.materializer.clone(),
            backend: self.backend.clone(),
            signal: self.signal.clone(),
            tracker: ProgressTracker::new(total as u64, "items", self.options.show_progress),
            tally: Tally::default(),
        });

        for (index, (group, is_remainder)) in plan.iter(skip, only).enumerate() {
            if self.signal.is_cancelled() {
                break;
            }
            let strategy = self.options.strategies.select(is_remainder);
            if is_remainder {
                debug!("remainder: {} items ({strategy})", group.len());
            } else {
                debug!("group {}: {} items ({strategy})", index + 1, group.len());
            }
            self.run_group(group, strategy, &shared).await;
        }

        shared.tracker.finish();
        let summary = shared.tally.summary(start.elapsed());

        if self.signal.is_cancelled() {
            warn!("export stopped: {summary}");
            return Err(self.signal.error());
        }

        info!("export finished: {summary}");
        Ok(summary)
    }

    /// Run one group with at most `concurrency` items in flight and wait for
    /// all of them.
    async fn run_group(&self, group: &[Item], strategy: Strategy, shared: &Arc<Shared>) {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut workers = JoinSet::new();
        let token = self.signal.token();

        for item in group {
            if token.is_cancelled() {
                break;
            }
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = token.cancelled() => break,
            };

            let item = item.clone();
            let shared = shared.clone();
            workers.spawn(async move {
                let _permit = permit;
                process_item(item, strategy, &shared).await;
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("export worker failed: {e}");
            }
        }
    }
}

async fn process_item(item: Item, strategy: Strategy, shared: &Shared) {
    let dir = PathBuf::from(item.dir_name());

    let probe = shared.backend.clone();
    let probe_dir = dir.clone();
    match tokio::task::spawn_blocking(move || probe.exists(&probe_dir)).await {
        Ok(Ok(true)) => {
            debug!("{}: already exported, skipping", item.name());
            shared.tally.skipped.fetch_add(1, Ordering::SeqCst);
            shared.tracker.dec_total();
            return;
        }
        Ok(Ok(false)) => {}
        Ok(Err(e)) => {
            error!("{}: cannot inspect backend: {e}", item.name());
            shared.tally.failed.fetch_add(1, Ordering::SeqCst);
            shared.tracker.dec_total();
            return;
        }
        Err(e) => {
            error!("{}: {e}", item.name());
            shared.tally.failed.fetch_add(1, Ordering::SeqCst);
            shared.tracker.dec_total();
            return;
        }
    }

    let result = shared
        .materializer
        .materialize(&item, shared.backend.clone(), strategy, shared.signal.token())
        .await;

    match result {
        Ok(outcome) => {
            debug!("{}: done, {} files", item.name(), outcome.kept);
            shared.tally.completed.fetch_add(1, Ordering::SeqCst);
            shared.tracker.inc();
        }
        Err(e) => {
            if e.is_cancellation() {
                debug!("{}: interrupted", item.name());
                shared.tally.interrupted.fetch_add(1, Ordering::SeqCst);
            } else {
                error!("{}: {e}", item.name());
                shared.tally.failed.fetch_add(1, Ordering::SeqCst);
            }
            shared.tracker.dec_total();
            discard_partial(shared.backend.clone(), dir, item.name()).await;
        }
    }
}

/// Remove what a failed item left behind so the next run retries it.
async fn discard_partial(backend: Arc<dyn Backend>, dir: PathBuf, name: &str) {
    let cleanup = tokio::task::spawn_blocking(move || filter::remove_tree(backend.as_ref(), &dir));
    match cleanup.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("{name}: could not remove partial export: {e}"),
        Err(e) => warn!("{name}: cleanup task failed: {e}"),
    }
}
