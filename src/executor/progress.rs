//! Progress tracking for long-running commands
//!
//! Wraps an indicatif bar whose length can shrink while the run is in
//! progress: skipped and failed items are removed from the expected total
//! instead of being counted as done.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

/// Progress tracker shared by all workers of a run
pub struct ProgressTracker {
    /// Units finished so far
    processed: AtomicU64,
    /// Expected units, shrinking as items drop out
    total: AtomicU64,
    /// Label of the counted units
    unit: String,
    /// Start time of the operation
    start_time: Instant,
    /// Progress bar (optional, can be disabled)
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `total` - Expected number of units
    /// * `unit` - Label shown next to the counter
    /// * `enable_bar` - Whether to display a progress bar
    pub fn new(total: u64, unit: &str, enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new(total);
            let style = ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {unit} {{msg}}"
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            bar.set_style(style);
            bar
        });

        Self {
            processed: AtomicU64::new(0),
            total: AtomicU64::new(total),
            unit: unit.to_string(),
            start_time: Instant::now(),
            bar,
        }
    }

    /// Record one finished unit
    pub fn inc(&self) {
        let count = self.processed.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(ref bar) = self.bar {
            bar.set_position(count);

            let elapsed = self.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                bar.set_message(format!("({:.1}/sec)", count as f64 / elapsed));
            }
        }
    }

    /// Remove one unit from the expected total
    pub fn dec_total(&self) {
        let previous = self
            .total
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |t| t.checked_sub(1))
            .unwrap_or(0);

        if let Some(ref bar) = self.bar {
            bar.set_length(previous.saturating_sub(1));
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
        debug!(
            "{}/{} {} processed in {:.1}s",
            self.processed(),
            self.total(),
            self.unit,
            self.start_time.elapsed().as_secs_f64()
        );
    }
}
