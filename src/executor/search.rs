//! `search` command: list repositories and pin their latest revision
//!
//! Pages through the source until `limit` repositories were seen, looks up
//! the head commit of each repository's default branch and writes one item
//! line per repository. Repositories whose lookup fails, or that have no
//! commits yet, are dropped.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::executor::cancel::CancelSignal;
use crate::executor::progress::ProgressTracker;
use crate::source::{ItemSource, RepoMeta};

/// Search parameters
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub query: String,
    /// Maximum number of repositories considered
    pub limit: u64,
    /// Page size (1..=100)
    pub per_page: u32,
    /// Revision lookups in flight at once
    pub lookups: usize,
    pub show_progress: bool,
}

/// Counts reported after a search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchSummary {
    /// Matches reported by the source
    pub found: u64,
    pub written: usize,
    pub dropped: usize,
}

/// Run a search and write the results to `output`.
pub async fn run_search(
    source: &dyn ItemSource,
    options: &SearchOptions,
    output: &Path,
    signal: &CancelSignal,
) -> Result<SearchSummary> {
    let mut writer = BufWriter::new(File::create(output)?);
    let mut summary = SearchSummary::default();
    let mut tracker: Option<ProgressTracker> = None;
    let mut seen = 0u64;
    let mut page = 1u32;
    let token = signal.token();

    while seen < options.limit {
        let result = tokio::select! {
            result = source.search(&options.query, page, options.per_page) => result?,
            _ = token.cancelled() => break,
        };
        summary.found = result.total;
        let tracker = tracker.get_or_insert_with(|| {
            ProgressTracker::new(
                result.total.min(options.limit),
                "repos",
                options.show_progress,
            )
        });

        if result.repos.is_empty() {
            break;
        }
        let take = (options.limit - seen).min(result.repos.len() as u64);
        let repos: Vec<RepoMeta> = result.repos.into_iter().take(take as usize).collect();
        seen += take;
        debug!("page {page}: {} repositories", repos.len());

        let mut lookups = stream::iter(repos)
            .map(|meta| async move {
                let revision = source.latest_revision(&meta.name, meta.branch()).await;
                (meta, revision)
            })
            .buffered(options.lookups.max(1));

        while let Some((meta, revision)) = lookups.next().await {
            let name = meta.name.clone();
            let line = match revision {
                Ok(Some(sha)) => meta.into_item().map(|item| item.with_revision(sha)),
                Ok(None) => {
                    debug!("{name}: no commits, skipped");
                    summary.dropped += 1;
                    tracker.dec_total();
                    continue;
                }
                Err(e) => Err(e),
            };

            match line {
                Ok(item) => {
                    writeln!(writer, "{item}")?;
                    summary.written += 1;
                    tracker.inc();
                }
                Err(e) => {
                    warn!("{name}: {e}");
                    summary.dropped += 1;
                    tracker.dec_total();
                }
            }
        }

        if token.is_cancelled() || u64::from(page) * u64::from(options.per_page) >= result.total {
            break;
        }
        page += 1;
    }

    writer.flush()?;
    if let Some(tracker) = tracker {
        tracker.finish();
    }

    if signal.is_cancelled() {
        return Err(signal.error());
    }

    info!(
        "{} of {} matches written to {}, {} dropped",
        summary.written,
        summary.found,
        output.display(),
        summary.dropped
    );
    Ok(summary)
}
