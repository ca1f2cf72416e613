//! `scan` command: turn a list of repository URLs into item lines
//!
//! Each input line is `<url> [revision]`. The repository is looked up to get
//! its fetch locator and size; repositories that no longer exist are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{RepobinError, Result, SourceError};
use crate::executor::cancel::CancelSignal;
use crate::executor::progress::ProgressTracker;
use crate::source::{ItemSource, parse_repo_url};
use crate::utils::fs::count_lines;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Lookups in flight at once
    pub concurrency: usize,
    pub show_progress: bool,
}

/// Counts reported after a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub written: usize,
    /// Unparsable, missing or failed entries
    pub skipped: usize,
}

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    revision: Option<String>,
}

fn parse_entry(line: &str) -> Result<Entry> {
    let mut fields = line.split_whitespace();
    let url = fields.next().unwrap_or_default();
    Ok(Entry {
        name: parse_repo_url(url)?,
        revision: fields.next().map(str::to_string),
    })
}

/// Scan `input` and write item lines to `output`, keeping input order.
pub async fn run_scan(
    source: &dyn ItemSource,
    input: &Path,
    output: &Path,
    options: &ScanOptions,
    signal: &CancelSignal,
) -> Result<ScanSummary> {
    let tracker = ProgressTracker::new(count_lines(input)?, "urls", options.show_progress);
    let mut summary = ScanSummary::default();

    let mut entries = Vec::new();
    for (idx, line) in BufReader::new(File::open(input)?).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_entry(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!("line {}: {e}", idx + 1);
                summary.skipped += 1;
                tracker.dec_total();
            }
        }
    }

    let mut writer = BufWriter::new(File::create(output)?);
    let lookups = stream::iter(entries)
        .map(|entry| async move {
            let meta = source.repo_meta(&entry.name).await;
            (entry, meta)
        })
        .buffered(options.concurrency.max(1))
        .take_until(signal.token().cancelled());
    tokio::pin!(lookups);

    while let Some((entry, meta)) = lookups.next().await {
        let item = meta.and_then(|meta| meta.into_item()).map(|item| match entry.revision {
            Some(revision) => item.with_revision(revision),
            None => item,
        });

        match item {
            Ok(item) => {
                writeln!(writer, "{item}")?;
                summary.written += 1;
                tracker.inc();
            }
            Err(RepobinError::Source(SourceError::NotFound(_))) => {
                debug!("{}: not found, skipped", entry.name);
                summary.skipped += 1;
                tracker.dec_total();
            }
            Err(e) => {
                warn!("{}: {e}", entry.name);
                summary.skipped += 1;
                tracker.dec_total();
            }
        }
    }

    writer.flush()?;
    tracker.finish();

    if signal.is_cancelled() {
        return Err(signal.error());
    }

    info!(
        "{} items written to {}, {} skipped",
        summary.written,
        output.display(),
        summary.skipped
    );
    Ok(summary)
}
