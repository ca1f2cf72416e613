//! In-process fetcher used by tests

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::fetch::{FetchRequest, Fetcher};
use crate::error::{FetchError, Result};

/// Writes a fixed file set instead of cloning. Locators listed in
/// `failing` make `fetch` fail; `reset` fails when `fail_reset` is set.
#[derive(Default)]
pub struct FakeFetcher {
    pub files: Vec<(&'static str, &'static str)>,
    pub failing: HashSet<String>,
    pub fail_reset: bool,
    pub delay: Option<Duration>,
    pub fetched: Mutex<Vec<FetchRequest>>,
    pub resets: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    /// A checkout with two sources, a readme and git metadata.
    pub fn with_tree() -> Self {
        Self {
            files: vec![
                ("main.py", "print('hi')\n"),
                ("README.md", "# readme\n"),
                ("pkg/util.py", "X = 1\n"),
                ("docs/index.md", "docs\n"),
                (".git/HEAD", "ref: refs/heads/main\n"),
            ],
            ..Default::default()
        }
    }

    pub fn fetched_locators(&self) -> Vec<String> {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.locator.clone())
            .collect()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.fetched.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return Err(FetchError::Cancelled.into());
                }
            }
        }

        let result: Result<()> = if self.failing.contains(&request.locator) {
            Err(FetchError::CommandFailed {
                command: "git clone".into(),
                stderr: "repository not found".into(),
            }
            .into())
        } else {
            self.files.iter().try_for_each(|(rel, body)| {
                let path = dest.join(rel);
                std::fs::create_dir_all(path.parent().unwrap_or(dest))?;
                std::fs::write(path, body)
            })
            .map_err(Into::into)
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn reset(&self, _dest: &Path, revision: &str, _cancel: &CancellationToken) -> Result<()> {
        self.resets.lock().unwrap().push(revision.to_string());
        if self.fail_reset {
            return Err(FetchError::CommandFailed {
                command: "git reset".into(),
                stderr: format!("unknown revision {revision}"),
            }
            .into());
        }
        Ok(())
    }
}
