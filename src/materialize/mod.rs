//! Item materialization
//!
//! Turns one [`Item`] into a directory of matching files inside a storage
//! backend. All writes happen inside `backend.scoped(item.dir_name())`.
//!
//! Two strategies are available:
//! - [`Strategy::StreamToDisk`]: fetch straight into the target subtree, then
//!   prune everything whose name does not match the filter
//! - [`Strategy::FetchThenFilterCopy`]: fetch into a throwaway staging
//!   directory, copy only matching files into a hidden sibling of the target
//!   and rename it into place once complete

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::error::{ConfigError, RepobinError, Result};
use crate::item::Item;
use crate::source::{FALLBACK_BRANCH, ItemSource};

pub mod fetch;
pub mod filter;
#[cfg(test)]
pub(crate) mod testing;

pub use fetch::{FetchRequest, Fetcher, GitCredential, GitFetcher};
pub use filter::{FilterStats, NameFilter};

/// Suffix of the hidden directory a staged copy is assembled in.
const PARTIAL_SUFFIX: &str = ".partial";

/// How an item's content reaches the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    StreamToDisk,
    FetchThenFilterCopy,
}

impl FromStr for Strategy {
    type Err = RepobinError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" | "stream-to-disk" => Ok(Strategy::StreamToDisk),
            "fetch-then-copy" | "fetch-then-filter-copy" | "staging" => {
                Ok(Strategy::FetchThenFilterCopy)
            }
            _ => Err(ConfigError::InvalidValue {
                field: "strategy".into(),
                value: s.to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::StreamToDisk => write!(f, "stream"),
            Strategy::FetchThenFilterCopy => write!(f, "fetch-then-copy"),
        }
    }
}

/// Strategy policy: one choice for grouped items, one for the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategySelector {
    pub grouped: Strategy,
    pub remainder: Strategy,
}

impl StrategySelector {
    pub fn select(&self, is_remainder: bool) -> Strategy {
        if is_remainder {
            self.remainder
        } else {
            self.grouped
        }
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self {
            grouped: Strategy::FetchThenFilterCopy,
            remainder: Strategy::StreamToDisk,
        }
    }
}

/// Result of materializing one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub strategy: Strategy,
    /// Files kept in the backend
    pub kept: usize,
    /// Files fetched but filtered out
    pub dropped: usize,
    /// Whether the pinned revision was checked out
    pub revision_applied: bool,
}

/// Fetches items and filters their content into a backend.
pub struct Materializer {
    fetcher: Arc<dyn Fetcher>,
    filter: NameFilter,
    source: Option<Arc<dyn ItemSource>>,
    resolve_branches: bool,
    strict_revisions: bool,
}

impl Materializer {
    pub fn new(fetcher: Arc<dyn Fetcher>, filter: NameFilter) -> Self {
        Self {
            fetcher,
            filter,
            source: None,
            resolve_branches: false,
            strict_revisions: false,
        }
    }

    /// Resolve the default branch through `source` for items without a
    /// pinned revision.
    pub fn with_source(mut self, source: Arc<dyn ItemSource>) -> Self {
        self.source = Some(source);
        self.resolve_branches = true;
        self
    }

    /// Treat a failed reset to the pinned revision as an item failure
    /// instead of keeping the default branch content.
    pub fn with_strict_revisions(mut self, strict: bool) -> Self {
        self.strict_revisions = strict;
        self
    }

    pub fn filter(&self) -> &NameFilter {
        &self.filter
    }

    /// Materialize `item` into `backend` using `strategy`.
    ///
    /// On success the item's directory exists in the backend, even when no
    /// file matched. On failure partial content may be left behind; callers
    /// decide whether to clean it up.
    pub async fn materialize(
        &self,
        item: &Item,
        backend: Arc<dyn Backend>,
        strategy: Strategy,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        if cancel.is_cancelled() {
            return Err(RepobinError::Cancelled);
        }

        let request = FetchRequest {
            locator: item.locator().to_string(),
            branch: self.branch_for(item).await,
        };
        let scoped = backend.scoped(Path::new(item.dir_name()))?;
        debug!("materializing {} ({strategy})", item.name());

        let (stats, revision_applied) = match (strategy, scoped.local_root()) {
            (Strategy::StreamToDisk, Some(dest)) => {
                self.stream_local(item, &request, scoped.clone(), dest, cancel)
                    .await?
            }
            (Strategy::StreamToDisk, None) => {
                self.stream_detached(item, &request, scoped.clone(), cancel)
                    .await?
            }
            (Strategy::FetchThenFilterCopy, _) => {
                self.fetch_then_copy(item, &request, backend.clone(), cancel)
                    .await?
            }
        };

        let marker = scoped.clone();
        tokio::task::spawn_blocking(move || marker.mkdir_all(Path::new(""))).await??;

        debug!(
            "{}: kept {} files, dropped {}",
            item.name(),
            stats.kept,
            stats.dropped
        );
        Ok(Outcome {
            strategy,
            kept: stats.kept,
            dropped: stats.dropped,
            revision_applied,
        })
    }

    /// Branch to request. Pinned items use the remote default and are reset
    /// afterwards.
    async fn branch_for(&self, item: &Item) -> Option<String> {
        if item.revision().is_some() || !self.resolve_branches {
            return None;
        }
        let source = self.source.as_ref()?;
        match source.repo_meta(item.name()).await {
            Ok(meta) => Some(meta.branch().to_string()),
            Err(e) => {
                warn!(
                    "{}: could not resolve default branch ({e}), using {FALLBACK_BRANCH}",
                    item.name()
                );
                Some(FALLBACK_BRANCH.to_string())
            }
        }
    }

    async fn stream_local(
        &self,
        item: &Item,
        request: &FetchRequest,
        scoped: Arc<dyn Backend>,
        dest: PathBuf,
        cancel: &CancellationToken,
    ) -> Result<(FilterStats, bool)> {
        self.fetcher.fetch(request, &dest, cancel).await?;
        let applied = self.apply_revision(item, &dest, cancel).await?;

        let names = self.filter.clone();
        let stats =
            tokio::task::spawn_blocking(move || filter::prune(scoped.as_ref(), Path::new(""), &names))
                .await??;
        Ok((stats, applied))
    }

    /// Stream into a backend without a local path: clone next to us, upload
    /// the full tree, then prune remotely.
    async fn stream_detached(
        &self,
        item: &Item,
        request: &FetchRequest,
        scoped: Arc<dyn Backend>,
        cancel: &CancellationToken,
    ) -> Result<(FilterStats, bool)> {
        let staging = tempfile::tempdir()?;
        self.fetcher.fetch(request, staging.path(), cancel).await?;
        let applied = self.apply_revision(item, staging.path(), cancel).await?;

        if cancel.is_cancelled() {
            return Err(RepobinError::Cancelled);
        }

        let names = self.filter.clone();
        let stats = tokio::task::spawn_blocking(move || {
            filter::upload_tree(staging.path(), scoped.as_ref())?;
            filter::prune(scoped.as_ref(), Path::new(""), &names)
        })
        .await??;
        Ok((stats, applied))
    }

    /// Stage the checkout locally and assemble the matching files in a
    /// hidden sibling directory, so the item directory only ever appears
    /// complete.
    async fn fetch_then_copy(
        &self,
        item: &Item,
        request: &FetchRequest,
        backend: Arc<dyn Backend>,
        cancel: &CancellationToken,
    ) -> Result<(FilterStats, bool)> {
        let staging = tempfile::tempdir()?;
        self.fetcher.fetch(request, staging.path(), cancel).await?;
        let applied = self.apply_revision(item, staging.path(), cancel).await?;

        if cancel.is_cancelled() {
            return Err(RepobinError::Cancelled);
        }

        let names = self.filter.clone();
        let target = PathBuf::from(item.dir_name());
        let partial = partial_dir(item);
        let stats = tokio::task::spawn_blocking(move || {
            // A killed run may have left one behind.
            filter::remove_tree(backend.as_ref(), &partial)?;

            let assembled = backend.scoped(&partial).and_then(|scoped| {
                let stats = filter::copy_matching(staging.path(), scoped.as_ref(), &names)?;
                scoped.mkdir_all(Path::new(""))?;
                Ok(stats)
            });
            let moved = assembled.and_then(|stats| {
                backend.rename(&partial, &target)?;
                Ok(stats)
            });

            if moved.is_err() {
                if let Err(e) = filter::remove_tree(backend.as_ref(), &partial) {
                    warn!("could not remove {}: {e}", partial.display());
                }
            }
            moved
        })
        .await??;
        Ok((stats, applied))
    }

    /// Reset to the item's pinned revision, if any.
    ///
    /// # Returns
    /// * `Ok(true)` - the revision is checked out
    /// * `Ok(false)` - no revision, or a lenient reset failure
    async fn apply_revision(
        &self,
        item: &Item,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let Some(revision) = item.revision() else {
            return Ok(false);
        };
        match self.fetcher.reset(dir, revision, cancel).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_cancellation() || self.strict_revisions => Err(e),
            Err(e) => {
                warn!(
                    "{}: reset to {revision} failed, keeping default branch: {e}",
                    item.name()
                );
                Ok(false)
            }
        }
    }
}

/// Hidden sibling of the item directory used while copying.
fn partial_dir(item: &Item) -> PathBuf {
    PathBuf::from(format!(".{}{PARTIAL_SUFFIX}", item.dir_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EntryInfo, LocalBackend};
    use crate::source::testing::ScriptedSource;
    use testing::FakeFetcher;

    use std::io::{Read, Write};

    /// Local storage that hides its path, forcing the upload route.
    #[derive(Debug)]
    struct Detached(Arc<dyn Backend>);

    impl Backend for Detached {
        fn root(&self) -> &Path {
            self.0.root()
        }
        fn stat(&self, path: &Path) -> Result<Option<EntryInfo>> {
            self.0.stat(path)
        }
        fn mkdir_all(&self, path: &Path) -> Result<()> {
            self.0.mkdir_all(path)
        }
        fn create(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
            self.0.create(path)
        }
        fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
            self.0.open(path)
        }
        fn remove(&self, path: &Path) -> Result<()> {
            self.0.remove(path)
        }
        fn rename(&self, from: &Path, to: &Path) -> Result<()> {
            self.0.rename(from, to)
        }
        fn read_dir(&self, path: &Path) -> Result<Vec<EntryInfo>> {
            self.0.read_dir(path)
        }
        fn scoped(&self, path: &Path) -> Result<Arc<dyn Backend>> {
            Ok(Arc::new(Detached(self.0.scoped(path)?)))
        }
    }

    fn item() -> Item {
        Item::new("octo/hello", "git@github.com:octo/hello.git", 10).unwrap()
    }

    fn materializer(fetcher: Arc<FakeFetcher>) -> Materializer {
        Materializer::new(fetcher, NameFilter::new("*.py").unwrap())
    }

    fn assert_only_python(root: &Path) {
        assert!(root.join("octo.hello/main.py").is_file());
        assert!(root.join("octo.hello/pkg/util.py").is_file());
        assert!(!root.join("octo.hello/README.md").exists());
        assert!(!root.join("octo.hello/docs").exists());
        assert!(!root.join("octo.hello/.git").exists());
    }

    #[test]
    fn test_strategy_parse_and_display() {
        assert_eq!("stream".parse::<Strategy>().unwrap(), Strategy::StreamToDisk);
        assert_eq!(
            "Fetch-Then-Copy".parse::<Strategy>().unwrap(),
            Strategy::FetchThenFilterCopy
        );
        assert!("rsync".parse::<Strategy>().is_err());
        for s in [Strategy::StreamToDisk, Strategy::FetchThenFilterCopy] {
            assert_eq!(s.to_string().parse::<Strategy>().unwrap(), s);
        }
    }

    #[test]
    fn test_selector_policy() {
        let selector = StrategySelector::default();
        assert_eq!(selector.select(false), Strategy::FetchThenFilterCopy);
        assert_eq!(selector.select(true), Strategy::StreamToDisk);
    }

    #[tokio::test]
    async fn test_stream_to_local_disk_prunes() {
        let out = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(out.path()));
        let fetcher = Arc::new(FakeFetcher::with_tree());

        let outcome = materializer(fetcher)
            .materialize(&item(), backend, Strategy::StreamToDisk, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.kept, 2);
        assert_eq!(outcome.dropped, 3);
        assert!(!outcome.revision_applied);
        assert_only_python(out.path());
    }

    #[tokio::test]
    async fn test_stream_to_detached_backend_uploads_then_prunes() {
        let out = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> =
            Arc::new(Detached(Arc::new(LocalBackend::new(out.path()))));

        let outcome = materializer(Arc::new(FakeFetcher::with_tree()))
            .materialize(&item(), backend, Strategy::StreamToDisk, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.kept, 2);
        assert_only_python(out.path());
    }

    #[tokio::test]
    async fn test_fetch_then_copy_writes_only_matches() {
        let out = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(out.path()));

        let outcome = materializer(Arc::new(FakeFetcher::with_tree()))
            .materialize(
                &item(),
                backend,
                Strategy::FetchThenFilterCopy,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.strategy, Strategy::FetchThenFilterCopy);
        assert_eq!(outcome.kept, 2);
        assert_eq!(outcome.dropped, 2);
        assert_only_python(out.path());
    }

    #[tokio::test]
    async fn test_fetch_then_copy_replaces_stale_partial_copy() {
        let out = tempfile::tempdir().unwrap();
        let stale = out.path().join(".octo.hello.partial");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("half.py"), "").unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(out.path()));

        materializer(Arc::new(FakeFetcher::with_tree()))
            .materialize(
                &item(),
                backend,
                Strategy::FetchThenFilterCopy,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_only_python(out.path());
        assert!(!out.path().join("octo.hello/half.py").exists());
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn test_fetch_then_copy_failure_leaves_no_item_dir() {
        let out = tempfile::tempdir().unwrap();
        // Occupied target: the final rename cannot succeed.
        std::fs::create_dir_all(out.path().join("octo.hello/keep")).unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(out.path()));

        let result = materializer(Arc::new(FakeFetcher::with_tree()))
            .materialize(
                &item(),
                backend,
                Strategy::FetchThenFilterCopy,
                &CancellationToken::new(),
            )
            .await;

        assert!(result.is_err());
        assert!(!out.path().join(".octo.hello.partial").exists());
        assert!(!out.path().join("octo.hello/main.py").exists());
    }

    #[tokio::test]
    async fn test_no_match_still_creates_item_dir() {
        let out = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(out.path()));
        let materializer = Materializer::new(
            Arc::new(FakeFetcher::with_tree()),
            NameFilter::new("*.java").unwrap(),
        );

        let outcome = materializer
            .materialize(
                &item(),
                backend,
                Strategy::FetchThenFilterCopy,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.kept, 0);
        assert!(out.path().join("octo.hello").is_dir());
    }

    #[tokio::test]
    async fn test_reset_failure_is_lenient_by_default() {
        let out = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(out.path()));
        let fetcher = Arc::new(FakeFetcher {
            fail_reset: true,
            ..FakeFetcher::with_tree()
        });
        let pinned = item().with_revision("deadbeef");

        let outcome = materializer(fetcher.clone())
            .materialize(&pinned, backend, Strategy::StreamToDisk, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.revision_applied);
        assert_eq!(*fetcher.resets.lock().unwrap(), ["deadbeef"]);
        assert_only_python(out.path());
    }

    #[tokio::test]
    async fn test_reset_failure_is_fatal_when_strict() {
        let out = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(out.path()));
        let fetcher = Arc::new(FakeFetcher {
            fail_reset: true,
            ..FakeFetcher::with_tree()
        });

        let result = materializer(fetcher)
            .with_strict_revisions(true)
            .materialize(
                &item().with_revision("deadbeef"),
                backend,
                Strategy::FetchThenFilterCopy,
                &CancellationToken::new(),
            )
            .await;

        assert!(result.is_err());
        assert!(!out.path().join("octo.hello/main.py").exists());
    }

    #[tokio::test]
    async fn test_pinned_revision_applied_without_branch_lookup() {
        let out = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(out.path()));
        let fetcher = Arc::new(FakeFetcher::with_tree());
        let source = Arc::new(ScriptedSource::with_repos(vec![ScriptedSource::meta(
            "octo/hello",
            10,
            Some("main"),
        )]));

        let outcome = materializer(fetcher.clone())
            .with_source(source.clone())
            .materialize(
                &item().with_revision("abc123"),
                backend,
                Strategy::StreamToDisk,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.revision_applied);
        assert!(source.lookups.lock().unwrap().is_empty());
        assert_eq!(fetcher.fetched.lock().unwrap()[0].branch, None);
    }

    #[tokio::test]
    async fn test_branch_resolution_and_fallback() {
        let fetcher = Arc::new(FakeFetcher::with_tree());
        let source = Arc::new(ScriptedSource::with_repos(vec![ScriptedSource::meta(
            "octo/hello",
            10,
            Some("trunk"),
        )]));
        let materializer = materializer(fetcher.clone()).with_source(source);

        let out = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(out.path()));
        let missing = Item::new("octo/gone", "git@github.com:octo/gone.git", 1).unwrap();
        let cancel = CancellationToken::new();

        materializer
            .materialize(&item(), backend.clone(), Strategy::StreamToDisk, &cancel)
            .await
            .unwrap();
        materializer
            .materialize(&missing, backend, Strategy::StreamToDisk, &cancel)
            .await
            .unwrap();

        let branches: Vec<_> = fetcher
            .fetched
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.branch.clone())
            .collect();
        assert_eq!(
            branches,
            [Some("trunk".to_string()), Some(FALLBACK_BRANCH.to_string())]
        );
    }

    #[cfg(unix)]
    fn git(dir: &Path, args: &[&str]) -> String {
        let output = std::process::Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["-c", "user.name=repobin", "-c", "user.email=repobin@localhost"])
            .args(args)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {args:?}: {output:?}");
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    #[cfg(unix)]
    fn exported_files(root: &Path) -> Vec<String> {
        walkdir::WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .map(|entry| entry.unwrap())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                entry
                    .path()
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_git_fetch_resets_to_pinned_revision() {
        let upstream = tempfile::tempdir().unwrap();
        let repo = upstream.path();
        git(repo, &["init", "--quiet"]);
        std::fs::write(repo.join("old.py"), "print('old')\n").unwrap();
        std::fs::write(repo.join("notes.txt"), "v1\n").unwrap();
        git(repo, &["add", "."]);
        git(repo, &["commit", "--quiet", "-m", "first"]);
        let first = git(repo, &["rev-parse", "HEAD"]);

        std::fs::remove_file(repo.join("old.py")).unwrap();
        std::fs::write(repo.join("new.py"), "print('new')\n").unwrap();
        git(repo, &["add", "-A"]);
        git(repo, &["commit", "--quiet", "-m", "second"]);

        let locator = format!("file://{}", repo.display());
        let pinned = Item::new("o/r", locator, 1).unwrap().with_revision(first);

        for strategy in [Strategy::StreamToDisk, Strategy::FetchThenFilterCopy] {
            let out = tempfile::tempdir().unwrap();
            let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(out.path()));
            let materializer = Materializer::new(
                Arc::new(GitFetcher::new(None)),
                NameFilter::new("*.py").unwrap(),
            );

            let outcome = materializer
                .materialize(&pinned, backend, strategy, &CancellationToken::new())
                .await
                .unwrap();

            assert!(outcome.revision_applied, "{strategy}");
            assert_eq!(exported_files(out.path()), ["o.r/old.py"], "{strategy}");
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let out = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(out.path()));
        let fetcher = Arc::new(FakeFetcher::with_tree());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = materializer(fetcher.clone())
            .materialize(&item(), backend, Strategy::StreamToDisk, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
        assert!(fetcher.fetched.lock().unwrap().is_empty());
    }
}
