//! File name filtering passes
//!
//! Both strategies keep only files whose *name* matches a glob. The stream
//! strategy prunes a tree in place through a [`Backend`]; the staging strategy
//! copies matching files out of a local checkout. Directories and symlinks
//! are never matched against the pattern.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use tracing::trace;
use walkdir::WalkDir;

use crate::backend::{Backend, EntryKind, LocalBackend, copy_file};
use crate::error::Result;

/// Directory holding git metadata inside a checkout.
pub const GIT_DIR: &str = ".git";

/// Glob matcher applied to file names (`*`, `?`, `[...]`).
#[derive(Debug, Clone)]
pub struct NameFilter {
    pattern: String,
    matcher: GlobMatcher,
}

impl NameFilter {
    /// Compile `pattern`. Invalid globs are a `FetchError::InvalidPattern`.
    pub fn new(pattern: &str) -> Result<Self> {
        let matcher = Glob::new(pattern)?.compile_matcher();
        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether a file called `name` should be kept.
    pub fn matches(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }
}

/// Counters of a filter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Files kept (or copied)
    pub kept: usize,
    /// Files removed (or not copied)
    pub dropped: usize,
    /// Directories removed because they became empty
    pub pruned_dirs: usize,
}

/// Remove every file under `dir` whose name does not match `filter`, then
/// remove directories left empty. Works bottom-up through the backend.
///
/// Symlinks are treated as non-matching entries and removed; `dir` itself is
/// never removed.
pub fn prune(backend: &dyn Backend, dir: &Path, filter: &NameFilter) -> Result<FilterStats> {
    let mut stats = FilterStats::default();
    prune_dir(backend, dir, filter, &mut stats)?;
    Ok(stats)
}

/// Returns whether `dir` is empty after pruning.
fn prune_dir(
    backend: &dyn Backend,
    dir: &Path,
    filter: &NameFilter,
    stats: &mut FilterStats,
) -> Result<bool> {
    let mut remaining = 0usize;

    for entry in backend.read_dir(dir)? {
        let path = dir.join(&entry.name);
        match entry.kind {
            EntryKind::Dir => {
                if prune_dir(backend, &path, filter, stats)? {
                    backend.remove(&path)?;
                    stats.pruned_dirs += 1;
                } else {
                    remaining += 1;
                }
            }
            EntryKind::File if filter.matches(&entry.name) => {
                stats.kept += 1;
                remaining += 1;
            }
            EntryKind::File | EntryKind::Symlink => {
                trace!("removing {}", path.display());
                backend.remove(&path)?;
                stats.dropped += 1;
            }
        }
    }

    Ok(remaining == 0)
}

/// Remove `dir` and everything below it.
pub fn remove_tree(backend: &dyn Backend, dir: &Path) -> Result<()> {
    if backend.stat(dir)?.is_none() {
        return Ok(());
    }
    for entry in backend.read_dir(dir)? {
        let path = dir.join(&entry.name);
        if entry.is_dir() {
            remove_tree(backend, &path)?;
        } else {
            backend.remove(&path)?;
        }
    }
    backend.remove(dir)
}

/// Regular files below `src` in walk order, relative to `src`. The git
/// metadata directory and symlinks are skipped.
fn checkout_files(src: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(src)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != GIT_DIR);

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(src) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}

/// Copy the files of a local checkout whose names match `filter` into
/// `dst`, preserving relative paths. Non-matching files are never written.
pub fn copy_matching(src: &Path, dst: &dyn Backend, filter: &NameFilter) -> Result<FilterStats> {
    let checkout = LocalBackend::new(src);
    let mut stats = FilterStats::default();

    for relative in checkout_files(src)? {
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if !filter.matches(&name) {
            stats.dropped += 1;
            continue;
        }

        copy_file(&checkout, &relative, dst, &relative)?;
        stats.kept += 1;
    }

    Ok(stats)
}

/// Copy every file of a local tree (including git metadata) into `dst`.
pub fn upload_tree(src: &Path, dst: &dyn Backend) -> Result<usize> {
    let tree = LocalBackend::new(src);
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        copy_file(&tree, relative, dst, relative)?;
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, rel).unwrap();
    }

    #[test]
    fn test_name_filter_glob_semantics() {
        let filter = NameFilter::new("*.py").unwrap();
        assert!(filter.matches("main.py"));
        assert!(!filter.matches("main.pyc"));
        assert!(!filter.matches("README.md"));

        let filter = NameFilter::new("mod?.[ch]").unwrap();
        assert!(filter.matches("mod1.c"));
        assert!(filter.matches("modx.h"));
        assert!(!filter.matches("mod12.c"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(NameFilter::new("[unclosed").is_err());
    }

    #[test]
    fn test_prune_removes_non_matching_and_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "keep.py");
        touch(dir.path(), "drop.txt");
        touch(dir.path(), "pkg/inner.py");
        touch(dir.path(), "pkg/data.json");
        touch(dir.path(), "docs/guide.md");
        touch(dir.path(), ".git/objects/pack/abc.pack");
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();

        let backend = LocalBackend::new(dir.path());
        let filter = NameFilter::new("*.py").unwrap();
        let stats = prune(&backend, Path::new(""), &filter).unwrap();

        assert_eq!(stats.kept, 2);
        assert_eq!(stats.dropped, 4);
        assert!(dir.path().join("keep.py").exists());
        assert!(dir.path().join("pkg/inner.py").exists());
        assert!(!dir.path().join("pkg/data.json").exists());
        assert!(!dir.path().join("docs").exists());
        assert!(!dir.path().join(".git").exists());
        assert!(!dir.path().join("empty").exists());
        assert!(dir.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_prune_does_not_follow_symlinks() {
        let outside = tempfile::tempdir().unwrap();
        touch(outside.path(), "secret.txt");
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.py");
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link.py")).unwrap();

        let backend = LocalBackend::new(dir.path());
        prune(&backend, Path::new(""), &NameFilter::new("*.py").unwrap()).unwrap();

        assert!(!dir.path().join("link.py").exists());
        assert!(outside.path().join("secret.txt").exists());
    }

    #[test]
    fn test_copy_matching_skips_git_and_non_matching() {
        let src = tempfile::tempdir().unwrap();
        touch(src.path(), "a.py");
        touch(src.path(), "b.rs");
        touch(src.path(), "sub/c.py");
        touch(src.path(), ".git/hooks/pre-commit.py");

        let dst_dir = tempfile::tempdir().unwrap();
        let dst = LocalBackend::new(dst_dir.path());
        let stats = copy_matching(src.path(), &dst, &NameFilter::new("*.py").unwrap()).unwrap();

        assert_eq!(stats.kept, 2);
        assert_eq!(stats.dropped, 1);
        assert!(dst_dir.path().join("a.py").exists());
        assert!(dst_dir.path().join("sub/c.py").exists());
        assert!(!dst_dir.path().join("b.rs").exists());
        assert!(!dst_dir.path().join(".git").exists());
    }

    #[test]
    fn test_upload_tree_then_remove_tree() {
        let src = tempfile::tempdir().unwrap();
        touch(src.path(), "a.py");
        touch(src.path(), ".git/HEAD");

        let dst_dir = tempfile::tempdir().unwrap();
        let dst = LocalBackend::new(dst_dir.path());
        let scoped = dst.scoped(Path::new("o.r")).unwrap();
        assert_eq!(upload_tree(src.path(), scoped.as_ref()).unwrap(), 2);
        assert!(dst_dir.path().join("o.r/.git/HEAD").exists());

        remove_tree(&dst, Path::new("o.r")).unwrap();
        assert!(!dst_dir.path().join("o.r").exists());
        remove_tree(&dst, Path::new("o.r")).unwrap();
    }
}
