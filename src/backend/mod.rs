//! Storage backends
//!
//! A [`Backend`] is a rooted file tree that exported content is written to.
//! Every path handed to a backend is interpreted relative to its root and is
//! rejected if it would resolve outside of it, so repository content can
//! never direct writes elsewhere. [`Backend::scoped`] narrows a backend to a
//! subtree with the same guarantee.
//!
//! Two implementations exist:
//! - [`LocalBackend`]: the local filesystem
//! - [`SftpBackend`]: a remote directory reached over SSH/SFTP
//!
//! Backend operations are blocking; async callers run them on the blocking
//! thread pool.

use std::fmt;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{BackendError, Result};

pub mod local;
pub mod sftp;

pub use local::LocalBackend;
pub use sftp::{SftpBackend, SftpConfig};

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

/// Metadata of a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// File name (last path component).
    pub name: String,
    pub kind: EntryKind,
    /// Size in bytes (0 when unknown).
    pub len: u64,
}

impl EntryInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Capability set required from any storage target.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Root of this backend, for display and logging.
    fn root(&self) -> &Path;

    /// Metadata of `path`, or `None` if it does not exist. Symlinks are not
    /// followed.
    fn stat(&self, path: &Path) -> Result<Option<EntryInfo>>;

    /// Create `path` and all missing parents.
    fn mkdir_all(&self, path: &Path) -> Result<()>;

    /// Create or truncate a file for writing. Missing parent directories are
    /// created on demand.
    fn create(&self, path: &Path) -> Result<Box<dyn Write + Send>>;

    /// Open a file for reading.
    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    /// Remove a file or an empty directory.
    fn remove(&self, path: &Path) -> Result<()>;

    /// Move `from` to `to`. The destination must not exist.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// List the entries of a directory.
    fn read_dir(&self, path: &Path) -> Result<Vec<EntryInfo>>;

    /// A backend rooted at `path` inside this one.
    fn scoped(&self, path: &Path) -> Result<Arc<dyn Backend>>;

    /// Local directory backing this backend, if content can be written to it
    /// directly with ordinary filesystem tools.
    fn local_root(&self) -> Option<PathBuf> {
        None
    }

    /// Whether `path` exists.
    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.stat(path)?.is_some())
    }
}

/// Resolve `path` against `root`, refusing anything that escapes it.
///
/// Absolute paths are taken as relative to `root`. `.` components are
/// dropped and `..` may only climb back up to `root` itself.
///
/// # Arguments
/// * `root` - Root directory of the backend
/// * `path` - Caller supplied path
///
/// # Returns
/// * `Result<PathBuf>` - `root` joined with the normalized path
pub fn resolve_within(root: &Path, path: &Path) -> Result<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(escape(root, path));
                }
            }
            Component::Prefix(_) => return Err(escape(root, path)),
        }
    }

    let mut resolved = root.to_path_buf();
    resolved.extend(parts);
    Ok(resolved)
}

fn escape(root: &Path, path: &Path) -> crate::error::RepobinError {
    BackendError::PathEscape {
        root: root.to_path_buf(),
        path: path.to_path_buf(),
    }
    .into()
}

/// Copy one file between two backends.
///
/// # Returns
/// * `Result<u64>` - Number of bytes copied
pub fn copy_file(
    src: &dyn Backend,
    src_path: &Path,
    dst: &dyn Backend,
    dst_path: &Path,
) -> Result<u64> {
    let mut reader = src.open(src_path)?;
    let mut writer = dst.create(dst_path)?;
    let copied = std::io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepobinError;

    #[test]
    fn test_resolve_plain_relative() {
        let root = Path::new("/srv/out");
        assert_eq!(
            resolve_within(root, Path::new("a/b/c.py")).unwrap(),
            PathBuf::from("/srv/out/a/b/c.py")
        );
    }

    #[test]
    fn test_resolve_absolute_is_rooted() {
        let root = Path::new("/srv/out");
        assert_eq!(
            resolve_within(root, Path::new("/etc/passwd")).unwrap(),
            PathBuf::from("/srv/out/etc/passwd")
        );
    }

    #[test]
    fn test_resolve_parent_inside_root() {
        let root = Path::new("/srv/out");
        assert_eq!(
            resolve_within(root, Path::new("a/./b/../c")).unwrap(),
            PathBuf::from("/srv/out/a/c")
        );
        assert_eq!(resolve_within(root, Path::new("")).unwrap(), root);
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let root = Path::new("/srv/out");
        for path in ["..", "../x", "a/../../x", "a/b/../../../etc"] {
            let err = resolve_within(root, Path::new(path)).unwrap_err();
            assert!(
                matches!(err, RepobinError::Backend(BackendError::PathEscape { .. })),
                "{path} should be rejected"
            );
        }
    }
}
