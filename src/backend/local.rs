//! Local filesystem backend

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::{Backend, EntryInfo, EntryKind, resolve_within};
use crate::error::Result;

/// Backend writing directly to a local directory.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Use `root` as the backend root. The directory is not created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `root` as the backend root, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!("local backend rooted at {}", root.display());
        Ok(Self { root })
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        resolve_within(&self.root, path)
    }
}

fn entry_info(name: String, metadata: &fs::Metadata) -> EntryInfo {
    let file_type = metadata.file_type();
    let kind = if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Dir
    } else {
        EntryKind::File
    };
    EntryInfo {
        name,
        kind,
        len: metadata.len(),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Backend for LocalBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn stat(&self, path: &Path) -> Result<Option<EntryInfo>> {
        let full = self.resolve(path)?;
        match fs::symlink_metadata(&full) {
            Ok(metadata) => Ok(Some(entry_info(file_name(&full), &metadata))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn mkdir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(self.resolve(path)?)?;
        Ok(())
    }

    fn create(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(&full)?;
        Ok(Box::new(io::BufWriter::new(file)))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = fs::File::open(self.resolve(path)?)?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path)?;
        let metadata = fs::symlink_metadata(&full)?;
        if metadata.is_dir() {
            fs::remove_dir(&full)?;
        } else {
            fs::remove_file(&full)?;
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(self.resolve(from)?, self.resolve(to)?)?;
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<EntryInfo>> {
        let full = self.resolve(path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&full)? {
            let entry = entry?;
            let metadata = fs::symlink_metadata(entry.path())?;
            entries.push(entry_info(
                entry.file_name().to_string_lossy().into_owned(),
                &metadata,
            ));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn scoped(&self, path: &Path) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(Self::new(self.resolve(path)?)))
    }

    fn local_root(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::copy_file;
    use crate::error::{BackendError, RepobinError};

    #[test]
    fn test_create_makes_parents_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());

        let mut writer = backend.create(Path::new("a/b/file.py")).unwrap();
        writer.write_all(b"print('hi')").unwrap();
        drop(writer);

        let mut content = String::new();
        backend
            .open(Path::new("a/b/file.py"))
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "print('hi')");

        let info = backend.stat(Path::new("a/b/file.py")).unwrap().unwrap();
        assert!(info.is_file());
        assert_eq!(info.len, 11);
    }

    #[test]
    fn test_stat_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        assert!(backend.stat(Path::new("nope")).unwrap().is_none());
        assert!(!backend.exists(Path::new("nope")).unwrap());
    }

    #[test]
    fn test_scoped_cannot_escape() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let scoped = backend.scoped(Path::new("owner.repo")).unwrap();

        assert_eq!(scoped.root(), dir.path().join("owner.repo"));
        let err = scoped.create(Path::new("../evil")).err().unwrap();
        assert!(matches!(
            err,
            RepobinError::Backend(BackendError::PathEscape { .. })
        ));
        assert!(backend.scoped(Path::new("../x")).is_err());
    }

    #[test]
    fn test_remove_file_and_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.mkdir_all(Path::new("x/y")).unwrap();
        backend.create(Path::new("x/f.txt")).unwrap();

        assert!(backend.remove(Path::new("x")).is_err());
        backend.remove(Path::new("x/f.txt")).unwrap();
        backend.remove(Path::new("x/y")).unwrap();
        backend.remove(Path::new("x")).unwrap();
        assert!(!backend.exists(Path::new("x")).unwrap());
    }

    #[test]
    fn test_read_dir_sorted_with_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.mkdir_all(Path::new("sub")).unwrap();
        backend.create(Path::new("b.txt")).unwrap();
        backend.create(Path::new("a.txt")).unwrap();

        let entries = backend.read_dir(Path::new("")).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert!(entries[2].is_dir());
    }

    #[test]
    fn test_rename_moves_directory() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        std::fs::create_dir_all(dir.path().join(".a.b.partial/pkg")).unwrap();
        std::fs::write(dir.path().join(".a.b.partial/pkg/m.py"), "").unwrap();

        backend
            .rename(Path::new(".a.b.partial"), Path::new("a.b"))
            .unwrap();
        assert!(dir.path().join("a.b/pkg/m.py").is_file());
        assert!(!dir.path().join(".a.b.partial").exists());
        assert!(backend.rename(Path::new("a.b"), Path::new("../x")).is_err());
    }

    #[test]
    fn test_copy_file_between_backends() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let src = LocalBackend::new(src_dir.path());
        let dst = LocalBackend::new(dst_dir.path());
        std::fs::write(src_dir.path().join("m.py"), "x = 1\n").unwrap();

        let copied = copy_file(&src, Path::new("m.py"), &dst, Path::new("deep/m.py")).unwrap();
        assert_eq!(copied, 6);
        assert_eq!(
            std::fs::read_to_string(dst_dir.path().join("deep/m.py")).unwrap(),
            "x = 1\n"
        );
    }
}
