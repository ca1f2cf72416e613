//! Remote SFTP backend
//!
//! One SSH session is opened per backend and shared by every scoped view
//! and worker; libssh2 serializes access internally. Parent directories are
//! created lazily when a file is created.

use std::fmt;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ssh2::{ErrorCode, FileStat, Session, Sftp};
use tracing::{debug, info};

use super::{Backend, EntryInfo, EntryKind, resolve_within};
use crate::error::{BackendError, Result};

/// `LIBSSH2_FX_NO_SUCH_FILE`
const SFTP_NO_SUCH_FILE: i32 = 2;

const DIR_MODE: i32 = 0o755;

/// Connection parameters of the remote backend.
#[derive(Debug, Clone)]
pub struct SftpConfig {
    /// `host:port` of the SSH server
    pub addr: String,
    pub user: String,
    /// Private key used for authentication
    pub keyfile: PathBuf,
    pub passphrase: Option<String>,
    /// Directory on the server that becomes the backend root
    pub remote_dir: PathBuf,
}

struct Connection {
    // Keeps the session alive for as long as the SFTP channel is in use.
    _session: Session,
    sftp: Sftp,
}

/// Backend writing to a directory on an SFTP server.
#[derive(Clone)]
pub struct SftpBackend {
    conn: Arc<Connection>,
    root: PathBuf,
}

impl fmt::Debug for SftpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpBackend")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl SftpBackend {
    /// Connect, authenticate with the configured key and open the SFTP
    /// channel. The remote root directory is created if missing.
    ///
    /// # Arguments
    /// * `config` - Connection parameters
    ///
    /// # Returns
    /// * `Result<Self>` - Connected backend or a fatal setup error
    pub fn connect(config: &SftpConfig) -> Result<Self> {
        let tcp = TcpStream::connect(&config.addr).map_err(|e| {
            BackendError::Connection(format!("TCP connect to {} failed: {e}", config.addr))
        })?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;

        if let Some((key, _)) = session.host_key() {
            debug!("{} host key is {} bytes", config.addr, key.len());
        }

        session.userauth_pubkey_file(
            &config.user,
            None,
            &config.keyfile,
            config.passphrase.as_deref(),
        )?;
        if !session.authenticated() {
            return Err(BackendError::Connection(format!(
                "authentication as {} rejected by {}",
                config.user, config.addr
            ))
            .into());
        }

        let sftp = session.sftp()?;
        let backend = Self {
            conn: Arc::new(Connection {
                _session: session,
                sftp,
            }),
            root: config.remote_dir.clone(),
        };
        backend.mkdir_all(Path::new(""))?;

        info!(
            "connected to {}@{}:{}",
            config.user,
            config.addr,
            config.remote_dir.display()
        );
        Ok(backend)
    }

    fn sftp(&self) -> &Sftp {
        &self.conn.sftp
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        resolve_within(&self.root, path)
    }

    fn lstat_full(&self, full: &Path) -> Result<Option<FileStat>> {
        match self.sftp().lstat(full) {
            Ok(stat) => Ok(Some(stat)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn mkdir_all_full(&self, full: &Path) -> Result<()> {
        let mut current = PathBuf::new();
        for component in full.components() {
            current.push(component);
            if current.parent().is_none() {
                continue;
            }
            match self.lstat_full(&current)? {
                Some(stat) if stat.is_dir() => {}
                Some(_) => {
                    return Err(BackendError::Ssh(format!(
                        "{} exists and is not a directory",
                        current.display()
                    ))
                    .into());
                }
                None => {
                    if let Err(e) = self.sftp().mkdir(&current, DIR_MODE) {
                        // another worker may have created it in the meantime
                        if !matches!(self.lstat_full(&current)?, Some(s) if s.is_dir()) {
                            return Err(e.into());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn is_not_found(err: &ssh2::Error) -> bool {
    err.code() == ErrorCode::SFTP(SFTP_NO_SUCH_FILE)
}

fn entry_info(name: String, stat: &FileStat) -> EntryInfo {
    let kind = if stat.file_type().is_symlink() {
        EntryKind::Symlink
    } else if stat.is_dir() {
        EntryKind::Dir
    } else {
        EntryKind::File
    };
    EntryInfo {
        name,
        kind,
        len: stat.size.unwrap_or(0),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Backend for SftpBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn stat(&self, path: &Path) -> Result<Option<EntryInfo>> {
        let full = self.resolve(path)?;
        Ok(self
            .lstat_full(&full)?
            .map(|stat| entry_info(file_name(&full), &stat)))
    }

    fn mkdir_all(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path)?;
        self.mkdir_all_full(&full)
    }

    fn create(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            self.mkdir_all_full(parent)?;
        }
        let file = self.sftp().create(&full)?;
        Ok(Box::new(file))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let full = self.resolve(path)?;
        match self.sftp().open(&full) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if is_not_found(&e) => Err(BackendError::NotFound(full).into()),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path)?;
        match self.lstat_full(&full)? {
            Some(stat) if stat.is_dir() => self.sftp().rmdir(&full)?,
            Some(_) => self.sftp().unlink(&full)?,
            None => return Err(BackendError::NotFound(full).into()),
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        self.sftp().rename(&from, &to, None)?;
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<EntryInfo>> {
        let full = self.resolve(path)?;
        let mut entries: Vec<EntryInfo> = self
            .sftp()
            .readdir(&full)?
            .into_iter()
            .map(|(entry_path, stat)| entry_info(file_name(&entry_path), &stat))
            .filter(|entry| entry.name != "." && entry.name != "..")
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn scoped(&self, path: &Path) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(Self {
            conn: Arc::clone(&self.conn),
            root: self.resolve(path)?,
        }))
    }
}
