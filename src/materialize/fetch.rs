//! Repository content fetching
//!
//! Content is fetched with the `git` command line client. Every invocation
//! runs as a child process that is killed as soon as the cancellation token
//! fires or the awaiting future is dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{FetchError, Result};

/// Default cap on the object cache used while unpacking a fetch, in MiB.
pub const DEFAULT_CACHE_LIMIT_MB: u64 = 128;

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Remote locator understood by the fetcher
    pub locator: String,
    /// Branch to check out; `None` uses the remote default
    pub branch: Option<String>,
}

/// Fetches repository content into a local directory.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the full content of `request` into `dest`. `dest` must not exist
    /// or be empty.
    async fn fetch(
        &self,
        request: &FetchRequest,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Hard-reset the working tree at `dest` to `revision`.
    async fn reset(&self, dest: &Path, revision: &str, cancel: &CancellationToken) -> Result<()>;
}

/// SSH private key used to authenticate fetches.
#[derive(Debug, Clone)]
pub struct GitCredential {
    identity: PathBuf,
}

impl GitCredential {
    /// Use the private key at `identity`. The file must exist.
    pub fn load(identity: impl Into<PathBuf>) -> Result<Self> {
        let identity = identity.into();
        if !identity.is_file() {
            return Err(FetchError::Credential(format!(
                "identity file {} does not exist",
                identity.display()
            ))
            .into());
        }
        Ok(Self { identity })
    }

    pub fn identity(&self) -> &Path {
        &self.identity
    }

    /// Value of `GIT_SSH_COMMAND` pinning ssh to this key only.
    pub fn ssh_command(&self) -> String {
        format!(
            "ssh -i '{}' -o IdentitiesOnly=yes -o BatchMode=yes -o StrictHostKeyChecking=accept-new",
            self.identity.display()
        )
    }
}

/// [`Fetcher`] driving the `git` executable.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    program: PathBuf,
    credential: Option<GitCredential>,
    cache_limit_mb: u64,
}

impl GitFetcher {
    pub fn new(credential: Option<GitCredential>) -> Self {
        Self {
            program: PathBuf::from("git"),
            credential,
            cache_limit_mb: DEFAULT_CACHE_LIMIT_MB,
        }
    }

    /// Cap the delta base cache used while cloning.
    pub fn with_cache_limit(mut self, megabytes: u64) -> Self {
        self.cache_limit_mb = megabytes.max(1);
        self
    }

    fn clone_args(&self, request: &FetchRequest, dest: &Path) -> Vec<String> {
        let mut args = vec![
            "-c".to_string(),
            format!("core.deltaBaseCacheLimit={}m", self.cache_limit_mb),
            "clone".to_string(),
            "--quiet".to_string(),
        ];
        if let Some(branch) = &request.branch {
            args.push("--branch".to_string());
            args.push(branch.clone());
            args.push("--single-branch".to_string());
        }
        args.push(request.locator.clone());
        args.push(dest.to_string_lossy().into_owned());
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(credential) = &self.credential {
            cmd.env("GIT_SSH_COMMAND", credential.ssh_command());
        }
        cmd
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!("cloning {} into {}", request.locator, dest.display());
        let args = self.clone_args(request, dest);
        run(self.command(&args), "git clone", cancel).await
    }

    async fn reset(&self, dest: &Path, revision: &str, cancel: &CancellationToken) -> Result<()> {
        debug!("resetting {} to {revision}", dest.display());
        let args = vec![
            "-C".to_string(),
            dest.to_string_lossy().into_owned(),
            "reset".to_string(),
            "--hard".to_string(),
            "--quiet".to_string(),
            revision.to_string(),
        ];
        run(self.command(&args), "git reset", cancel).await
    }
}

/// Run `cmd` to completion unless `cancel` fires first.
async fn run(mut cmd: Command, label: &str, cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled.into());
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let child = cmd.spawn()?;

    let output = tokio::select! {
        output = child.wait_with_output() => output?,
        _ = cancel.cancelled() => return Err(FetchError::Cancelled.into()),
    };

    if output.status.success() {
        trace!("{label} finished");
        Ok(())
    } else {
        Err(FetchError::CommandFailed {
            command: label.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepobinError;

    fn request(branch: Option<&str>) -> FetchRequest {
        FetchRequest {
            locator: "git@github.com:a/b.git".into(),
            branch: branch.map(str::to_string),
        }
    }

    #[test]
    fn test_clone_args_with_branch() {
        let fetcher = GitFetcher::new(None);
        let args = fetcher.clone_args(&request(Some("main")), Path::new("/tmp/a.b"));
        assert_eq!(
            args,
            [
                "-c",
                "core.deltaBaseCacheLimit=128m",
                "clone",
                "--quiet",
                "--branch",
                "main",
                "--single-branch",
                "git@github.com:a/b.git",
                "/tmp/a.b",
            ]
        );
    }

    #[test]
    fn test_clone_args_default_branch_and_cache_limit() {
        let fetcher = GitFetcher::new(None).with_cache_limit(64);
        let args = fetcher.clone_args(&request(None), Path::new("out"));
        assert_eq!(args[1], "core.deltaBaseCacheLimit=64m");
        assert!(!args.iter().any(|a| a == "--branch"));
        assert_eq!(args.last().map(String::as_str), Some("out"));
    }

    #[test]
    fn test_credential_requires_existing_file() {
        let err = GitCredential::load("/nonexistent/id_rsa").unwrap_err();
        assert!(matches!(err, RepobinError::Fetch(FetchError::Credential(_))));

        let key = tempfile::NamedTempFile::new().unwrap();
        let credential = GitCredential::load(key.path()).unwrap();
        assert!(credential.ssh_command().contains("IdentitiesOnly=yes"));
        assert!(
            credential
                .ssh_command()
                .contains(&key.path().display().to_string())
        );
    }

    #[tokio::test]
    async fn test_run_reports_missing_program() {
        let cmd = Command::new("repobin-definitely-not-a-program");
        let result = run(cmd, "missing", &CancellationToken::new()).await;
        assert!(matches!(result, Err(RepobinError::Io(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_failure_captures_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo nope >&2; exit 3"]);
        let err = run(cmd, "sh", &CancellationToken::new()).await.unwrap_err();
        match err {
            RepobinError::Fetch(FetchError::CommandFailed { command, stderr }) => {
                assert_eq!(command, "sh");
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let mut cmd = Command::new("sleep");
        cmd.arg("30");

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = run(cmd, "sleep", &cancel).await.unwrap_err();
        assert!(err.is_cancellation());
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
