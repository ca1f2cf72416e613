//! Item sources
//!
//! An [`ItemSource`] is the remote listing service repositories are
//! discovered from. It answers three questions: which repositories match a
//! query, what a repository's default branch is, and which commit that
//! branch currently points at. Interpreting failures (not found, rate
//! limited) is left to the caller.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{Result, SourceError};
use crate::item::Item;

pub mod github;
pub mod limiter;
#[cfg(test)]
pub(crate) mod testing;

pub use github::GitHubSource;
pub use limiter::RateLimiter;

/// Branch used when the source reports neither a default nor a legacy
/// master branch.
pub const FALLBACK_BRANCH: &str = "master";

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Total number of matches reported by the source
    pub total: u64,
    pub repos: Vec<RepoMeta>,
}

/// Repository metadata needed to fetch its content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoMeta {
    pub name: String,
    pub locator: String,
    /// Size in bytes
    pub size: u64,
    pub default_branch: Option<String>,
    /// Legacy designation still reported by some API versions
    pub master_branch: Option<String>,
}

impl RepoMeta {
    /// Branch to fetch: the default branch, then the legacy master branch,
    /// then [`FALLBACK_BRANCH`].
    pub fn branch(&self) -> &str {
        [&self.default_branch, &self.master_branch]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|b| !b.is_empty())
            .unwrap_or(FALLBACK_BRANCH)
    }

    /// Convert into an item (without revision).
    pub fn into_item(self) -> Result<Item> {
        Item::new(self.name, self.locator, self.size)
    }
}

/// Remote repository listing service.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Fetch one page (1-based) of repositories matching `query`.
    async fn search(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage>;

    /// Look up one repository by its `owner/name`.
    async fn repo_meta(&self, name: &str) -> Result<RepoMeta>;

    /// Latest commit id on `branch`, or `None` for an empty repository.
    async fn latest_revision(&self, name: &str, branch: &str) -> Result<Option<String>>;
}

static REPO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://|git@|ssh://git@)?github\.com[/:]([^/\s]+)/([^/\s]+?)(?:\.git)?/?$")
        .expect("repository URL pattern is valid")
});

/// Extract `owner/name` from a repository URL.
///
/// Accepts `https://github.com/owner/repo(.git)`, `git@github.com:owner/repo.git`
/// and `ssh://git@github.com/owner/repo.git`.
pub fn parse_repo_url(url: &str) -> Result<String> {
    let captures = REPO_URL
        .captures(url.trim())
        .ok_or_else(|| SourceError::InvalidLocator(url.to_string()))?;
    Ok(format!("{}/{}", &captures[1], &captures[2]))
}
