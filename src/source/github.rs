//! GitHub REST API item source

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{ItemSource, RateLimiter, RepoMeta, SearchPage};
use crate::error::{ConfigError, Result, SourceError};

/// Public GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub reports repository sizes in KiB.
const SIZE_UNIT: u64 = 1024;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    total_count: u64,
    #[serde(default)]
    items: Vec<RepoResponse>,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    full_name: String,
    ssh_url: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    master_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
}

impl From<RepoResponse> for RepoMeta {
    fn from(repo: RepoResponse) -> Self {
        Self {
            name: repo.full_name,
            locator: repo.ssh_url,
            size: repo.size.saturating_mul(SIZE_UNIT),
            default_branch: repo.default_branch,
            master_branch: repo.master_branch,
        }
    }
}

/// [`ItemSource`] backed by the GitHub REST API.
pub struct GitHubSource {
    http: reqwest::Client,
    api_url: String,
    limiter: Option<Arc<RateLimiter>>,
    cancel: CancellationToken,
}

impl GitHubSource {
    /// Build a client.
    ///
    /// # Arguments
    /// * `api_url` - Base URL of the API
    /// * `token` - Optional personal access token
    pub fn new(api_url: impl Into<String>, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("repobin/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                ConfigError::InvalidValue {
                    field: "search.token_env".into(),
                    value: "<token with invalid characters>".into(),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            limiter: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Space every request through `limiter`; waiting stops when `cancel`
    /// fires.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>, cancel: CancellationToken) -> Self {
        self.limiter = Some(limiter);
        self.cancel = cancel;
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire(&self.cancel).await?;
        }

        let response = request.send().await?;
        let status = response.status();
        trace!("{what}: HTTP {status}");

        match status {
            s if s.is_success() => Ok(response.json::<T>().await?),
            StatusCode::NOT_FOUND => Err(SourceError::NotFound(what.to_string()).into()),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                Err(SourceError::RateLimited.into())
            }
            s => Err(SourceError::Http(format!("{what}: HTTP {s}")).into()),
        }
    }

    fn repo_path(name: &str) -> Result<&str> {
        match name.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => Ok(name),
            _ => Err(SourceError::InvalidLocator(name.to_string()).into()),
        }
    }
}

#[async_trait]
impl ItemSource for GitHubSource {
    async fn search(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage> {
        let request = self
            .http
            .get(format!("{}/search/repositories", self.api_url))
            .query(&[
                ("q", query.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ]);
        let response: SearchResponse = self.get_json(request, "search").await?;
        debug!(
            "search page {page}: {} of {} results",
            response.items.len(),
            response.total_count
        );

        Ok(SearchPage {
            total: response.total_count,
            repos: response.items.into_iter().map(RepoMeta::from).collect(),
        })
    }

    async fn repo_meta(&self, name: &str) -> Result<RepoMeta> {
        let path = Self::repo_path(name)?;
        let request = self.http.get(format!("{}/repos/{path}", self.api_url));
        let repo: RepoResponse = self.get_json(request, name).await?;
        Ok(repo.into())
    }

    async fn latest_revision(&self, name: &str, branch: &str) -> Result<Option<String>> {
        let path = Self::repo_path(name)?;
        let request = self
            .http
            .get(format!("{}/repos/{path}/commits", self.api_url))
            .query(&[("sha", branch), ("per_page", "1")]);
        let commits: Vec<CommitResponse> = self.get_json(request, name).await?;
        Ok(commits.into_iter().next().map(|c| c.sha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_response_sizes_are_bytes() {
        let json = r#"{
            "full_name": "octo/hello",
            "ssh_url": "git@github.com:octo/hello.git",
            "size": 3,
            "default_branch": "main"
        }"#;
        let repo: RepoResponse = serde_json::from_str(json).unwrap();
        let meta = RepoMeta::from(repo);
        assert_eq!(meta.size, 3 * 1024);
        assert_eq!(meta.branch(), "main");
        assert_eq!(meta.master_branch, None);
    }

    #[test]
    fn test_search_response_decodes() {
        let json = r#"{
            "total_count": 2,
            "incomplete_results": false,
            "items": [
                {"full_name": "a/b", "ssh_url": "git@github.com:a/b.git", "size": 1},
                {"full_name": "c/d", "ssh_url": "git@github.com:c/d.git", "size": 2}
            ]
        }"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.total_count, 2);
        assert_eq!(response.items[1].full_name, "c/d");
    }

    #[test]
    fn test_repo_path_validation() {
        assert!(GitHubSource::repo_path("a/b").is_ok());
        assert!(GitHubSource::repo_path("ab").is_err());
        assert!(GitHubSource::repo_path("/b").is_err());
    }

    #[test]
    fn test_api_url_trailing_slash_trimmed() {
        let source = GitHubSource::new("https://example.test/api/", None).unwrap();
        assert_eq!(source.api_url, "https://example.test/api");
    }
}
