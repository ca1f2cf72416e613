//! Scripted item source used by tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ItemSource, RepoMeta, SearchPage};
use crate::error::{Result, SourceError};

/// Serves a fixed repository list. Names without metadata answer
/// `NotFound`; names without a revision report an empty history.
#[derive(Default)]
pub struct ScriptedSource {
    pub repos: Vec<RepoMeta>,
    pub revisions: HashMap<String, String>,
    pub searches: Mutex<Vec<(u32, u32)>>,
    pub lookups: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn with_repos(repos: Vec<RepoMeta>) -> Self {
        let revisions = repos
            .iter()
            .map(|r| (r.name.clone(), format!("{}-head", r.name.replace('/', "-"))))
            .collect();
        Self {
            repos,
            revisions,
            ..Default::default()
        }
    }

    pub fn meta(name: &str, size: u64, branch: Option<&str>) -> RepoMeta {
        RepoMeta {
            name: name.to_string(),
            locator: format!("git@github.com:{name}.git"),
            size,
            default_branch: branch.map(str::to_string),
            master_branch: None,
        }
    }
}

#[async_trait]
impl ItemSource for ScriptedSource {
    async fn search(&self, _query: &str, page: u32, per_page: u32) -> Result<SearchPage> {
        self.searches.lock().unwrap().push((page, per_page));
        let start = (page.saturating_sub(1) * per_page) as usize;
        Ok(SearchPage {
            total: self.repos.len() as u64,
            repos: self
                .repos
                .iter()
                .skip(start)
                .take(per_page as usize)
                .cloned()
                .collect(),
        })
    }

    async fn repo_meta(&self, name: &str) -> Result<RepoMeta> {
        self.lookups.lock().unwrap().push(name.to_string());
        self.repos
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(name.to_string()).into())
    }

    async fn latest_revision(&self, name: &str, _branch: &str) -> Result<Option<String>> {
        Ok(self.revisions.get(name).cloned())
    }
}
