//! The upstream endpoints the ingestion pipeline depends on.

use crate::error::Result;
use crate::filters::IssueState;
use crate::types::{ChangedFile, Comment, Issue, PullRequest, RepoListing, Repository};

/// One page of a listing endpoint.
#[derive(Debug, Clone)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    /// Page number to request next, `None` on the last page.
    pub next_page: Option<u32>,
}

impl<T> ListPage<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }
}

/// Repository-hosting API as seen by the fetcher.
///
/// Listing calls return items sorted by last update, newest first. Comment
/// and file listings return every page at once.
#[allow(async_fn_in_trait)]
pub trait GitHubApi {
    async fn list_pulls(
        &self,
        repo: &Repository,
        page: u32,
        per_page: u8,
    ) -> Result<ListPage<PullRequest>>;

    async fn list_issues(
        &self,
        repo: &Repository,
        state: IssueState,
        page: u32,
        per_page: u8,
    ) -> Result<ListPage<Issue>>;

    async fn get_pull(&self, repo: &Repository, number: u64) -> Result<PullRequest>;

    async fn get_issue(&self, repo: &Repository, number: u64) -> Result<Issue>;

    async fn list_pull_files(&self, repo: &Repository, number: u64) -> Result<Vec<ChangedFile>>;

    /// Inline comments on the diff.
    async fn list_review_comments(&self, repo: &Repository, number: u64) -> Result<Vec<Comment>>;

    /// Conversation comments; for pull requests these live on the issue.
    async fn list_issue_comments(&self, repo: &Repository, number: u64) -> Result<Vec<Comment>>;

    async fn list_org_repos(&self, org: &str, page: u32, per_page: u8)
        -> Result<ListPage<RepoListing>>;
}
