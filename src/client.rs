use chrono::Utc;
use log::debug;
use octocrab::models::issues::{Comment as ApiComment, Issue as ApiIssue};
use octocrab::models::pulls::PullRequest as ApiPull;
use octocrab::models::repos::DiffEntry;
use octocrab::models::{Author, IssueState as ApiState, Repository as ApiRepository};
use octocrab::{params, Octocrab, Page};
use serde::de::DeserializeOwned;
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};

use crate::api::{GitHubApi, ListPage};
use crate::config::{FetchConfig, GitHubConfig};
use crate::error::{PullboardError, Result};
use crate::filters::IssueState;
use crate::types::{
    BranchRef, ChangedFile, Comment, GitHubUser, Issue, PullRequest, RepoListing, Repository,
};

pub struct GitHubClient {
    octocrab: Octocrab,
    rate_limit_delay: Duration,
    request_timeout: Duration,
    /// Page size for the comment and file listings fetched in full.
    per_page: u8,
}

impl GitHubClient {
    pub fn new() -> Result<Self> {
        Self::with_config(&FetchConfig::default())
    }

    pub fn with_config(config: &FetchConfig) -> Result<Self> {
        let token = resolve_token(&config.github)?;
        let mut builder = Octocrab::builder().personal_token(token).add_header(
            "user-agent"
                .parse()
                .map_err(|e| PullboardError::ConfigError(format!("Invalid header: {}", e)))?,
            config.github.user_agent.clone(),
        );

        if !config.github.api_base_url.is_empty()
            && config.github.api_base_url != "https://api.github.com"
        {
            builder = builder
                .base_uri(config.github.api_base_url.as_str())
                .map_err(|e| PullboardError::ConfigError(format!("Invalid base URI: {}", e)))?;
        }

        let octocrab = builder.build()?;

        Ok(Self {
            octocrab,
            rate_limit_delay: config.rate_limiting.delay_duration(),
            request_timeout: Duration::from_secs(config.github.timeout_seconds),
            per_page: config.listing.per_page,
        })
    }

    /// Awaits one request under the configured timeout, then pauses for the rate limit.
    async fn send<T>(
        &self,
        what: &str,
        request: impl Future<Output = octocrab::Result<T>>,
    ) -> Result<T> {
        debug!("{}", what);
        let response = timeout(self.request_timeout, request)
            .await
            .map_err(|_| PullboardError::ApiError(format!("{} timed out", what)))?;

        sleep(self.rate_limit_delay).await;

        response.map_err(|e| PullboardError::ApiError(format!("{} failed: {}", what, e)))
    }

    /// Follows `next` links from `first` until the last page.
    async fn follow_pages<T: DeserializeOwned>(
        &self,
        what: &str,
        first: Page<T>,
    ) -> Result<Vec<T>> {
        let mut items = first.items;
        let mut next = first.next;

        while next.is_some() {
            let page: Option<Page<T>> = self.send(what, self.octocrab.get_page(&next)).await?;
            match page {
                Some(page) => {
                    items.extend(page.items);
                    next = page.next;
                }
                None => break,
            }
        }

        Ok(items)
    }

    pub async fn rate_limit_status(&self) -> Result<String> {
        let rate_limit =
            self.octocrab.ratelimit().get().await.map_err(|e| {
                PullboardError::ApiError(format!("Failed to get rate limit: {}", e))
            })?;

        Ok(format!(
            "Rate limit: {}/{} remaining, resets at {}",
            rate_limit.resources.core.remaining,
            rate_limit.resources.core.limit,
            rate_limit.resources.core.reset
        ))
    }
}

impl GitHubApi for GitHubClient {
    async fn list_pulls(
        &self,
        repo: &Repository,
        page: u32,
        per_page: u8,
    ) -> Result<ListPage<PullRequest>> {
        let result = self
            .send(
                &format!("list pulls of {} page {}", repo, page),
                self.octocrab
                    .pulls(&repo.owner, &repo.name)
                    .list()
                    .state(params::State::Closed)
                    .sort(params::pulls::Sort::Updated)
                    .direction(params::Direction::Descending)
                    .per_page(per_page)
                    .page(page)
                    .send(),
            )
            .await?;

        Ok(ListPage {
            next_page: result.next.as_ref().map(|_| page + 1),
            items: result.items.into_iter().map(convert_pull).collect(),
        })
    }

    async fn list_issues(
        &self,
        repo: &Repository,
        state: IssueState,
        page: u32,
        per_page: u8,
    ) -> Result<ListPage<Issue>> {
        let result = self
            .send(
                &format!("list issues of {} page {}", repo, page),
                self.octocrab
                    .issues(&repo.owner, &repo.name)
                    .list()
                    .state(convert_state(state))
                    .sort(params::issues::Sort::Updated)
                    .direction(params::Direction::Descending)
                    .per_page(per_page)
                    .page(page)
                    .send(),
            )
            .await?;

        Ok(ListPage {
            next_page: result.next.as_ref().map(|_| page + 1),
            items: result.items.into_iter().map(convert_issue).collect(),
        })
    }

    async fn get_pull(&self, repo: &Repository, number: u64) -> Result<PullRequest> {
        let pr = self
            .send(
                &format!("get PR #{} of {}", number, repo),
                self.octocrab.pulls(&repo.owner, &repo.name).get(number),
            )
            .await?;
        Ok(convert_pull(pr))
    }

    async fn get_issue(&self, repo: &Repository, number: u64) -> Result<Issue> {
        let issue = self
            .send(
                &format!("get issue #{} of {}", number, repo),
                self.octocrab.issues(&repo.owner, &repo.name).get(number),
            )
            .await?;
        Ok(convert_issue(issue))
    }

    async fn list_pull_files(&self, repo: &Repository, number: u64) -> Result<Vec<ChangedFile>> {
        let what = format!("list files of PR #{} of {}", number, repo);
        let first = self
            .send(
                &what,
                self.octocrab.pulls(&repo.owner, &repo.name).list_files(number),
            )
            .await?;

        let files = self.follow_pages::<DiffEntry>(&what, first).await?;
        Ok(files.into_iter().map(convert_file).collect())
    }

    /// Review comments come back in the REST shape `Comment` already reads.
    async fn list_review_comments(&self, repo: &Repository, number: u64) -> Result<Vec<Comment>> {
        let mut comments = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!(
                "/repos/{}/{}/pulls/{}/comments?per_page={}&page={}",
                repo.owner, repo.name, number, self.per_page, page
            );
            let response: Vec<Comment> = self
                .send(&format!("GET {}", url), self.octocrab.get(&url, None::<&()>))
                .await?;

            let last = response.is_empty() || response.len() < self.per_page as usize;
            comments.extend(response);
            if last {
                break;
            }
            page += 1;
        }

        Ok(comments)
    }

    async fn list_issue_comments(&self, repo: &Repository, number: u64) -> Result<Vec<Comment>> {
        let what = format!("list comments of #{} of {}", number, repo);
        let first = self
            .send(
                &what,
                self.octocrab
                    .issues(&repo.owner, &repo.name)
                    .list_comments(number)
                    .per_page(self.per_page)
                    .page(1u32)
                    .send(),
            )
            .await?;

        let comments = self.follow_pages::<ApiComment>(&what, first).await?;
        Ok(comments.into_iter().map(convert_comment).collect())
    }

    async fn list_org_repos(
        &self,
        org: &str,
        page: u32,
        per_page: u8,
    ) -> Result<ListPage<RepoListing>> {
        let result = self
            .send(
                &format!("list repositories of {} page {}", org, page),
                self.octocrab
                    .orgs(org)
                    .list_repos()
                    .per_page(per_page)
                    .page(page)
                    .send(),
            )
            .await?;

        Ok(ListPage {
            next_page: result.next.as_ref().map(|_| page + 1),
            items: result.items.into_iter().map(convert_repo).collect(),
        })
    }
}

fn convert_state(state: IssueState) -> params::State {
    match state {
        IssueState::Open => params::State::Open,
        IssueState::Closed => params::State::Closed,
        IssueState::All => params::State::All,
    }
}

fn state_name(state: &ApiState) -> String {
    match state {
        ApiState::Open => "open".to_string(),
        ApiState::Closed => "closed".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

fn convert_author(author: Author) -> GitHubUser {
    GitHubUser {
        id: author.id.0,
        login: author.login,
        account_type: author.r#type,
        bio: None,
    }
}

fn convert_pull(pr: ApiPull) -> PullRequest {
    let created_at = pr.created_at.unwrap_or_else(|| Utc::now());

    PullRequest {
        number: pr.number,
        state: pr
            .state
            .as_ref()
            .map(state_name)
            .unwrap_or_else(|| "open".to_string()),
        title: pr.title,
        body: pr.body,
        html_url: pr.html_url.map(|url| url.to_string()).unwrap_or_default(),
        user: pr.user.map(|user| convert_author(*user)),
        created_at,
        updated_at: pr.updated_at.unwrap_or(created_at),
        closed_at: pr.closed_at,
        merged_at: pr.merged_at,
        merged: pr.merged,
        merge_commit_sha: pr.merge_commit_sha,
        changed_files: pr.changed_files,
        additions: pr.additions,
        deletions: pr.deletions,
        base: Some(BranchRef {
            name: pr.base.ref_field,
        }),
    }
}

fn convert_issue(issue: ApiIssue) -> Issue {
    Issue {
        number: issue.number,
        state: state_name(&issue.state),
        title: Some(issue.title),
        body: issue.body,
        html_url: issue.html_url.to_string(),
        user: Some(convert_author(issue.user)),
        closed_by: issue.closed_by.map(convert_author),
        created_at: issue.created_at,
        updated_at: issue.updated_at,
        closed_at: issue.closed_at,
        pull_request: issue
            .pull_request
            .map(|link| serde_json::json!({ "html_url": link.html_url.to_string() })),
    }
}

fn convert_comment(comment: ApiComment) -> Comment {
    Comment {
        id: comment.id.0,
        user: Some(convert_author(comment.user)),
        body: comment.body,
        created_at: comment.created_at,
        html_url: comment.html_url.to_string(),
    }
}

fn convert_file(file: DiffEntry) -> ChangedFile {
    ChangedFile {
        filename: file.filename,
        status: format!("{:?}", file.status).to_lowercase(),
        additions: file.additions,
        deletions: file.deletions,
        changes: file.changes,
    }
}

fn convert_repo(repo: ApiRepository) -> RepoListing {
    RepoListing {
        name: repo.name,
        archived: repo.archived.unwrap_or(false),
    }
}

fn resolve_token(config: &GitHubConfig) -> Result<String> {
    if let Ok(token) = std::env::var(&config.token_env_var) {
        let token = token.trim();
        if !token.is_empty() {
            return Ok(token.to_string());
        }
    }

    match &config.token_path {
        Some(path) => {
            let token = std::fs::read_to_string(path)?;
            Ok(token.trim().to_string())
        }
        None => Err(PullboardError::AuthError(format!(
            "{} environment variable not set and no token path configured",
            config.token_env_var
        ))),
    }
}
