//! Paginated retrieval of merged pull requests and closed issues.
//!
//! Listings are requested newest-update first. Once an item last updated
//! before the window is seen, no further page can hold qualifying items and
//! paging stops. The rest of the current page is still screened so that an
//! out-of-order item is processed rather than silently dropped.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use tokio::time::sleep;

use crate::api::GitHubApi;
use crate::cache::{CacheKey, DiskCache, ItemKind};
use crate::classify::PathPolicy;
use crate::config::{DetailFailurePolicy, FetchConfig};
use crate::error::Result;
use crate::filters::{is_bot, ActivityQuery, IssueState, TimeWindow};
use crate::types::{ChangedFile, Comment, Issue, PullRequest, RepoListing, Repository};

/// Outcome of the listing-level checks shared by every item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Keep,
    Skip(&'static str),
    /// Updated before the window: this and every later page are stale.
    Exhausted,
}

pub fn screen_listing(
    window: &TimeWindow,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
) -> Screen {
    if closed_at.map_or(false, |t| window.is_after(t)) {
        return Screen::Skip("closed after window");
    }
    if window.is_before(updated_at) {
        return Screen::Exhausted;
    }
    if closed_at.map_or(false, |t| window.is_before(t)) {
        return Screen::Skip("closed before window");
    }
    Screen::Keep
}

/// Warns when a listing breaks its newest-first ordering.
#[derive(Debug, Default)]
struct OrderCheck {
    previous: Option<DateTime<Utc>>,
}

impl OrderCheck {
    fn observe(&mut self, repo: &Repository, number: u64, updated_at: DateTime<Utc>) {
        if let Some(previous) = self.previous {
            if updated_at > previous {
                warn!(
                    "{} #{} updated at {} after an item updated at {}: listing is not newest-first",
                    repo, number, updated_at, previous
                );
            }
        }
        self.previous = Some(updated_at);
    }
}

pub struct Ingestor<A> {
    api: A,
    cache: DiskCache,
    config: FetchConfig,
    paths: PathPolicy,
}

impl<A: GitHubApi> Ingestor<A> {
    pub fn new(api: A, cache: DiskCache, config: FetchConfig) -> Result<Self> {
        let paths = PathPolicy::new(&config.filtering)?;
        Ok(Self {
            api,
            cache,
            config,
            paths,
        })
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn paths(&self) -> &PathPolicy {
        &self.paths
    }

    /// Runs `op`, retrying after a fixed delay up to `max_retries` times.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.config.rate_limiting.max_retries => {
                    attempt += 1;
                    warn!("{} failed ({}), retrying (attempt {})", what, e, attempt);
                    sleep(self.config.rate_limiting.retry_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Looks `key` up in the cache, fetching and storing it on a miss.
    async fn cached<T, F, Fut>(&self, key: CacheKey, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.cache.get::<T>(&key) {
            debug!("cache hit: {}", key);
            return Ok(hit);
        }

        debug!("cache miss: {}", key);
        let value = self.with_retry(&key.to_string(), fetch).await?;
        if let Err(e) = self.cache.put(&key, &value) {
            warn!("failed to cache {}: {}", key, e);
        }
        Ok(value)
    }

    /// Merged pull requests whose author passes the query, newest first.
    pub async fn merged_pulls(
        &self,
        repo: &Repository,
        query: &ActivityQuery,
    ) -> Result<Vec<PullRequest>> {
        let window = &query.window;
        let mut result = Vec::new();
        let mut order = OrderCheck::default();
        let mut next = Some(1u32);

        info!(
            "Gathering pull requests for {} between {} and {}",
            repo, window.since, window.until
        );

        while let Some(page) = next {
            if page > self.config.listing.max_pages {
                warn!(
                    "Reached maximum page limit ({}) for {}",
                    self.config.listing.max_pages, repo
                );
                break;
            }

            let per_page = self.config.listing.per_page;
            let listing = self
                .with_retry(&format!("{} pull page {}", repo, page), || {
                    self.api.list_pulls(repo, page, per_page)
                })
                .await?;
            info!(
                "Processing page {} of {} pull requests ({} items)",
                page,
                repo,
                listing.items.len()
            );
            next = listing.next_page;

            for candidate in listing.items {
                order.observe(repo, candidate.number, candidate.updated_at);

                match screen_listing(window, candidate.updated_at, candidate.closed_at) {
                    Screen::Keep => {}
                    Screen::Skip(reason) => {
                        debug!("PR #{}: {}", candidate.number, reason);
                        continue;
                    }
                    Screen::Exhausted => {
                        if next.is_some() {
                            info!(
                                "Hit PR #{} updated at {}, no more pages needed",
                                candidate.number, candidate.updated_at
                            );
                        }
                        next = None;
                        continue;
                    }
                }

                if let Some(reason) = self.reject_pull_candidate(&candidate, query) {
                    debug!("PR #{} by {}: {}", candidate.number, candidate.author(), reason);
                    continue;
                }

                let full = match self.pull_detail(repo, &candidate).await {
                    Ok(full) => full,
                    Err(e) => match self.config.failure.pulls {
                        DetailFailurePolicy::Abort => return Err(e),
                        DetailFailurePolicy::Degrade => {
                            warn!(
                                "Using listing data for {} PR #{} after failed fetch: {}",
                                repo, candidate.number, e
                            );
                            candidate
                        }
                    },
                };

                if !full.is_merged() {
                    debug!("PR #{} was not merged, skipping", full.number);
                    continue;
                }
                if full.merged_at.map_or(false, |t| window.is_before(t)) {
                    debug!("PR #{} was merged before {}, skipping", full.number, window.since);
                    continue;
                }

                result.push(full);
            }
        }

        info!("Returning {} pull requests for {}", result.len(), repo);
        Ok(result)
    }

    fn reject_pull_candidate(
        &self,
        candidate: &PullRequest,
        query: &ActivityQuery,
    ) -> Option<&'static str> {
        if !query.actors.matches(candidate.author()) {
            return Some("author not selected");
        }
        if candidate.user.as_ref().map_or(false, is_bot) {
            return Some("author is a bot");
        }
        if !IssueState::Closed.matches(&candidate.state) {
            return Some("not closed");
        }
        if candidate.merged_at.is_none() {
            return Some("closed without merging");
        }
        if !query.branches.is_empty()
            && !candidate
                .base_branch()
                .map_or(false, |b| query.branches.matches(b))
        {
            return Some("base branch not selected");
        }
        None
    }

    pub async fn pull_detail(&self, repo: &Repository, candidate: &PullRequest) -> Result<PullRequest> {
        let key = CacheKey::new(
            ItemKind::PullRequest,
            repo,
            candidate.number,
            candidate.cache_bucket(),
        );
        self.cached(key, || self.api.get_pull(repo, candidate.number))
            .await
    }

    /// Issues (not pull requests) in `state` with activity in the window.
    ///
    /// The actor filter matches the creator or the closer, so it is applied
    /// after the detail fetch.
    pub async fn issues(
        &self,
        repo: &Repository,
        query: &ActivityQuery,
        state: IssueState,
    ) -> Result<Vec<Issue>> {
        let window = &query.window;
        let mut result = Vec::new();
        let mut order = OrderCheck::default();
        let mut next = Some(1u32);

        info!(
            "Gathering {} issues for {} between {} and {}",
            state.as_str(),
            repo,
            window.since,
            window.until
        );

        while let Some(page) = next {
            if page > self.config.listing.max_pages {
                warn!(
                    "Reached maximum page limit ({}) for {}",
                    self.config.listing.max_pages, repo
                );
                break;
            }

            let per_page = self.config.listing.per_page;
            let listing = self
                .with_retry(&format!("{} issue page {}", repo, page), || {
                    self.api.list_issues(repo, state, page, per_page)
                })
                .await?;
            info!(
                "Processing page {} of {} issues ({} items)",
                page,
                repo,
                listing.items.len()
            );
            next = listing.next_page;

            for candidate in listing.items {
                order.observe(repo, candidate.number, candidate.updated_at);

                if candidate.is_pull_request() {
                    continue;
                }

                match screen_listing(window, candidate.updated_at, candidate.closed_at) {
                    Screen::Keep => {}
                    Screen::Skip(reason) => {
                        debug!("issue #{}: {}", candidate.number, reason);
                        continue;
                    }
                    Screen::Exhausted => {
                        if next.is_some() {
                            info!(
                                "Hit issue #{} updated at {}, no more pages needed",
                                candidate.number, candidate.updated_at
                            );
                        }
                        next = None;
                        continue;
                    }
                }

                if !state.matches(&candidate.state) {
                    debug!("issue #{}: state {}", candidate.number, candidate.state);
                    continue;
                }

                let full = match self.issue_detail(repo, &candidate).await {
                    Ok(full) => full,
                    Err(e) => match self.config.failure.issues {
                        DetailFailurePolicy::Abort => return Err(e),
                        DetailFailurePolicy::Degrade => {
                            warn!(
                                "Using listing data for {} issue #{} after failed fetch: {}",
                                repo, candidate.number, e
                            );
                            candidate
                        }
                    },
                };

                if !query.actors.matches_any([full.author(), full.closer()]) {
                    debug!("issue #{}: neither creator nor closer selected", full.number);
                    continue;
                }

                result.push(full);
            }
        }

        info!("Returning {} issues for {}", result.len(), repo);
        Ok(result)
    }

    pub async fn issue_detail(&self, repo: &Repository, candidate: &Issue) -> Result<Issue> {
        let key = CacheKey::new(ItemKind::Issue, repo, candidate.number, candidate.cache_bucket());
        self.cached(key, || self.api.get_issue(repo, candidate.number))
            .await
    }

    /// Changed files that count, with ignored paths removed.
    pub async fn pull_files(&self, repo: &Repository, pr: &PullRequest) -> Result<Vec<ChangedFile>> {
        let key = CacheKey::new(ItemKind::PullRequestFiles, repo, pr.number, pr.cache_bucket());
        let files = self
            .cached(key, || self.api.list_pull_files(repo, pr.number))
            .await?;
        Ok(self.paths.retain(files))
    }

    pub async fn review_comments(&self, repo: &Repository, pr: &PullRequest) -> Result<Vec<Comment>> {
        let key = CacheKey::new(
            ItemKind::PullRequestComments,
            repo,
            pr.number,
            pr.cache_bucket(),
        );
        self.cached(key, || self.api.list_review_comments(repo, pr.number))
            .await
    }

    /// Conversation comments on an issue or pull request.
    pub async fn issue_comments(
        &self,
        repo: &Repository,
        number: u64,
        bucket: DateTime<Utc>,
    ) -> Result<Vec<Comment>> {
        let key = CacheKey::new(ItemKind::IssueComments, repo, number, bucket);
        self.cached(key, || self.api.list_issue_comments(repo, number))
            .await
    }

    /// Every non-archived repository of an organization.
    pub async fn org_repositories(&self, org: &str) -> Result<Vec<Repository>> {
        let mut repos = Vec::new();
        let mut next = Some(1u32);

        while let Some(page) = next {
            let per_page = self.config.listing.per_page;
            let listing = self
                .with_retry(&format!("{} repository page {}", org, page), || {
                    self.api.list_org_repos(org, page, per_page)
                })
                .await?;
            next = listing.next_page;
            repos.extend(
                listing
                    .items
                    .into_iter()
                    .filter(|r: &RepoListing| !r.archived)
                    .map(|r| Repository::new(org, r.name)),
            );
        }

        info!("Found {} repositories in {}", repos.len(), org);
        Ok(repos)
    }
}
