//! Contributor activity ingestion and leaderboards for GitHub repositories.
//!
//! An [`Ingestor`] pages through merged pull requests and closed issues,
//! caches detail responses on disk and reduces them to per-item summary
//! tables. Those tables render as CSV, JSON or an HTML leaderboard.

pub mod api;
pub mod cache;
pub mod classify;
pub mod client;
pub mod collect;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filters;
pub mod job;
pub mod leaderboard;
pub mod render;
pub mod summary;
pub mod text;
pub mod types;

use std::path::PathBuf;

pub use api::{GitHubApi, ListPage};
pub use cache::{CacheKey, DiskCache, ItemKind};
pub use classify::{classify, PathPolicy, PrType};
pub use client::GitHubClient;
pub use config::{
    CacheConfig, DetailFailurePolicy, FailurePolicies, FetchConfig, FilterConfig, GitHubConfig,
    LeaderboardConfig, ListingConfig, RateLimitConfig, SelfInteraction,
};
pub use error::{PullboardError, Result};
pub use fetch::{screen_listing, Ingestor, Screen};
pub use filters::{
    is_bot, is_bot_login, is_low_signal_comment, ActivityQuery, ActorFilter, BranchFilter,
    IssueState, NameSet, TimeWindow,
};
pub use job::{Job, JobOptions, Snapshot};
pub use leaderboard::{Category, Chart, LeaderboardEntry};
pub use render::{render_html, render_rows, LeaderboardOptions, OutputFormat};
pub use summary::{ActivityBundle, CommentSummary, IssueSummary, PrSummary, ReviewSummary};
pub use text::{clean_description, word_count};
pub use types::{
    BranchRef, ChangedFile, Comment, GitHubUser, Issue, PullRequest, RepoListing, RepoSource,
    Repository,
};

/// Assembles an [`Ingestor`] backed by the GitHub REST API and a disk cache.
pub struct PullboardBuilder {
    config: FetchConfig,
}

impl PullboardBuilder {
    pub fn new() -> Self {
        Self {
            config: FetchConfig::default(),
        }
    }

    pub fn with_config(config: FetchConfig) -> Self {
        Self { config }
    }

    pub fn token_env_var(mut self, var_name: impl Into<String>) -> Self {
        self.config.github.token_env_var = var_name.into();
        self
    }

    pub fn token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.github.token_path = Some(path.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.github.api_base_url = url.into();
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.github.user_agent = agent.into();
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.config.github.timeout_seconds = seconds;
        self
    }

    pub fn rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.config.rate_limiting.delay_between_requests_ms =
            60_000 / requests_per_minute.max(1) as u64;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.rate_limiting.max_retries = retries;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache.path = Some(dir.into());
        self
    }

    pub fn cache_max_bytes(mut self, max_bytes: u64) -> Self {
        self.config.cache.max_bytes = max_bytes;
        self
    }

    pub fn self_interaction(mut self, rule: SelfInteraction) -> Self {
        self.config.filtering.self_interaction = rule;
        self
    }

    pub fn top_n(mut self, n: usize) -> Self {
        self.config.leaderboard.top_n = n;
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn build(self) -> Result<Ingestor<GitHubClient>> {
        let client = GitHubClient::with_config(&self.config)?;
        let cache = DiskCache::from_config(&self.config.cache)?;
        Ingestor::new(client, cache, self.config)
    }
}

impl Default for PullboardBuilder {
    fn default() -> Self {
        Self::new()
    }
}
