use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    pub github: GitHubConfig,
    pub rate_limiting: RateLimitConfig,
    pub listing: ListingConfig,
    pub cache: CacheConfig,
    pub filtering: FilterConfig,
    pub failure: FailurePolicies,
    pub leaderboard: LeaderboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub token_env_var: String,
    /// File holding the token, read when the environment variable is unset.
    pub token_path: Option<PathBuf>,
    pub api_base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token_env_var: "GITHUB_TOKEN".to_string(),
            token_path: None,
            api_base_url: "https://api.github.com".to_string(),
            user_agent: "pullboard/0.1.0".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub delay_between_requests_ms: u64,
    /// Retries after the first failed detail fetch.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            delay_between_requests_ms: 250,
            max_retries: 1,
            retry_delay_ms: 1000,
        }
    }
}

impl RateLimitConfig {
    pub fn delay_duration(&self) -> Duration {
        Duration::from_millis(self.delay_between_requests_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    pub per_page: u8,
    pub max_pages: u32,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            per_page: 100,
            max_pages: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory; defaults to `<user cache dir>/pullboard`.
    pub path: Option<PathBuf>,
    pub max_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_bytes: 1024 * 1024 * 1024,
        }
    }
}

/// Whether an actor's activity on their own item counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SelfInteraction {
    Include,
    Exclude,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Changed files matching any of these are ignored entirely.
    pub ignore_patterns: Vec<String>,
    /// Changed files matching any of these have their added lines capped.
    pub truncate_patterns: Vec<String>,
    pub truncate_lines: u64,
    pub self_interaction: SelfInteraction,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: vec![
                r"go\.mod".to_string(),
                r"go\.sum".to_string(),
                r"Cargo\.lock".to_string(),
                r"package-lock\.json".to_string(),
                r"yarn\.lock".to_string(),
                r"Gopkg\.lock".to_string(),
                r"vendor/".to_string(),
                r"third_party".to_string(),
                r"ignore".to_string(),
                r"schemas?/v\d".to_string(),
                r"\.DS_Store".to_string(),
            ],
            truncate_patterns: vec![
                r"changelog".to_string(),
                r"CHANGELOG".to_string(),
                r"Gopkg\.toml".to_string(),
            ],
            truncate_lines: 10,
            self_interaction: SelfInteraction::Exclude,
        }
    }
}

/// What to do once a detail fetch has failed every retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DetailFailurePolicy {
    /// Stop listing the repository and return the error.
    Abort,
    /// Keep the listing record in place of the detail record.
    Degrade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePolicies {
    pub pulls: DetailFailurePolicy,
    pub issues: DetailFailurePolicy,
}

impl Default for FailurePolicies {
    fn default() -> Self {
        Self {
            pulls: DetailFailurePolicy::Degrade,
            issues: DetailFailurePolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    pub top_n: usize,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self { top_n: 15 }
    }
}
