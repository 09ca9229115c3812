use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PullboardError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitHubUser {
    #[serde(default)]
    pub id: u64,
    pub login: String,
    /// `User`, `Bot` or `Organization`.
    #[serde(rename = "type", default)]
    pub account_type: String,
    #[serde(default)]
    pub bio: Option<String>,
}

impl GitHubUser {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            account_type: "User".to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub name: String,
}

/// A pull request as returned by both the listing and the detail endpoint.
///
/// Listing records lack `merged`, `changed_files` and the diff totals; those
/// stay `None` on a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub state: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub user: Option<GitHubUser>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged: Option<bool>,
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
    #[serde(default)]
    pub changed_files: Option<u64>,
    #[serde(default)]
    pub additions: Option<u64>,
    #[serde(default)]
    pub deletions: Option<u64>,
    #[serde(default)]
    pub base: Option<BranchRef>,
}

impl PullRequest {
    pub fn author(&self) -> &str {
        self.user.as_ref().map(|u| u.login.as_str()).unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("").trim()
    }

    pub fn base_branch(&self) -> Option<&str> {
        self.base.as_ref().map(|b| b.name.as_str())
    }

    /// Merge time, falling back to close time.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.merged_at.or(self.closed_at)
    }

    /// Timestamp folded into cache keys for this pull request.
    pub fn cache_bucket(&self) -> DateTime<Utc> {
        self.completed_at().unwrap_or(self.updated_at)
    }

    /// Detail records carry `merged`; listing records only carry `merged_at`.
    pub fn is_merged(&self) -> bool {
        let has_sha = self
            .merge_commit_sha
            .as_deref()
            .map_or(false, |sha| !sha.is_empty());
        match self.merged {
            Some(merged) => merged && has_sha,
            None => self.merged_at.is_some() && has_sha,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub state: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub user: Option<GitHubUser>,
    #[serde(default)]
    pub closed_by: Option<GitHubUser>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    /// Present only when the issue is a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn author(&self) -> &str {
        self.user.as_ref().map(|u| u.login.as_str()).unwrap_or("")
    }

    pub fn closer(&self) -> &str {
        self.closed_by
            .as_ref()
            .map(|u| u.login.as_str())
            .unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("").trim()
    }

    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn cache_bucket(&self) -> DateTime<Utc> {
        self.closed_at.unwrap_or(self.updated_at)
    }
}

/// Issue-style or review-style comment; both resources share these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub user: Option<GitHubUser>,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
}

impl Comment {
    pub fn author(&self) -> &str {
        self.user.as_ref().map(|u| u.login.as_str()).unwrap_or("")
    }

    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or("").trim()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    #[serde(default)]
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    #[serde(default)]
    pub changes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoListing {
    pub name: String,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    pub full_name: String,
}

impl Repository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        let owner = owner.into();
        let name = name.into();
        let full_name = format!("{}/{}", owner, name);
        Self {
            owner,
            name,
            full_name,
        }
    }

    /// Accepts `org/project`, `org/project/` and `https://host/org/project`.
    pub fn parse(reference: &str) -> Result<Self> {
        let segments = path_segments(reference);
        match segments.as_slice() {
            [owner, name] => Ok(Self::new(*owner, name.trim_end_matches(".git"))),
            _ => Err(PullboardError::InvalidRepository(format!(
                "expected 'owner/name' or a repository URL, got: {}",
                reference
            ))),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// A configured source: one repository, or every repository of an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSource {
    Repository(Repository),
    Organization(String),
}

impl RepoSource {
    pub fn parse(reference: &str) -> Result<Self> {
        let segments = path_segments(reference);
        if let [org] = segments.as_slice() {
            if !reference.contains("://") {
                return Ok(Self::Organization(org.to_string()));
            }
        }
        Repository::parse(reference).map(Self::Repository)
    }
}

fn path_segments(reference: &str) -> Vec<&str> {
    let trimmed = reference.trim();
    let path = match trimmed.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => trimmed,
    };
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_reference_forms() {
        let expected = Repository::new("google", "pullsheet");
        for reference in [
            "google/pullsheet",
            "google/pullsheet/",
            "https://github.com/google/pullsheet",
            "https://github.com/google/pullsheet.git",
        ] {
            assert_eq!(Repository::parse(reference).unwrap(), expected, "{}", reference);
        }
    }

    #[test]
    fn test_invalid_repository_reference() {
        assert!(Repository::parse("google").is_err());
        assert!(Repository::parse("google/pullsheet/pulls").is_err());
        assert!(Repository::parse("https://github.com/").is_err());
        assert!(Repository::parse("").is_err());
    }

    #[test]
    fn test_repo_spec_organization() {
        assert_eq!(
            RepoSource::parse("kubernetes").unwrap(),
            RepoSource::Organization("kubernetes".to_string())
        );
        assert!(matches!(
            RepoSource::parse("kubernetes/minikube").unwrap(),
            RepoSource::Repository(_)
        ));
    }

    #[test]
    fn test_pull_request_from_listing_json() {
        let json = r#"{
            "number": 7,
            "state": "closed",
            "title": " Fix flake ",
            "html_url": "https://github.com/o/p/pull/7",
            "user": {"login": "alice", "id": 1, "type": "User"},
            "created_at": "2021-01-01T00:00:00Z",
            "updated_at": "2021-01-03T00:00:00Z",
            "closed_at": "2021-01-02T00:00:00Z",
            "merged_at": "2021-01-02T00:00:00Z",
            "merge_commit_sha": "abc123",
            "base": {"ref": "main", "sha": "def"}
        }"#;
        let pr: PullRequest = serde_json::from_str(json).unwrap();
        assert_eq!(pr.author(), "alice");
        assert_eq!(pr.title(), "Fix flake");
        assert_eq!(pr.base_branch(), Some("main"));
        assert!(pr.is_merged());
        assert_eq!(pr.cache_bucket(), pr.merged_at.unwrap());
    }

    #[test]
    fn test_detail_not_merged() {
        let json = r#"{
            "number": 8,
            "state": "closed",
            "html_url": "https://github.com/o/p/pull/8",
            "created_at": "2021-01-01T00:00:00Z",
            "updated_at": "2021-01-03T00:00:00Z",
            "closed_at": "2021-01-02T00:00:00Z",
            "merged": false,
            "merge_commit_sha": "abc123"
        }"#;
        let pr: PullRequest = serde_json::from_str(json).unwrap();
        assert!(!pr.is_merged());
        assert_eq!(pr.cache_bucket(), pr.closed_at.unwrap());
    }
}
