//! Cross-repository collection of the four summary tables.
//!
//! Repositories are processed one after another.

use log::{info, warn};

use crate::api::GitHubApi;
use crate::config::DetailFailurePolicy;
use crate::error::Result;
use crate::fetch::Ingestor;
use crate::filters::{ActivityQuery, IssueState};
use crate::summary::{
    comment_summaries, dedup_by, issue_summary, pull_summaries, review_summaries,
    ActivityBundle, CommentRules, CommentSummary, IssueSummary, PrSummary, ReviewSummary,
};
use crate::types::{PullRequest, RepoSource, Repository};

impl<A: GitHubApi> Ingestor<A> {
    /// Under `Degrade`, a failed per-PR fetch yields an empty list so the row survives.
    fn degrade_pull<T>(
        &self,
        what: &str,
        pr: &PullRequest,
        fetched: Result<Vec<T>>,
    ) -> Result<Vec<T>> {
        match fetched {
            Err(e) if self.config().failure.pulls == DetailFailurePolicy::Degrade => {
                warn!("PR #{}: {} unavailable, using none: {}", pr.number, what, e);
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Resolves repository references, expanding bare organization names.
    ///
    /// Every reference is validated before any repository is listed.
    pub async fn resolve_repositories<S: AsRef<str>>(
        &self,
        refs: &[S],
    ) -> Result<Vec<Repository>> {
        let sources = refs
            .iter()
            .map(|r| RepoSource::parse(r.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let mut repos = Vec::new();
        for source in sources {
            match source {
                RepoSource::Repository(repo) => repos.push(repo),
                RepoSource::Organization(org) => repos.extend(self.org_repositories(&org).await?),
            }
        }
        Ok(repos)
    }

    pub async fn pull_summaries(
        &self,
        repos: &[Repository],
        query: &ActivityQuery,
    ) -> Result<Vec<PrSummary>> {
        let mut prs = Vec::new();

        for repo in repos {
            for pr in self.merged_pulls(repo, query).await? {
                let files = self.pull_files(repo, &pr).await;
                let files = self.degrade_pull("changed files", &pr, files)?;
                prs.push((pr, files));
            }
        }

        Ok(pull_summaries(prs, &query.window, self.paths()))
    }

    /// Reviews on merged pull requests by any author; the actor filter selects reviewers.
    pub async fn review_summaries(
        &self,
        repos: &[Repository],
        query: &ActivityQuery,
    ) -> Result<Vec<ReviewSummary>> {
        let rules = CommentRules {
            window: &query.window,
            actors: &query.actors,
            self_interaction: self.config().filtering.self_interaction,
        };
        let mut rows = Vec::new();

        for repo in repos {
            let prs = self.merged_pulls(repo, &query.all_actors()).await?;
            info!("found {} merged PRs in {} to find reviews for", prs.len(), repo);

            for pr in &prs {
                let review = self.review_comments(repo, pr).await;
                let review = self.degrade_pull("review comments", pr, review)?;
                let conversation = self.issue_comments(repo, pr.number, pr.cache_bucket()).await;
                let conversation = self.degrade_pull("conversation comments", pr, conversation)?;
                rows.extend(review_summaries(pr, &repo.name, &review, &conversation, &rules));
            }
        }

        Ok(dedup_by(rows, |r| (r.url.clone(), r.reviewer.clone())))
    }

    pub async fn issue_summaries(
        &self,
        repos: &[Repository],
        query: &ActivityQuery,
    ) -> Result<Vec<IssueSummary>> {
        let mut rows = Vec::new();

        for repo in repos {
            for issue in self.issues(repo, query, IssueState::Closed).await? {
                rows.push(issue_summary(&issue, &repo.name));
            }
        }

        Ok(dedup_by(rows, |r| r.url.clone()))
    }

    /// Comments on issues in any state; the actor filter selects commenters.
    pub async fn comment_summaries(
        &self,
        repos: &[Repository],
        query: &ActivityQuery,
    ) -> Result<Vec<CommentSummary>> {
        let rules = CommentRules {
            window: &query.window,
            actors: &query.actors,
            self_interaction: self.config().filtering.self_interaction,
        };
        let mut rows = Vec::new();

        for repo in repos {
            let issues = self.issues(repo, &query.all_actors(), IssueState::All).await?;
            info!("found {} issues in {} to check comments on", issues.len(), repo);

            for issue in &issues {
                let comments = self
                    .issue_comments(repo, issue.number, issue.cache_bucket())
                    .await?;
                rows.extend(comment_summaries(issue, &repo.name, &comments, &rules));
            }
        }

        Ok(dedup_by(rows, |r| (r.url.clone(), r.commenter.clone())))
    }

    /// All four tables for one set of repositories.
    pub async fn collect(
        &self,
        repos: &[Repository],
        query: &ActivityQuery,
    ) -> Result<ActivityBundle> {
        let bundle = ActivityBundle {
            prs: self.pull_summaries(repos, query).await?,
            reviews: self.review_summaries(repos, query).await?,
            issues: self.issue_summaries(repos, query).await?,
            comments: self.comment_summaries(repos, query).await?,
        };

        info!(
            "Collected {} PRs, {} reviews, {} issues, {} comment rows",
            bundle.prs.len(),
            bundle.reviews.len(),
            bundle.issues.len(),
            bundle.comments.len()
        );
        Ok(bundle)
    }
}
