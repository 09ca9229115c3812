//! Per-item, per-actor summary rows: the tables every output is built from.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::classify::{classify, PathPolicy, PrType};
use crate::config::SelfInteraction;
use crate::filters::{is_bot, is_low_signal_comment, ActorFilter, TimeWindow};
use crate::text::{clean_description, word_count};
use crate::types::{ChangedFile, Comment, Issue, PullRequest, Repository};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn date(t: DateTime<Utc>) -> String {
    t.format(DATE_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrSummary {
    #[serde(rename = "URL")]
    pub url: String,
    pub date: String,
    pub user: String,
    pub project: String,
    #[serde(rename = "Type")]
    pub pr_type: PrType,
    pub title: String,
    pub delta: u64,
    pub added: u64,
    pub deleted: u64,
    pub files_total: u64,
    /// Newline separated.
    pub files: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReviewSummary {
    #[serde(rename = "URL")]
    pub url: String,
    pub date: String,
    pub project: String,
    pub reviewer: String,
    #[serde(rename = "PRAuthor")]
    pub pr_author: String,
    #[serde(rename = "PRComments")]
    pub pr_comments: u64,
    pub review_comments: u64,
    pub words: u64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IssueSummary {
    #[serde(rename = "URL")]
    pub url: String,
    pub date: String,
    pub author: String,
    pub closer: String,
    pub project: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommentSummary {
    #[serde(rename = "URL")]
    pub url: String,
    pub date: String,
    pub project: String,
    pub commenter: String,
    pub issue_author: String,
    pub issue_state: String,
    pub comments: u64,
    pub words: u64,
    pub title: String,
}

/// The four tables produced by one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityBundle {
    pub prs: Vec<PrSummary>,
    pub reviews: Vec<ReviewSummary>,
    pub issues: Vec<IssueSummary>,
    pub comments: Vec<CommentSummary>,
}

/// Keeps the first row for every key.
pub fn dedup_by<T, K, F>(rows: Vec<T>, mut key: F) -> Vec<T>
where
    K: Eq + std::hash::Hash,
    F: FnMut(&T) -> K,
{
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let fresh = seen.insert(key(row));
            if !fresh {
                debug!("skipping duplicate row");
            }
            fresh
        })
        .collect()
}

/// One row per merged pull request inside the window; duplicates by URL dropped.
pub fn pull_summaries(
    prs: Vec<(PullRequest, Vec<ChangedFile>)>,
    window: &TimeWindow,
    paths: &PathPolicy,
) -> Vec<PrSummary> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for (pr, files) in prs {
        if !seen.insert(pr.html_url.clone()) {
            debug!("skipping seen pull request: {}", pr.html_url);
            continue;
        }

        let Some(completed) = pr.completed_at() else {
            debug!("skipping {}: never closed", pr.html_url);
            continue;
        };
        if !window.contains(completed) {
            debug!("skipping {}: closed at {}, outside window", pr.html_url, completed);
            continue;
        }

        let added: u64 = files.iter().map(|f| paths.credited_additions(f)).sum();
        let deleted: u64 = files.iter().map(|f| f.deletions).sum();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();

        rows.push(PrSummary {
            url: pr.html_url.clone(),
            date: date(completed),
            user: pr.author().to_string(),
            project: project_of(&pr.html_url),
            pr_type: classify(names.iter().copied()),
            title: pr.title().to_string(),
            delta: added + deleted,
            added,
            deleted,
            files_total: pr.changed_files.unwrap_or(files.len() as u64),
            files: names.join("\n"),
            description: clean_description(pr.body.as_deref().unwrap_or("")),
        });
    }

    rows
}

fn project_of(html_url: &str) -> String {
    Repository::parse(html_url.split("/pull/").next().unwrap_or(""))
        .or_else(|_| Repository::parse(html_url.split("/issues/").next().unwrap_or("")))
        .map(|r| r.name)
        .unwrap_or_default()
}

/// Rules shared by review and issue comment grouping.
#[derive(Debug, Clone)]
pub struct CommentRules<'a> {
    pub window: &'a TimeWindow,
    pub actors: &'a ActorFilter,
    pub self_interaction: SelfInteraction,
}

impl CommentRules<'_> {
    fn counts(&self, comment: &Comment, item_author: &str) -> bool {
        if !self.window.contains(comment.created_at) {
            return false;
        }
        if comment.user.as_ref().map_or(false, is_bot) {
            return false;
        }
        if !self.actors.matches(comment.author()) {
            return false;
        }
        if self.self_interaction == SelfInteraction::Exclude && comment.author() == item_author {
            return false;
        }
        if is_low_signal_comment(comment.body()) {
            debug!("ignoring tag comment: {:?}", comment.body());
            return false;
        }
        true
    }
}

/// Groups a merged pull request's comments into one row per reviewer.
pub fn review_summaries(
    pr: &PullRequest,
    project: &str,
    review_comments: &[Comment],
    issue_comments: &[Comment],
    rules: &CommentRules<'_>,
) -> Vec<ReviewSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut by_reviewer: HashMap<String, ReviewSummary> = HashMap::new();

    let tagged = review_comments
        .iter()
        .map(|c| (c, true))
        .chain(issue_comments.iter().map(|c| (c, false)));

    for (comment, is_review) in tagged {
        if !rules.counts(comment, pr.author()) {
            continue;
        }

        let reviewer = comment.author().to_string();
        let row = by_reviewer.entry(reviewer.clone()).or_insert_with(|| {
            order.push(reviewer.clone());
            ReviewSummary {
                url: pr.html_url.clone(),
                date: String::new(),
                project: project.to_string(),
                reviewer: reviewer.clone(),
                pr_author: pr.author().to_string(),
                pr_comments: 0,
                review_comments: 0,
                words: 0,
                title: pr.title().to_string(),
            }
        });

        if is_review {
            row.review_comments += 1;
        } else {
            row.pr_comments += 1;
        }
        row.words += word_count(comment.body()) as u64;
        let day = date(comment.created_at);
        if day > row.date {
            row.date = day;
        }
    }

    order
        .into_iter()
        .filter_map(|r| by_reviewer.remove(&r))
        .collect()
}

/// Groups an issue's comments into one row per commenter.
pub fn comment_summaries(
    issue: &Issue,
    project: &str,
    comments: &[Comment],
    rules: &CommentRules<'_>,
) -> Vec<CommentSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut by_commenter: HashMap<String, CommentSummary> = HashMap::new();

    for comment in comments {
        if !rules.counts(comment, issue.author()) {
            continue;
        }

        let commenter = comment.author().to_string();
        let row = by_commenter.entry(commenter.clone()).or_insert_with(|| {
            order.push(commenter.clone());
            CommentSummary {
                url: issue.html_url.clone(),
                date: String::new(),
                project: project.to_string(),
                commenter: commenter.clone(),
                issue_author: issue.author().to_string(),
                issue_state: issue.state.clone(),
                comments: 0,
                words: 0,
                title: issue.title().to_string(),
            }
        });

        row.comments += 1;
        row.words += word_count(comment.body()) as u64;
        let day = date(comment.created_at);
        if day > row.date {
            row.date = day;
        }
    }

    order
        .into_iter()
        .filter_map(|c| by_commenter.remove(&c))
        .collect()
}

pub fn issue_summary(issue: &Issue, project: &str) -> IssueSummary {
    IssueSummary {
        url: issue.html_url.clone(),
        date: date(issue.cache_bucket()),
        author: issue.author().to_string(),
        closer: issue.closer().to_string(),
        project: project.to_string(),
        title: issue.title().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::types::GitHubUser;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, day, 12, 0, 0).unwrap()
    }

    fn window() -> TimeWindow {
        TimeWindow::new(at(2), at(28)).unwrap()
    }

    fn pr(number: u64, author: &str) -> PullRequest {
        PullRequest {
            number,
            state: "closed".to_string(),
            title: Some(format!("PR {}", number)),
            body: Some("<!-- template -->Does a thing".to_string()),
            html_url: format!("https://github.com/google/pullsheet/pull/{}", number),
            user: Some(GitHubUser::new(author)),
            created_at: at(2),
            updated_at: at(6),
            closed_at: Some(at(5)),
            merged_at: Some(at(5)),
            merged: Some(true),
            merge_commit_sha: Some("abc".to_string()),
            changed_files: None,
            additions: None,
            deletions: None,
            base: None,
        }
    }

    fn file(name: &str, additions: u64, deletions: u64) -> ChangedFile {
        ChangedFile {
            filename: name.to_string(),
            status: "modified".to_string(),
            additions,
            deletions,
            changes: additions + deletions,
        }
    }

    fn comment(id: u64, author: &str, body: &str, day: u32) -> Comment {
        Comment {
            id,
            user: Some(GitHubUser::new(author)),
            body: Some(body.to_string()),
            created_at: at(day),
            html_url: String::new(),
        }
    }

    #[test]
    fn test_pull_summaries_dedup_and_totals() {
        let paths = PathPolicy::new(&FilterConfig::default()).unwrap();
        let files = vec![
            file("cmd/root.go", 20, 5),
            file("CHANGELOG.md", 300, 0),
        ];
        let rows = pull_summaries(
            vec![(pr(1, "alice"), files.clone()), (pr(1, "alice"), files)],
            &window(),
            &paths,
        );

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.added, 30);
        assert_eq!(row.deleted, 5);
        assert_eq!(row.delta, 35);
        assert_eq!(row.files_total, 2);
        assert_eq!(row.pr_type, PrType::Backend);
        assert_eq!(row.project, "pullsheet");
        assert_eq!(row.date, "2021-03-05");
        assert_eq!(row.description, "Does a thing");
        assert_eq!(row.files, "cmd/root.go\nCHANGELOG.md");
    }

    #[test]
    fn test_pull_summaries_window() {
        let paths = PathPolicy::new(&FilterConfig::default()).unwrap();
        let mut late = pr(2, "bob");
        late.merged_at = Some(Utc.with_ymd_and_hms(2021, 4, 2, 0, 0, 0).unwrap());
        let rows = pull_summaries(vec![(late, vec![])], &window(), &paths);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_review_grouping_by_item_and_actor() {
        let actors = ActorFilter::default();
        let w = window();
        let rules = CommentRules {
            window: &w,
            actors: &actors,
            self_interaction: SelfInteraction::Exclude,
        };
        let review = vec![
            comment(1, "bob", "Please rename this variable", 6),
            comment(2, "bob", "nit: typo", 7),
            comment(3, "alice", "Done, thanks", 8),
        ];
        let conversation = vec![
            comment(4, "carol", "Looks good to me", 9),
            comment(5, "bob", "/lgtm", 9),
            comment(6, "k8s-ci-robot", "All tests passed", 9),
            comment(7, "carol", "ancient history", 1),
        ];

        let rows = review_summaries(&pr(1, "alice"), "pullsheet", &review, &conversation, &rules);

        assert_eq!(rows.len(), 2);
        let bob = rows.iter().find(|r| r.reviewer == "bob").unwrap();
        assert_eq!(bob.review_comments, 2);
        assert_eq!(bob.pr_comments, 0);
        assert_eq!(bob.words, 6);
        assert_eq!(bob.date, "2021-03-07");
        assert_eq!(bob.pr_author, "alice");

        let carol = rows.iter().find(|r| r.reviewer == "carol").unwrap();
        assert_eq!(carol.pr_comments, 1);
        assert_eq!(carol.review_comments, 0);
    }

    #[test]
    fn test_self_interaction_included_when_configured() {
        let actors = ActorFilter::default();
        let w = window();
        let rules = CommentRules {
            window: &w,
            actors: &actors,
            self_interaction: SelfInteraction::Include,
        };
        let review = vec![comment(3, "alice", "Done, thanks", 8)];
        let rows = review_summaries(&pr(1, "alice"), "pullsheet", &review, &[], &rules);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reviewer, "alice");
    }

    #[test]
    fn test_comment_summaries_actor_filter() {
        let actors = ActorFilter::new(["Dave"]);
        let w = window();
        let rules = CommentRules {
            window: &w,
            actors: &actors,
            self_interaction: SelfInteraction::Exclude,
        };
        let issue = Issue {
            number: 9,
            state: "open".to_string(),
            title: Some(" Crash on start ".to_string()),
            body: None,
            html_url: "https://github.com/google/pullsheet/issues/9".to_string(),
            user: Some(GitHubUser::new("erin")),
            closed_by: None,
            created_at: at(2),
            updated_at: at(10),
            closed_at: None,
            pull_request: None,
        };
        let comments = vec![
            comment(1, "dave", "Can you share the logs?", 3),
            comment(2, "erin", "Here they are", 4),
            comment(3, "dave", "Fixed in the next release", 5),
        ];

        let rows = comment_summaries(&issue, "pullsheet", &comments, &rules);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].commenter, "dave");
        assert_eq!(rows[0].comments, 2);
        assert_eq!(rows[0].words, 10);
        assert_eq!(rows[0].title, "Crash on start");
        assert_eq!(rows[0].issue_state, "open");
    }

    #[test]
    fn test_dedup_by_keeps_first() {
        let rows = vec![("a", 1), ("b", 2), ("a", 3)];
        assert_eq!(dedup_by(rows, |r| r.0), vec![("a", 1), ("b", 2)]);
    }
}
