//! Per-contributor rankings computed from the summary tables.

use serde::Serialize;
use std::collections::HashMap;

use crate::filters::is_bot_login;
use crate::summary::{ActivityBundle, CommentSummary, IssueSummary, PrSummary, ReviewSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chart {
    pub id: &'static str,
    pub title: &'static str,
    /// What a bar counts, e.g. "Merged PRs".
    pub metric: &'static str,
    pub items: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub title: &'static str,
    pub charts: Vec<Chart>,
}

/// Sorts totals descending, breaking ties by name, and keeps the first `top_n`.
pub fn rank(totals: HashMap<String, u64>, top_n: usize) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = totals
        .into_iter()
        .map(|(name, count)| LeaderboardEntry { name, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    entries.truncate(top_n);
    entries
}

fn tally<'a, T: 'a>(
    rows: impl IntoIterator<Item = &'a T>,
    mut each: impl FnMut(&'a T) -> Option<(&'a str, u64)>,
) -> HashMap<String, u64> {
    let mut totals = HashMap::new();
    for (name, value) in rows.into_iter().filter_map(&mut each) {
        if name.is_empty() {
            continue;
        }
        *totals.entry(name.to_string()).or_insert(0) += value;
    }
    totals
}

fn not_self_review(r: &ReviewSummary) -> bool {
    r.reviewer != r.pr_author
}

pub fn merges(prs: &[PrSummary], top_n: usize) -> Vec<LeaderboardEntry> {
    rank(tally(prs, |p| Some((p.user.as_str(), 1))), top_n)
}

pub fn line_delta(prs: &[PrSummary], top_n: usize) -> Vec<LeaderboardEntry> {
    rank(tally(prs, |p| Some((p.user.as_str(), p.delta))), top_n)
}

pub fn lines_deleted(prs: &[PrSummary], top_n: usize) -> Vec<LeaderboardEntry> {
    rank(tally(prs, |p| Some((p.user.as_str(), p.deleted))), top_n)
}

/// Mean of added lines per merged PR, rounded down.
pub fn average_pr_size(prs: &[PrSummary], top_n: usize) -> Vec<LeaderboardEntry> {
    let mut sizes: HashMap<String, (u64, u64)> = HashMap::new();
    for p in prs {
        let entry = sizes.entry(p.user.clone()).or_insert((0, 0));
        entry.0 += p.added;
        entry.1 += 1;
    }
    let averages = sizes
        .into_iter()
        .map(|(name, (added, count))| (name, added / count))
        .collect();
    rank(averages, top_n)
}

/// Number of PRs reviewed.
pub fn reviews(rows: &[ReviewSummary], top_n: usize) -> Vec<LeaderboardEntry> {
    rank(
        tally(rows, |r| not_self_review(r).then(|| (r.reviewer.as_str(), 1))),
        top_n,
    )
}

pub fn review_words(rows: &[ReviewSummary], top_n: usize) -> Vec<LeaderboardEntry> {
    rank(
        tally(rows, |r| not_self_review(r).then(|| (r.reviewer.as_str(), r.words))),
        top_n,
    )
}

pub fn review_comments(rows: &[ReviewSummary], top_n: usize) -> Vec<LeaderboardEntry> {
    rank(
        tally(rows, |r| {
            not_self_review(r).then(|| (r.reviewer.as_str(), r.review_comments + r.pr_comments))
        }),
        top_n,
    )
}

pub fn comments(rows: &[CommentSummary], top_n: usize) -> Vec<LeaderboardEntry> {
    rank(tally(rows, |c| Some((c.commenter.as_str(), c.comments))), top_n)
}

pub fn comment_words(rows: &[CommentSummary], top_n: usize) -> Vec<LeaderboardEntry> {
    rank(
        tally(rows, |c| {
            (c.commenter != c.issue_author).then(|| (c.commenter.as_str(), c.words))
        }),
        top_n,
    )
}

/// Issues closed by someone other than their author, bots excluded.
pub fn issue_closers(rows: &[IssueSummary], top_n: usize) -> Vec<LeaderboardEntry> {
    rank(
        tally(rows, |i| {
            (i.closer != i.author && !is_bot_login(&i.closer)).then(|| (i.closer.as_str(), 1))
        }),
        top_n,
    )
}

/// Every chart of the HTML leaderboard, grouped the way it is displayed.
pub fn categories(bundle: &ActivityBundle, top_n: usize) -> Vec<Category> {
    vec![
        Category {
            title: "Reviewers",
            charts: vec![
                Chart {
                    id: "reviewCounts",
                    title: "Most Influential",
                    metric: "Reviews",
                    items: reviews(&bundle.reviews, top_n),
                },
                Chart {
                    id: "reviewWords",
                    title: "Most Helpful",
                    metric: "Review Words",
                    items: review_words(&bundle.reviews, top_n),
                },
                Chart {
                    id: "reviewComments",
                    title: "Most Demanding",
                    metric: "Review Comments",
                    items: review_comments(&bundle.reviews, top_n),
                },
            ],
        },
        Category {
            title: "Pull Requests",
            charts: vec![
                Chart {
                    id: "prCounts",
                    title: "Most Active",
                    metric: "Merged PRs",
                    items: merges(&bundle.prs, top_n),
                },
                Chart {
                    id: "prDeltas",
                    title: "Big Movers",
                    metric: "Lines Changed",
                    items: line_delta(&bundle.prs, top_n),
                },
                Chart {
                    id: "prSize",
                    title: "Most difficult to review",
                    metric: "Average PR size (added lines)",
                    items: average_pr_size(&bundle.prs, top_n),
                },
                Chart {
                    id: "prDeleted",
                    title: "Clean-up",
                    metric: "Lines Deleted",
                    items: lines_deleted(&bundle.prs, top_n),
                },
            ],
        },
        Category {
            title: "Issues",
            charts: vec![
                Chart {
                    id: "commentWords",
                    title: "Most Helpful",
                    metric: "Comment Words",
                    items: comment_words(&bundle.comments, top_n),
                },
                Chart {
                    id: "commentCounts",
                    title: "Most Active",
                    metric: "Comments",
                    items: comments(&bundle.comments, top_n),
                },
                Chart {
                    id: "issueCloser",
                    title: "Closers",
                    metric: "Issues closed",
                    items: issue_closers(&bundle.issues, top_n),
                },
            ],
        },
    ]
}
