//! Ingestion pipeline tests
//!
//! These drive the `Ingestor` through a scripted in-memory API so paging,
//! failure handling and caching can be checked without network access.

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use pullboard::{
    ActivityQuery, BranchRef, ChangedFile, Comment, DetailFailurePolicy, DiskCache, FetchConfig,
    GitHubApi, GitHubUser, Ingestor, Issue, IssueState, ListPage, PullRequest, PullboardError,
    RepoListing, Repository, Result, TimeWindow,
};
use std::collections::HashMap;
use std::sync::Mutex;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn t(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, month, day, 12, 0, 0).unwrap()
}

fn march() -> TimeWindow {
    TimeWindow::new(t(3, 1), t(3, 31)).unwrap()
}

fn repo() -> Repository {
    Repository::new("kubernetes", "minikube")
}

fn user(login: &str) -> Option<GitHubUser> {
    Some(GitHubUser::new(login))
}

/// A merged pull request as it appears in a listing.
fn pr(number: u64, author: &str, updated: DateTime<Utc>) -> PullRequest {
    PullRequest {
        number,
        state: "closed".to_string(),
        title: Some(format!("change {}", number)),
        body: None,
        html_url: format!("https://github.com/kubernetes/minikube/pull/{}", number),
        user: user(author),
        created_at: updated,
        updated_at: updated,
        closed_at: Some(updated),
        merged_at: Some(updated),
        merged: None,
        merge_commit_sha: Some(format!("sha{}", number)),
        changed_files: None,
        additions: None,
        deletions: None,
        base: Some(BranchRef {
            name: "master".to_string(),
        }),
    }
}

fn issue(number: u64, author: &str, updated: DateTime<Utc>) -> Issue {
    Issue {
        number,
        state: "closed".to_string(),
        title: Some(format!("bug {}", number)),
        body: None,
        html_url: format!("https://github.com/kubernetes/minikube/issues/{}", number),
        user: user(author),
        closed_by: None,
        created_at: updated,
        updated_at: updated,
        closed_at: Some(updated),
        pull_request: None,
    }
}

fn comment(id: u64, author: &str, body: &str, at: DateTime<Utc>) -> Comment {
    Comment {
        id,
        user: user(author),
        body: Some(body.to_string()),
        created_at: at,
        html_url: String::new(),
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

fn page<T: Clone>(pages: &[Vec<T>], page: u32) -> ListPage<T> {
    let index = page as usize - 1;
    ListPage {
        items: pages.get(index).cloned().unwrap_or_default(),
        next_page: (index + 1 < pages.len()).then_some(page + 1),
    }
}

/// Scripted API. Detail calls return the listing record marked as merged
/// unless an override is registered; `failures` makes the next N detail
/// calls for a number fail. `listing_failures` fails the next N pull
/// listing requests and `missing_files` makes file listings always fail.
#[derive(Default)]
struct FakeApi {
    pulls: Vec<Vec<PullRequest>>,
    issues: Vec<Vec<Issue>>,
    org_repos: Vec<Vec<RepoListing>>,
    issue_details: HashMap<u64, Issue>,
    files: HashMap<u64, Vec<ChangedFile>>,
    review_comments: HashMap<u64, Vec<Comment>>,
    issue_comments: HashMap<u64, Vec<Comment>>,
    failures: Mutex<HashMap<u64, u32>>,
    listing_failures: Mutex<u32>,
    missing_files: Vec<u64>,
    pull_pages_requested: Mutex<Vec<u32>>,
    detail_calls: Mutex<Vec<u64>>,
}

impl FakeApi {
    fn fail_next(&self, number: u64, times: u32) {
        self.failures.lock().unwrap().insert(number, times);
    }

    fn check_failure(&self, number: u64) -> Result<()> {
        self.detail_calls.lock().unwrap().push(number);
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&number) {
            Some(n) if *n > 0 => {
                *n -= 1;
                Err(PullboardError::ApiError(format!("503 for #{}", number)))
            }
            _ => Ok(()),
        }
    }

    fn detail_calls(&self) -> Vec<u64> {
        self.detail_calls.lock().unwrap().clone()
    }

    fn pages_requested(&self) -> Vec<u32> {
        self.pull_pages_requested.lock().unwrap().clone()
    }
}

impl GitHubApi for FakeApi {
    async fn list_pulls(
        &self,
        _repo: &Repository,
        page_no: u32,
        _per_page: u8,
    ) -> Result<ListPage<PullRequest>> {
        self.pull_pages_requested.lock().unwrap().push(page_no);
        let mut remaining = self.listing_failures.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(PullboardError::ApiError(format!("502 for page {}", page_no)));
        }
        Ok(page(&self.pulls, page_no))
    }

    async fn list_issues(
        &self,
        _repo: &Repository,
        _state: IssueState,
        page_no: u32,
        _per_page: u8,
    ) -> Result<ListPage<Issue>> {
        Ok(page(&self.issues, page_no))
    }

    async fn get_pull(&self, _repo: &Repository, number: u64) -> Result<PullRequest> {
        self.check_failure(number)?;
        let mut detail = self
            .pulls
            .iter()
            .flatten()
            .find(|p| p.number == number)
            .cloned()
            .ok_or_else(|| PullboardError::NotFound(format!("PR #{}", number)))?;
        detail.merged = Some(detail.merged_at.is_some());
        Ok(detail)
    }

    async fn get_issue(&self, _repo: &Repository, number: u64) -> Result<Issue> {
        self.check_failure(number)?;
        if let Some(detail) = self.issue_details.get(&number) {
            return Ok(detail.clone());
        }
        self.issues
            .iter()
            .flatten()
            .find(|i| i.number == number)
            .cloned()
            .ok_or_else(|| PullboardError::NotFound(format!("issue #{}", number)))
    }

    async fn list_pull_files(&self, _repo: &Repository, number: u64) -> Result<Vec<ChangedFile>> {
        if self.missing_files.contains(&number) {
            return Err(PullboardError::ApiError(format!("files for #{} timed out", number)));
        }
        Ok(self.files.get(&number).cloned().unwrap_or_default())
    }

    async fn list_review_comments(&self, _repo: &Repository, number: u64) -> Result<Vec<Comment>> {
        Ok(self.review_comments.get(&number).cloned().unwrap_or_default())
    }

    async fn list_issue_comments(&self, _repo: &Repository, number: u64) -> Result<Vec<Comment>> {
        Ok(self.issue_comments.get(&number).cloned().unwrap_or_default())
    }

    async fn list_org_repos(
        &self,
        _org: &str,
        page_no: u32,
        _per_page: u8,
    ) -> Result<ListPage<RepoListing>> {
        Ok(page(&self.org_repos, page_no))
    }
}

fn test_config() -> FetchConfig {
    let mut config = FetchConfig::default();
    config.rate_limiting.retry_delay_ms = 0;
    config
}

fn ingestor_with(api: FakeApi, config: FetchConfig, dir: &TempDir) -> Ingestor<FakeApi> {
    init_logger();
    let cache = DiskCache::open(dir.path(), 16 * 1024 * 1024).unwrap();
    Ingestor::new(api, cache, config).unwrap()
}

fn ingestor(api: FakeApi, dir: &TempDir) -> Ingestor<FakeApi> {
    ingestor_with(api, test_config(), dir)
}

fn numbers(prs: &[PullRequest]) -> Vec<u64> {
    prs.iter().map(|p| p.number).collect()
}

#[tokio::test]
async fn test_paging_stops_at_stale_item() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi {
        pulls: vec![
            vec![pr(1, "amy", t(3, 20)), pr(2, "bob", t(3, 15))],
            // #5 is out of order behind the stale #3 and is still processed.
            vec![pr(3, "amy", t(2, 20)), pr(5, "carol", t(3, 12))],
            vec![pr(4, "amy", t(3, 10))],
        ],
        ..Default::default()
    };
    let ingestor = ingestor(api, &dir);

    let prs = assert_ok!(ingestor.merged_pulls(&repo(), &ActivityQuery::new(march())).await);

    assert_eq!(numbers(&prs), vec![1, 2, 5]);
    assert_eq!(ingestor.api().pages_requested(), vec![1, 2]);
}

#[tokio::test]
async fn test_skips_items_closed_outside_window() {
    let dir = TempDir::new().unwrap();
    let mut late = pr(6, "amy", t(4, 2));
    late.updated_at = t(4, 3);
    let mut early = pr(7, "amy", t(2, 10));
    early.updated_at = t(3, 5);
    let api = FakeApi {
        pulls: vec![vec![late, early, pr(8, "amy", t(3, 4))]],
        ..Default::default()
    };
    let ingestor = ingestor(api, &dir);

    let prs = assert_ok!(ingestor.merged_pulls(&repo(), &ActivityQuery::new(march())).await);

    assert_eq!(numbers(&prs), vec![8]);
    assert_eq!(ingestor.api().detail_calls(), vec![8]);
}

#[tokio::test]
async fn test_page_ceiling() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi {
        pulls: vec![
            vec![pr(1, "amy", t(3, 20))],
            vec![pr(2, "amy", t(3, 19))],
            vec![pr(3, "amy", t(3, 18))],
        ],
        ..Default::default()
    };
    let mut config = test_config();
    config.listing.max_pages = 2;
    let ingestor = ingestor_with(api, config, &dir);

    let prs = assert_ok!(ingestor.merged_pulls(&repo(), &ActivityQuery::new(march())).await);

    assert_eq!(numbers(&prs), vec![1, 2]);
    assert_eq!(ingestor.api().pages_requested(), vec![1, 2]);
}

#[tokio::test]
async fn test_listing_page_retried_once() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi {
        pulls: vec![vec![pr(1, "amy", t(3, 20))]],
        listing_failures: Mutex::new(1),
        ..Default::default()
    };
    let ingestor = ingestor(api, &dir);

    let prs = assert_ok!(ingestor.merged_pulls(&repo(), &ActivityQuery::new(march())).await);

    assert_eq!(numbers(&prs), vec![1]);
    assert_eq!(ingestor.api().pages_requested(), vec![1, 1]);
}

#[tokio::test]
async fn test_listing_failure_after_retry_is_returned() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi {
        pulls: vec![vec![pr(1, "amy", t(3, 20))]],
        listing_failures: Mutex::new(2),
        ..Default::default()
    };
    let ingestor = ingestor(api, &dir);

    assert_err!(ingestor.merged_pulls(&repo(), &ActivityQuery::new(march())).await);
    assert_eq!(ingestor.api().pages_requested(), vec![1, 1]);
}

#[tokio::test]
async fn test_detail_retried_once() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi {
        pulls: vec![vec![pr(1, "amy", t(3, 20))]],
        ..Default::default()
    };
    api.fail_next(1, 1);
    let ingestor = ingestor(api, &dir);

    let prs = assert_ok!(ingestor.merged_pulls(&repo(), &ActivityQuery::new(march())).await);

    assert_eq!(numbers(&prs), vec![1]);
    assert_eq!(prs[0].merged, Some(true));
    assert_eq!(ingestor.api().detail_calls(), vec![1, 1]);
}

#[tokio::test]
async fn test_pull_detail_failure_degrades() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi {
        pulls: vec![vec![pr(1, "amy", t(3, 20)), pr(2, "bob", t(3, 18))]],
        ..Default::default()
    };
    api.fail_next(1, 5);
    let ingestor = ingestor(api, &dir);

    let prs = assert_ok!(ingestor.merged_pulls(&repo(), &ActivityQuery::new(march())).await);

    // #1 falls back to its listing record, which has no `merged` field.
    assert_eq!(numbers(&prs), vec![1, 2]);
    assert_eq!(prs[0].merged, None);
    assert_eq!(prs[1].merged, Some(true));
}

#[tokio::test]
async fn test_pull_row_kept_when_detail_and_files_fail() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi {
        pulls: vec![vec![pr(1, "amy", t(3, 20)), pr(2, "bob", t(3, 18))]],
        files: HashMap::from([(2, vec![file("cmd/minikube/main.go", 12, 3)])]),
        missing_files: vec![1],
        ..Default::default()
    };
    api.fail_next(1, 5);
    let ingestor = ingestor(api, &dir);

    let rows = assert_ok!(ingestor.pull_summaries(&[repo()], &ActivityQuery::new(march())).await);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].user, "amy");
    assert_eq!(rows[0].added, 0);
    assert_eq!(rows[0].files, "");
    assert_eq!(rows[1].added, 12);
}

#[tokio::test]
async fn test_files_failure_aborts_under_abort_policy() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi {
        pulls: vec![vec![pr(1, "amy", t(3, 20))]],
        missing_files: vec![1],
        ..Default::default()
    };
    let mut config = test_config();
    config.failure.pulls = DetailFailurePolicy::Abort;
    let ingestor = ingestor_with(api, config, &dir);

    assert_err!(ingestor.pull_summaries(&[repo()], &ActivityQuery::new(march())).await);
}

#[tokio::test]
async fn test_pull_detail_failure_aborts() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi {
        pulls: vec![vec![pr(1, "amy", t(3, 20))]],
        ..Default::default()
    };
    api.fail_next(1, 5);
    let mut config = test_config();
    config.failure.pulls = DetailFailurePolicy::Abort;
    let ingestor = ingestor_with(api, config, &dir);

    assert_err!(ingestor.merged_pulls(&repo(), &ActivityQuery::new(march())).await);
    // One attempt plus one retry.
    assert_eq!(ingestor.api().detail_calls(), vec![1, 1]);
}

#[tokio::test]
async fn test_issue_detail_failure_aborts_by_default() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi {
        issues: vec![vec![issue(10, "amy", t(3, 20))]],
        ..Default::default()
    };
    api.fail_next(10, 5);
    let ingestor = ingestor(api, &dir);

    let result = ingestor
        .issues(&repo(), &ActivityQuery::new(march()), IssueState::Closed)
        .await;
    assert!(matches!(result, Err(PullboardError::ApiError(_))));
}

#[tokio::test]
async fn test_detail_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let listing = vec![vec![pr(1, "amy", t(3, 20)), pr(2, "bob", t(3, 18))]];
    let query = ActivityQuery::new(march());

    let first = ingestor(
        FakeApi {
            pulls: listing.clone(),
            ..Default::default()
        },
        &dir,
    );
    assert_ok!(first.merged_pulls(&repo(), &query).await);
    assert_ok!(first.merged_pulls(&repo(), &query).await);
    assert_eq!(first.api().detail_calls(), vec![1, 2]);
    drop(first);

    // A fresh process sees the same entries on disk.
    let second = ingestor(
        FakeApi {
            pulls: listing,
            ..Default::default()
        },
        &dir,
    );
    let prs = assert_ok!(second.merged_pulls(&repo(), &query).await);
    assert_eq!(numbers(&prs), vec![1, 2]);
    assert!(second.api().detail_calls().is_empty());
}

#[tokio::test]
async fn test_actor_branch_and_bot_filters() {
    let dir = TempDir::new().unwrap();
    let mut release = pr(3, "amy", t(3, 16));
    release.base = Some(BranchRef {
        name: "release-1.0".to_string(),
    });
    let api = FakeApi {
        pulls: vec![vec![
            pr(1, "amy", t(3, 20)),
            pr(2, "dependabot[bot]", t(3, 18)),
            release,
            pr(4, "bob", t(3, 14)),
        ]],
        ..Default::default()
    };
    let ingestor = ingestor(api, &dir);

    let all = assert_ok!(ingestor.merged_pulls(&repo(), &ActivityQuery::new(march())).await);
    assert_eq!(numbers(&all), vec![1, 3, 4]);

    let query = ActivityQuery::new(march())
        .with_actors(["AMY"])
        .with_branches(["master"]);
    let filtered = assert_ok!(ingestor.merged_pulls(&repo(), &query).await);
    assert_eq!(numbers(&filtered), vec![1]);
}

#[tokio::test]
async fn test_unmerged_pull_requests_skipped() {
    let dir = TempDir::new().unwrap();
    let mut closed = pr(2, "bob", t(3, 18));
    closed.merged_at = None;
    let api = FakeApi {
        pulls: vec![vec![pr(1, "amy", t(3, 20)), closed]],
        ..Default::default()
    };
    let ingestor = ingestor(api, &dir);

    let prs = assert_ok!(ingestor.merged_pulls(&repo(), &ActivityQuery::new(march())).await);
    assert_eq!(numbers(&prs), vec![1]);
    assert_eq!(ingestor.api().detail_calls(), vec![1]);
}

#[tokio::test]
async fn test_issue_actor_matches_closer() {
    let dir = TempDir::new().unwrap();
    let mut as_pr = issue(12, "amy", t(3, 19));
    as_pr.pull_request = Some(serde_json::json!({"url": "x"}));
    let mut closed_by_bob = issue(10, "amy", t(3, 20));
    closed_by_bob.closed_by = user("bob");
    let mut closed_by_carol = issue(11, "carol", t(3, 18));
    closed_by_carol.closed_by = user("carol");

    let api = FakeApi {
        issues: vec![vec![
            issue(10, "amy", t(3, 20)),
            issue(11, "carol", t(3, 18)),
            as_pr,
        ]],
        issue_details: HashMap::from([(10, closed_by_bob), (11, closed_by_carol)]),
        ..Default::default()
    };
    let ingestor = ingestor(api, &dir);

    let query = ActivityQuery::new(march()).with_actors(["bob"]);
    let issues = assert_ok!(ingestor.issues(&repo(), &query, IssueState::Closed).await);

    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].number, 10);
    assert_eq!(issues[0].closer(), "bob");
    assert_eq!(ingestor.api().detail_calls(), vec![10, 11]);
}

#[tokio::test]
async fn test_org_expansion() {
    let dir = TempDir::new().unwrap();
    let listing = |name: &str, archived: bool| RepoListing {
        name: name.to_string(),
        archived,
    };
    let api = FakeApi {
        org_repos: vec![
            vec![listing("minikube", false), listing("old", true)],
            vec![listing("kind", false)],
        ],
        ..Default::default()
    };
    let ingestor = ingestor(api, &dir);

    let repos = assert_ok!(
        ingestor
            .resolve_repositories(&["kubernetes-sigs", "https://github.com/google/go-github"])
            .await
    );
    let names: Vec<String> = repos.iter().map(|r| r.full_name.clone()).collect();
    assert_eq!(
        names,
        vec![
            "kubernetes-sigs/minikube",
            "kubernetes-sigs/kind",
            "google/go-github"
        ]
    );

    assert_err!(ingestor.resolve_repositories(&["a/b/c"]).await);
}

#[tokio::test]
async fn test_collect_bundle() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi {
        // #1 appears twice as the listing shifts between pages.
        pulls: vec![
            vec![pr(1, "amy", t(3, 20)), pr(2, "bob", t(3, 18))],
            vec![pr(1, "amy", t(3, 20))],
        ],
        issues: vec![vec![issue(10, "amy", t(3, 21))]],
        issue_details: HashMap::from([(10, {
            let mut i = issue(10, "amy", t(3, 21));
            i.closed_by = user("bob");
            i
        })]),
        files: HashMap::from([
            (
                1,
                vec![
                    file("pkg/minikube/start.go", 30, 4),
                    file("go.sum", 400, 0),
                    file("CHANGELOG.md", 50, 0),
                ],
            ),
            (2, vec![file("site/content/en/docs/start.md", 7, 1)]),
        ]),
        review_comments: HashMap::from([(
            1,
            vec![
                comment(1, "bob", "please rename this variable", t(3, 19)),
                comment(2, "bob", "and this one", t(3, 19)),
                comment(3, "amy", "done", t(3, 19)),
            ],
        )]),
        issue_comments: HashMap::from([
            (1, vec![comment(4, "carol", "/lgtm", t(3, 20))]),
            (
                10,
                vec![
                    comment(5, "bob", "fixed in the latest release", t(3, 21)),
                    comment(6, "k8s-ci-robot", "closing", t(3, 21)),
                ],
            ),
        ]),
        ..Default::default()
    };
    let ingestor = ingestor(api, &dir);

    let bundle = assert_ok!(ingestor.collect(&[repo()], &ActivityQuery::new(march())).await);

    assert_eq!(bundle.prs.len(), 2);
    let first = &bundle.prs[0];
    assert_eq!(first.user, "amy");
    assert_eq!(first.project, "minikube");
    assert_eq!(first.added, 40);
    assert_eq!(first.deleted, 4);
    assert_eq!(first.files, "pkg/minikube/start.go\nCHANGELOG.md");
    assert_eq!(bundle.prs[1].pr_type.as_str(), "docs");

    assert_eq!(bundle.reviews.len(), 1);
    assert_eq!(bundle.reviews[0].reviewer, "bob");
    assert_eq!(bundle.reviews[0].review_comments, 2);
    assert_eq!(bundle.reviews[0].words, 7);

    assert_eq!(bundle.issues.len(), 1);
    assert_eq!(bundle.issues[0].closer, "bob");

    assert_eq!(bundle.comments.len(), 1);
    assert_eq!(bundle.comments[0].commenter, "bob");
    assert_eq!(bundle.comments[0].issue_author, "amy");
    assert_eq!(bundle.comments[0].words, 5);
}

/// Live check against the public API (requires GITHUB_TOKEN)
#[tokio::test]
#[ignore] // Run with: cargo test --ignored -- --nocapture
async fn test_live_recent_merges() {
    if std::env::var("GITHUB_TOKEN").is_err() {
        eprintln!("Skipping: GITHUB_TOKEN not set");
        return;
    }
    init_logger();

    let dir = TempDir::new().unwrap();
    let ingestor = pullboard::PullboardBuilder::new()
        .cache_dir(dir.path())
        .build()
        .expect("Failed to create ingestor");

    let now = Utc::now();
    let window = TimeWindow::new(now - chrono::Duration::days(7), now).unwrap();
    let repo = Repository::new("tokio-rs", "axum");

    let prs = ingestor
        .pull_summaries(&[repo], &ActivityQuery::new(window))
        .await
        .expect("Should list merged PRs");
    println!("Merged PRs in the last week: {}", prs.len());
    for pr in prs.iter().take(5) {
        println!("  {} {} (+{} -{})", pr.date, pr.title, pr.added, pr.deleted);
    }

    println!("{}", ingestor.api().rate_limit_status().await.unwrap());
}
