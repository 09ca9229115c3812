//! A long-lived leaderboard job that serves the latest good snapshot.

use chrono::{DateTime, Utc};
use log::{error, info};
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::api::GitHubApi;
use crate::error::Result;
use crate::fetch::Ingestor;
use crate::filters::{ActivityQuery, TimeWindow};
use crate::render::{render_html, LeaderboardOptions};
use crate::summary::ActivityBundle;

#[derive(Debug, Clone)]
pub struct JobOptions {
    /// `org/project` references or bare organization names.
    pub repos: Vec<String>,
    pub users: Vec<String>,
    pub branches: Vec<String>,
    pub window: TimeWindow,
    pub title: String,
    pub top_n: usize,
}

impl JobOptions {
    pub fn query(&self) -> ActivityQuery {
        ActivityQuery::new(self.window)
            .with_actors(&self.users)
            .with_branches(&self.branches)
    }
}

/// An immutable aggregated bundle. Version 0 is the empty starting state.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub version: u64,
    pub bundle: ActivityBundle,
    pub refreshed_at: Option<DateTime<Utc>>,
}

pub struct Job {
    opts: JobOptions,
    state: Mutex<Arc<Snapshot>>,
}

impl Job {
    pub fn new(opts: JobOptions) -> Self {
        Self {
            opts,
            state: Mutex::new(Arc::new(Snapshot::default())),
        }
    }

    pub fn options(&self) -> &JobOptions {
        &self.opts
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Builds a bundle with `build` and swaps it in.
    ///
    /// The lock is only held for the swap. On failure the error is logged and
    /// the previous snapshot keeps being served.
    pub async fn refresh_with<F, Fut>(&self, build: F) -> Result<Arc<Snapshot>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ActivityBundle>>,
    {
        let bundle = match build().await {
            Ok(bundle) => bundle,
            Err(e) => {
                error!("refreshing {:?} failed: {}", self.opts.title, e);
                return Err(e);
            }
        };

        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = Arc::new(Snapshot {
            version: guard.version + 1,
            bundle,
            refreshed_at: Some(Utc::now()),
        });
        *guard = Arc::clone(&next);

        info!("{:?} updated to version {}", self.opts.title, next.version);
        Ok(next)
    }

    /// Re-ingests every configured repository.
    pub async fn update<A: GitHubApi>(&self, ingestor: &Ingestor<A>) -> Result<Arc<Snapshot>> {
        self.refresh_with(|| async {
            let repos = ingestor.resolve_repositories(&self.opts.repos).await?;
            ingestor.collect(&repos, &self.opts.query()).await
        })
        .await
    }

    /// HTML leaderboard for the current snapshot.
    pub fn render(&self) -> Result<String> {
        let snapshot = self.snapshot();
        let options = LeaderboardOptions {
            title: self.opts.title.clone(),
            window: self.opts.window,
            disable_caching: true,
            command: None,
            top_n: self.opts.top_n,
        };
        render_html(&options, &snapshot.bundle)
    }
}
