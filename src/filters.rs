use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{PullboardError, Result};
use crate::types::GitHubUser;

/// Comments shorter than this that look like a command or a cc are ignored.
pub const LOW_SIGNAL_MAX_CHARS: usize = 64;

const BOT_LOGIN_SUFFIXES: &[&str] = &["[bot]", "-bot", "_bot", "-robot", "_robot"];
const CI_LOGIN_PREFIXES: &[&str] = &["codecov", "travis"];
const BOT_BIO_PHRASES: &[&str] = &["stale issues"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IssueState {
    Open,
    Closed,
    All,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
            IssueState::All => "all",
        }
    }

    pub fn matches(&self, state: &str) -> bool {
        match self {
            IssueState::All => true,
            _ => state.eq_ignore_ascii_case(self.as_str()),
        }
    }
}

/// Inclusive `[since, until]` range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self> {
        if since > until {
            return Err(PullboardError::ConfigError(format!(
                "since ({}) is after until ({})",
                since, until
            )));
        }
        Ok(Self { since, until })
    }

    /// Parses `now`, `now-<duration>` (e.g. `now-90d`), `YYYY-MM-DD` or RFC 3339.
    pub fn parse(since: &str, until: &str, now: DateTime<Utc>) -> Result<Self> {
        Self::new(parse_instant(since, now)?, parse_instant(until, now)?)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.since && t <= self.until
    }

    pub fn is_after(&self, t: DateTime<Utc>) -> bool {
        t > self.until
    }

    pub fn is_before(&self, t: DateTime<Utc>) -> bool {
        t < self.since
    }
}

pub fn parse_instant(expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let expr = expr.trim();
    if expr.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Some(offset) = expr.strip_prefix("now-") {
        let duration = humantime::parse_duration(offset.trim())
            .map_err(|e| PullboardError::InvalidTime(format!("{}: {}", expr, e)))?;
        let duration = chrono::Duration::from_std(duration)
            .map_err(|e| PullboardError::InvalidTime(format!("{}: {}", expr, e)))?;
        return Ok(now - duration);
    }

    if let Ok(date) = NaiveDate::parse_from_str(expr, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    DateTime::parse_from_rfc3339(expr)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PullboardError::InvalidTime(format!("{}: {}", expr, e)))
}

/// Case-insensitive set of names; an empty set matches every name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameSet {
    names: HashSet<String>,
}

pub type ActorFilter = NameSet;
pub type BranchFilter = NameSet;

impl NameSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.names.is_empty() || self.names.contains(&name.to_lowercase())
    }

    /// True when the set is empty or contains one of `names`.
    pub fn matches_any<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> bool {
        self.names.is_empty() || names.into_iter().any(|n| self.matches(n))
    }
}

/// Everything that decides which activity counts.
#[derive(Debug, Clone)]
pub struct ActivityQuery {
    pub window: TimeWindow,
    pub actors: ActorFilter,
    pub branches: BranchFilter,
}

impl ActivityQuery {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            actors: ActorFilter::default(),
            branches: BranchFilter::default(),
        }
    }

    pub fn with_actors<I, S>(mut self, actors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.actors = NameSet::new(actors);
        self
    }

    pub fn with_branches<I, S>(mut self, branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.branches = NameSet::new(branches);
        self
    }

    /// Same window and branches, no actor restriction.
    pub fn all_actors(&self) -> Self {
        Self {
            window: self.window,
            actors: ActorFilter::default(),
            branches: self.branches.clone(),
        }
    }
}

pub fn is_bot(user: &GitHubUser) -> bool {
    if user.account_type.eq_ignore_ascii_case("bot") {
        return true;
    }

    if let Some(bio) = &user.bio {
        let bio = bio.to_lowercase();
        if BOT_BIO_PHRASES.iter().any(|phrase| bio.contains(phrase)) {
            return true;
        }
    }

    is_bot_login(&user.login)
}

/// Login-only part of [`is_bot`]. Only delimited suffixes count, so
/// `botanist` or `abbot` are never treated as bots.
pub fn is_bot_login(login: &str) -> bool {
    let login = login.to_lowercase();
    BOT_LOGIN_SUFFIXES.iter().any(|s| login.ends_with(s))
        || CI_LOGIN_PREFIXES.iter().any(|p| login.starts_with(p))
}

/// Slash commands and bare cc's carry no review content.
pub fn is_low_signal_comment(body: &str) -> bool {
    let body = body.trim();
    (body.starts_with('/') || body.starts_with("cc")) && body.chars().count() < LOW_SIGNAL_MAX_CHARS
}
