//! Disk-backed response cache.
//!
//! Entries are never invalidated. Each key embeds a domain timestamp (merge or
//! close time) so an item that changes state is looked up under a new key.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::config::CacheConfig;
use crate::error::{PullboardError, Result};
use crate::types::Repository;

const KEY_TIME_FORMAT: &str = "%Y-%m-%dT%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    PullRequest,
    PullRequestFiles,
    PullRequestComments,
    Issue,
    IssueComments,
}

impl ItemKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ItemKind::PullRequest => "pr",
            ItemKind::PullRequestFiles => "pr-listfiles",
            ItemKind::PullRequestComments => "pr-comments",
            ItemKind::Issue => "issue",
            ItemKind::IssueComments => "issue-comments",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: ItemKind,
    pub org: String,
    pub project: String,
    pub number: u64,
    pub bucket: DateTime<Utc>,
}

impl CacheKey {
    pub fn new(kind: ItemKind, repo: &Repository, number: u64, bucket: DateTime<Utc>) -> Self {
        Self {
            kind,
            org: repo.owner.clone(),
            project: repo.name.clone(),
            number,
            bucket,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}:{}:{}",
            self.kind.prefix(),
            self.org,
            self.project,
            self.number,
            self.bucket.format(KEY_TIME_FORMAT)
        )
    }
}

/// Flat key to bytes store in a SQLite file, bounded by total payload size.
///
/// The least recently read or written entries are evicted first.
pub struct DiskCache {
    conn: Mutex<Connection>,
    max_bytes: u64,
    clock: AtomicU64,
}

impl DiskCache {
    pub fn open(dir: impl AsRef<Path>, max_bytes: u64) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join("responses.db"))?;
        info!("cache dir is {}", dir.display());
        Self::with_connection(conn, max_bytes)
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let dir = match &config.path {
            Some(path) => path.clone(),
            None => default_dir()?,
        };
        Self::open(dir, config.max_bytes)
    }

    pub fn in_memory(max_bytes: u64) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, max_bytes)
    }

    fn with_connection(conn: Connection, max_bytes: u64) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                size INTEGER NOT NULL,
                accessed INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entries_accessed ON entries(accessed);
            ",
        )?;
        let last: i64 = conn.query_row(
            "SELECT COALESCE(MAX(accessed), 0) FROM entries",
            [],
            |row| row.get(0),
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            max_bytes,
            clock: AtomicU64::new(last.max(0) as u64 + 1),
        })
    }

    fn tick(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::Relaxed) as i64
    }

    /// Any failure to read or decode is reported as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let key = key.to_string();
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(_) => {
                warn!("cache lock poisoned, treating {} as a miss", key);
                return None;
            }
        };

        let bytes: Option<Vec<u8>> = match conn
            .query_row(
                "SELECT value FROM entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("cache read failed for {}: {}", key, e);
                return None;
            }
        };
        let bytes = bytes?;

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                if let Err(e) = conn.execute(
                    "UPDATE entries SET accessed = ?1 WHERE key = ?2",
                    params![self.tick(), key],
                ) {
                    debug!("failed to touch {}: {}", key, e);
                }
                Some(value)
            }
            Err(e) => {
                debug!("cache entry {} does not decode: {}", key, e);
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        let key = key.to_string();
        let bytes = serde_json::to_vec(value)?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| PullboardError::CacheError("cache lock poisoned".to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO entries (key, value, size, accessed) VALUES (?1, ?2, ?3, ?4)",
            params![key, bytes, bytes.len() as i64, self.tick()],
        )?;
        self.evict(&conn, &key)
    }

    pub fn total_bytes(&self) -> Result<u64> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| PullboardError::CacheError("cache lock poisoned".to_string()))?;
        Self::stored_bytes(&conn)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        let Ok(conn) = self.conn.lock() else {
            return false;
        };
        conn.query_row(
            "SELECT 1 FROM entries WHERE key = ?1",
            params![key.to_string()],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .unwrap_or(false)
    }

    fn stored_bytes(conn: &Connection) -> Result<u64> {
        let total: i64 =
            conn.query_row("SELECT COALESCE(SUM(size), 0) FROM entries", [], |row| {
                row.get(0)
            })?;
        Ok(total.max(0) as u64)
    }

    fn evict(&self, conn: &Connection, keep: &str) -> Result<()> {
        let mut total = Self::stored_bytes(conn)?;
        if total <= self.max_bytes {
            return Ok(());
        }

        let victims: Vec<(String, i64)> = {
            let mut stmt = conn.prepare(
                "SELECT key, size FROM entries WHERE key != ?1 ORDER BY accessed ASC",
            )?;
            let rows = stmt.query_map(params![keep], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let victims = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            victims
        };

        let mut evicted = 0;
        for (key, size) in victims {
            if total <= self.max_bytes {
                break;
            }
            conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
            total = total.saturating_sub(size.max(0) as u64);
            evicted += 1;
        }
        debug!("evicted {} cache entries, {} bytes remain", evicted, total);
        Ok(())
    }
}

fn default_dir() -> Result<PathBuf> {
    let root = dirs::cache_dir().ok_or_else(|| {
        PullboardError::ConfigError("no user cache directory on this platform".to_string())
    })?;
    Ok(root.join("pullboard"))
}
