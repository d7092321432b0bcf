//! WorkerShard persistence.
//!
//! # Responsibilities
//! - Define the ShardStore contract: single writer per shard, many readers
//! - Persist one JSON document per worker process in a shared directory
//! - Retire dead shards without deleting their observed totals
//!
//! # Design Decisions
//! - Writes go through a temp file + rename, so a reader sees either the
//!   previous complete document or the new one, never a torn write
//! - A dead shard is renamed to `*.dead.json` and kept; its totals are
//!   observations that already happened
//! - One unreadable file never fails a whole read pass

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::metrics::registry::SampleValue;

/// One persisted sample row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardSample {
    pub metric: String,
    pub labels: Vec<String>,
    pub value: SampleValue,
}

/// The complete persisted state of one worker's shard.
///
/// `token` is minted per attach: a worker restarting under a recycled pid
/// starts a new shard that cannot be confused with its dead predecessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardSnapshot {
    pub worker_id: String,
    pub token: Uuid,
    pub samples: Vec<ShardSample>,
}

/// A shard as seen by a reader, with its live/dead status.
#[derive(Debug, Clone)]
pub struct ShardRecord {
    pub snapshot: ShardSnapshot,
    pub live: bool,
}

/// Errors from the shard persistence layer.
#[derive(Debug, Error)]
pub enum ShardError {
    #[error("shard directory `{path}`: {source}")]
    Dir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("shard write `{path}`: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("shard encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persistence contract between worker processes.
///
/// Exactly one process writes a given shard; every process may read all of
/// them at scrape time. This discipline is what removes cross-process locks.
pub trait ShardStore: Send + Sync {
    /// Replace the shard's persisted state with `shard`.
    fn write(&self, shard: &ShardSnapshot) -> Result<(), ShardError>;

    /// Read every retained shard, live and dead. Individual unreadable
    /// files are logged and skipped, never fatal.
    fn read_all(&self) -> Result<Vec<ShardRecord>, ShardError>;

    /// Flag every live shard of `worker_id` dead. Idempotent.
    fn mark_dead(&self, worker_id: &str) -> Result<(), ShardError>;
}

const LIVE_SUFFIX: &str = ".json";
const DEAD_SUFFIX: &str = ".dead.json";

/// Directory-backed shard store: one JSON file per shard.
pub struct DirShardStore {
    dir: PathBuf,
}

impl DirShardStore {
    /// Open (creating if needed) the shared shard directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ShardError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| ShardError::Dir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn live_path(&self, worker_id: &str, token: Uuid) -> PathBuf {
        self.dir.join(format!("{worker_id}-{token}{LIVE_SUFFIX}"))
    }

    fn is_live_shard(name: &str) -> bool {
        name.ends_with(LIVE_SUFFIX) && !name.ends_with(DEAD_SUFFIX)
    }
}

impl ShardStore for DirShardStore {
    fn write(&self, shard: &ShardSnapshot) -> Result<(), ShardError> {
        let path = self.live_path(&shard.worker_id, shard.token);
        let tmp = self
            .dir
            .join(format!(".{}-{}.tmp", shard.worker_id, shard.token));

        let body = serde_json::to_vec(shard)?;
        fs::write(&tmp, body).map_err(|source| ShardError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| ShardError::Write { path, source })
    }

    fn read_all(&self) -> Result<Vec<ShardRecord>, ShardError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| ShardError::Dir {
            path: self.dir.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(error) => {
                    tracing::warn!(dir = %self.dir.display(), %error, "Unreadable shard entry skipped");
                    continue;
                }
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(LIVE_SUFFIX) || name.starts_with('.') {
                continue;
            }
            let live = Self::is_live_shard(&name);
            let path = entry.path();

            let snapshot = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|body| serde_json::from_str::<ShardSnapshot>(&body).map_err(|e| e.to_string()));
            match snapshot {
                Ok(snapshot) => records.push(ShardRecord { snapshot, live }),
                Err(error) => {
                    tracing::warn!(shard = %path.display(), %error, "Unreadable shard skipped");
                }
            }
        }
        Ok(records)
    }

    fn mark_dead(&self, worker_id: &str) -> Result<(), ShardError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| ShardError::Dir {
            path: self.dir.clone(),
            source,
        })?;

        let prefix = format!("{worker_id}-");
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy().into_owned();
            if !name.starts_with(&prefix) || !Self::is_live_shard(&name) {
                continue;
            }
            let dead_name = format!(
                "{}{}",
                name.trim_end_matches(LIVE_SUFFIX),
                DEAD_SUFFIX
            );
            let from = entry.path();
            let to = self.dir.join(dead_name);
            fs::rename(&from, &to).map_err(|source| ShardError::Write { path: from, source })?;
        }
        Ok(())
    }
}
