//! Append-only activity log. Writes JSON Lines (one record per line):
//! `signal_received`, `order_created`, `order_executed`, and friends.
//!
//! The writer is deliberately dumb: no rotation, no buffering beyond
//! the OS, one `append` = one line = one fsync-eligible write. Callers
//! decide whether an append failure is fatal; the daemon logs it and
//! keeps serving.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One activity record as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Monotonically increasing per-writer sequence, starting at 0.
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    /// `None` for system events with no acting user.
    pub user_id: Option<Uuid>,
    /// Short event name, e.g. `signal_received`, `order_closed`.
    pub action: String,
    /// Free-form context.
    pub details: Value,
}

/// Append-only JSONL activity writer.
pub struct ActivityLog {
    path: PathBuf,
    seq: u64,
}

impl ActivityLog {
    /// Creates the writer and ensures parent directories exist.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {parent:?}"))?;
        }
        Ok(Self { path, seq: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub fn append(
        &mut self,
        user_id: Option<Uuid>,
        action: &str,
        details: Value,
    ) -> Result<ActivityRecord> {
        let record = ActivityRecord {
            seq: self.seq,
            ts_utc: Utc::now(),
            user_id,
            action: action.to_string(),
            details,
        };
        self.seq += 1;

        let line = serde_json::to_string(&record).context("serialize activity record")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open activity log {:?}", self.path))?;
        writeln!(file, "{line}").context("append activity record")?;
        Ok(record)
    }
}

/// Read a whole activity log back (tests / operator tooling).
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<ActivityRecord>> {
    let text = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read activity log {:?}", path.as_ref()))?;
    text.lines()
        .map(|line| serde_json::from_str(line).context("parse activity record"))
        .collect()
}
