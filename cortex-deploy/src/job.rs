//! Job types: kind, status and the durable summary row (spec.md §4.10).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const LOG_TAIL_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKindTag {
    ExportInstance,
    ExportModel,
    ImportModel,
    RestoreDatabase,
}

/// What the job is doing, with the data it needs to do it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    ExportInstance,
    ExportModel { model_id: i64 },
    ImportModel { manifest_path: String },
    RestoreDatabase { archive_path: String },
}

impl JobKind {
    pub fn tag(&self) -> JobKindTag {
        match self {
            JobKind::ExportInstance => JobKindTag::ExportInstance,
            JobKind::ExportModel { .. } => JobKindTag::ExportModel,
            JobKind::ImportModel { .. } => JobKindTag::ImportModel,
            JobKind::RestoreDatabase { .. } => JobKindTag::RestoreDatabase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// The durable, queryable view of a job. Persisted to `config_kv` after
/// every meaningful update so a status query during the job (or right
/// after a restart) sees the last known state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: i64,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: f64,
    pub step: String,
    pub bytes_written: u64,
    pub total_bytes: Option<u64>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub log_tail: VecDeque<String>,
}

impl JobSummary {
    pub fn new(id: i64, kind: JobKind, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Pending,
            progress: 0.0,
            step: "queued".to_string(),
            bytes_written: 0,
            total_bytes: None,
            error: None,
            started_at: now,
            updated_at: now,
            log_tail: VecDeque::with_capacity(LOG_TAIL_CAPACITY),
        }
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        if self.log_tail.len() == LOG_TAIL_CAPACITY {
            self.log_tail.pop_front();
        }
        self.log_tail.push_back(line.into());
    }

    /// Seconds remaining, projected from the bytes-written rate so far.
    /// `None` until both a total and meaningful progress are known.
    pub fn eta_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        let total = self.total_bytes?;
        if self.bytes_written == 0 || total == 0 {
            return None;
        }
        let elapsed = (now - self.started_at).num_seconds().max(1);
        let rate = self.bytes_written as f64 / elapsed as f64;
        if rate <= 0.0 {
            return None;
        }
        let remaining_bytes = total.saturating_sub(self.bytes_written) as f64;
        Some((remaining_bytes / rate) as i64)
    }
}
