//! Task status snapshots and progress arithmetic.
//!
//! One snapshot shape covers the submission response, the poll endpoint,
//! and (via [`crate::messages`]) the push channel.

use chrono::{DateTime, Utc};
use pixelgraph_core::types::TaskId;
use serde::Deserialize;

/// Lifecycle state of an execution task.
///
/// `Queued` and `Processing` are non-terminal; `Completed` and `Failed`
/// are terminal. Status values this client does not know map to
/// `Unknown` and keep the monitor polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    /// Older engine builds report `RUNNING` for the same state.
    #[serde(alias = "RUNNING")]
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Whether this status ends the task's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A point-in-time view of an execution task.
///
/// Every incoming snapshot is authoritative for its moment; the monitor
/// keeps no merged state beyond the latest counts it observed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    /// Task identifier. Present on REST responses, absent on push
    /// payloads (those are already keyed by task).
    #[serde(default)]
    pub id: Option<TaskId>,

    pub status: TaskStatus,

    /// Nodes the engine has finished so far.
    #[serde(default)]
    pub processed_nodes: Option<i64>,

    /// Total nodes in the submitted graph.
    #[serde(default)]
    pub total_nodes: Option<i64>,

    /// Present only when the task failed.
    #[serde(default)]
    pub error_message: Option<String>,

    /// Free-form human-readable status line.
    #[serde(default)]
    pub message: Option<String>,

    /// When the snapshot was produced (UTC).
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Worker that handled the task, when the engine attributes it.
    #[serde(default)]
    pub processed_by: Option<String>,
}

impl TaskSnapshot {
    /// Progress carried by this snapshot, clamped and with a computed
    /// percentage.
    pub fn progress(&self) -> ProgressUpdate {
        ProgressUpdate::clamped(
            self.processed_nodes.unwrap_or(0),
            self.total_nodes.unwrap_or(1),
        )
    }

    /// The failure message to report, falling back to `"Task failed"`
    /// when the engine supplied none.
    pub fn error_message_or_default(&self) -> String {
        self.error_message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Task failed".to_string())
    }
}

/// A progress notification handed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub current: i64,
    pub total: i64,
    /// `round(100 * min(current, total) / max(total, 1))` -- never above
    /// 100 and never a division by zero.
    pub percent: u8,
}

impl ProgressUpdate {
    /// Build an update from raw counts, clamping `current` into
    /// `[0, total]` and `total` to at least 1.
    pub fn clamped(current: i64, total: i64) -> Self {
        let total = total.max(1);
        let current = current.clamp(0, total);
        let percent = (100.0 * current as f64 / total as f64).round() as u8;
        Self {
            current,
            total,
            percent,
        }
    }

    /// The 100% update emitted right before completion.
    pub fn finished(total: i64) -> Self {
        let total = total.max(1);
        Self {
            current: total,
            total,
            percent: 100,
        }
    }
}
