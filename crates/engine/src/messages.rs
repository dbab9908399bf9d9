//! Push-channel message types and parser.
//!
//! The engine publishes task updates over WebSocket as JSON documents
//! shaped `{"status": ..., "processedNodes": ..., "totalNodes": ...,
//! "progressPercent": ..., "message": ...}`. This module deserializes
//! them into a typed [`TaskUpdate`]. A frame that fails to parse is the
//! caller's cue to log and continue, never to stop the monitor.

use chrono::{DateTime, Utc};
use pixelgraph_core::types::TaskId;
use serde::Deserialize;

use crate::task::{TaskSnapshot, TaskStatus};

/// One task update received over the push channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub status: TaskStatus,

    #[serde(default)]
    pub processed_nodes: Option<i64>,

    #[serde(default)]
    pub total_nodes: Option<i64>,

    /// Percentage as computed by the engine. Informational; the monitor
    /// recomputes it from the counts.
    #[serde(default)]
    pub progress_percent: Option<i64>,

    /// Free-form status line; carries the failure description for
    /// `FAILED` updates.
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Worker that produced the update, when attributed.
    #[serde(default)]
    pub processed_by: Option<String>,
}

impl TaskUpdate {
    /// Convert into the snapshot shape the monitor consumes.
    ///
    /// Push payloads are keyed by subscription rather than carrying the
    /// task id, so the caller supplies it. For failed updates the
    /// free-form `message` doubles as the error description.
    pub fn into_snapshot(self, task_id: TaskId) -> TaskSnapshot {
        let error_message = if self.status == TaskStatus::Failed {
            self.message.clone()
        } else {
            None
        };
        TaskSnapshot {
            id: Some(task_id),
            status: self.status,
            processed_nodes: self.processed_nodes,
            total_nodes: self.total_nodes,
            error_message,
            message: self.message,
            timestamp: self.timestamp,
            processed_by: self.processed_by,
        }
    }
}

/// Parse a push-channel text frame into a typed update.
///
/// Returns `Err` for malformed JSON or an unexpected shape. Callers
/// should log and keep the poll fallback running.
pub fn parse_update(text: &str) -> Result<TaskUpdate, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_processing_update() {
        let json = r#"{"status":"PROCESSING","processedNodes":3,"totalNodes":12,"progressPercent":25,"message":"Processing node 4"}"#;
        let update = parse_update(json).unwrap();
        assert_eq!(update.status, TaskStatus::Processing);
        assert_eq!(update.processed_nodes, Some(3));
        assert_eq!(update.total_nodes, Some(12));
        assert_eq!(update.progress_percent, Some(25));
    }

    #[test]
    fn parse_completed_update_with_attribution() {
        let json = r#"{"status":"COMPLETED","processedNodes":12,"totalNodes":12,"progressPercent":100,"message":"Done","timestamp":"2025-06-01T12:30:00Z","processedBy":"worker-2"}"#;
        let update = parse_update(json).unwrap();
        assert_eq!(update.status, TaskStatus::Completed);
        assert_eq!(update.processed_by.as_deref(), Some("worker-2"));
        assert!(update.timestamp.is_some());
    }

    #[test]
    fn parse_minimal_update() {
        let update = parse_update(r#"{"status":"QUEUED"}"#).unwrap();
        assert_eq!(update.status, TaskStatus::Queued);
        assert!(update.processed_nodes.is_none());
    }

    #[test]
    fn failed_update_message_becomes_error() {
        let update = parse_update(r#"{"status":"FAILED","message":"node 3 exploded"}"#).unwrap();
        let snapshot = update.into_snapshot(9);
        assert_eq!(snapshot.id, Some(9));
        assert_eq!(snapshot.error_message.as_deref(), Some("node 3 exploded"));
    }

    #[test]
    fn non_failed_message_stays_informational() {
        let update = parse_update(r#"{"status":"PROCESSING","message":"warming up"}"#).unwrap();
        let snapshot = update.into_snapshot(9);
        assert!(snapshot.error_message.is_none());
        assert_eq!(snapshot.message.as_deref(), Some("warming up"));
    }

    #[test]
    fn parse_invalid_json_returns_error() {
        assert!(parse_update("not json at all").is_err());
        assert!(parse_update(r#"{"status":12}"#).is_err());
    }
}
