//! Task model (spec §3 "Task", §4.1).

use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Scan,
    Rip,
    Transcode,
    Insert,
}

impl TaskKind {
    /// kind → owner routing rule (spec §4.1 "Routing rule").
    pub fn owner(self) -> Owner {
        match self {
            TaskKind::Scan | TaskKind::Rip => Owner::Daemon,
            TaskKind::Transcode | TaskKind::Insert => Owner::Controller,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Scan => "scan",
            TaskKind::Rip => "rip",
            TaskKind::Transcode => "transcode",
            TaskKind::Insert => "insert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Owner {
    Daemon,
    Controller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    InProgress,
    Success,
    Failed,
}

/// Kind-specific payload carried alongside the base task fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind_payload", rename_all = "snake_case")]
pub enum TaskPayload {
    Scan {
        disc_fingerprint: Option<String>,
        device: PathBuf,
    },
    Rip {
        disc_fingerprint: String,
        track_number: u32,
    },
    Transcode {
        disc_fingerprint: String,
        track_number: u32,
        preset_name: String,
    },
    Insert {
        disc_fingerprint: String,
        track_number: u32,
    },
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Scan { .. } => TaskKind::Scan,
            TaskPayload::Rip { .. } => TaskKind::Rip,
            TaskPayload::Transcode { .. } => TaskKind::Transcode,
            TaskPayload::Insert { .. } => TaskKind::Insert,
        }
    }
}

/// A task as persisted under `queued/`, `in_progress/`, `complete/`, or
/// `failed/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub created_at: String,
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    #[serde(flatten)]
    pub payload: TaskPayload,
}

impl Task {
    /// A task is ready to claim only if `input` is null or resolves to an
    /// existing regular file (spec §4.1 "Dependency rule").
    pub fn is_ready(&self) -> bool {
        match &self.input {
            None => true,
            Some(path) => path.is_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// The terminal record written to `complete/` (and `failed/` on failure).
/// Carries `kind` alongside the outcome so a reader of `complete/` (the
/// controller's scan-ingestion loop, in particular) can tell which task
/// kind produced a given record without having to keep the original
/// `Task` around — `complete()` only ever persists the `Completion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub task_id: String,
    pub kind: TaskKind,
    pub status: OutcomeStatus,
    pub started_at: String,
    pub completed_at: String,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl Completion {
    pub fn success(
        task_id: impl Into<String>,
        kind: TaskKind,
        started_at: impl Into<String>,
        completed_at: impl Into<String>,
        duration_seconds: f64,
        result: serde_json::Value,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            status: OutcomeStatus::Success,
            started_at: started_at.into(),
            completed_at: completed_at.into(),
            duration_seconds,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(
        task_id: impl Into<String>,
        kind: TaskKind,
        started_at: impl Into<String>,
        completed_at: impl Into<String>,
        duration_seconds: f64,
        error: TaskError,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            status: OutcomeStatus::Failed,
            started_at: started_at.into(),
            completed_at: completed_at.into(),
            duration_seconds,
            result: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_matches_spec_table() {
        assert_eq!(TaskKind::Scan.owner(), Owner::Daemon);
        assert_eq!(TaskKind::Rip.owner(), Owner::Daemon);
        assert_eq!(TaskKind::Transcode.owner(), Owner::Controller);
        assert_eq!(TaskKind::Insert.owner(), Owner::Controller);
    }

    #[test]
    fn ready_when_input_is_null() {
        let task = Task {
            id: "t1".into(),
            kind: TaskKind::Rip,
            created_at: "now".into(),
            input: None,
            output: PathBuf::from("/out"),
            payload: TaskPayload::Rip {
                disc_fingerprint: "fp".into(),
                track_number: 0,
            },
        };
        assert!(task.is_ready());
    }
}
