//! The stable error taxonomy shared across the queue, drivers, and the
//! link (spec §7). These codes cross process and wire boundaries, so they
//! are plain strings rather than a `thiserror` enum with a `Display` impl
//! that a future refactor could quietly reword.

use serde::{Deserialize, Serialize};

/// One of the stable, wire-stable error codes from spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DiscEjected,
    DiscUnreadable,
    MakemkvFailed,
    MakemkvTimeout,
    OutputWriteFailed,
    TaskCancelled,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::DiscEjected => "DISC_EJECTED",
            ErrorCode::DiscUnreadable => "DISC_UNREADABLE",
            ErrorCode::MakemkvFailed => "MAKEMKV_FAILED",
            ErrorCode::MakemkvTimeout => "MAKEMKV_TIMEOUT",
            ErrorCode::OutputWriteFailed => "OUTPUT_WRITE_FAILED",
            ErrorCode::TaskCancelled => "TASK_CANCELLED",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A task-terminal error: the code plus a human-readable message and an
/// optional diagnostic blob (e.g. ffmpeg stderr tail, a filesystem errno).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TaskError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for TaskError {}
