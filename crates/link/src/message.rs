//! The envelope exchanged over the persistent link (spec §4.12): a single
//! tagged enum so both ends can `serde_json::from_slice` into one type and
//! match on `type` without a separate routing step.

use serde::{Deserialize, Serialize};

/// One frame of the daemon↔controller protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Initial registration: daemon → controller, once per connection.
    DaemonConfig {
        daemon_id: String,
        capabilities: Vec<String>,
    },

    /// `inserted` / `ejected`, broadcast onward to browser clients.
    DiscEvent {
        drive_id: String,
        kind: DiscEventKind,
        fingerprint: Option<String>,
    },

    /// Streamed from a driver; forwarded verbatim to browsers.
    Progress {
        task_id: String,
        percent: f64,
        eta_seconds: Option<u64>,
        bytes: Option<u64>,
        speed: Option<String>,
    },

    /// Periodic liveness + queue summary, daemon → controller.
    Heartbeat {
        queue_depth: u32,
        current_task_id: Option<String>,
        paused: bool,
    },

    /// Full state snapshot emitted once on reconnection. No message replay
    /// is attempted; the next heartbeat is what converges ongoing state.
    Sync {
        disc_state: serde_json::Value,
        current_task_id: Option<String>,
        percent: Option<f64>,
        paused: bool,
        queue_depth: u32,
    },

    /// RPC call, controller → daemon, correlated by `request_id`.
    Request {
        request_id: String,
        method: String,
        #[serde(default)]
        params: serde_json::Value,
    },

    /// RPC reply, daemon → controller, correlated by `request_id`.
    Response {
        request_id: String,
        #[serde(flatten)]
        outcome: RpcOutcome,
    },

    /// Instructs the daemon to refetch configuration from the controller.
    ConfigUpdated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscEventKind {
    Inserted,
    Ejected,
}

/// Either a `result` or an `error`, never both — matches the wire shape in
/// spec §4.12's RPC table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RpcOutcome {
    Result { result: serde_json::Value },
    Error { error: RpcError },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

impl RpcError {
    pub fn unknown_method(method: &str) -> Self {
        Self {
            code: "unknown_method".to_string(),
            message: format!("no handler registered for method `{method}`"),
        }
    }

    pub fn handler_error(detail: impl Into<String>) -> Self {
        Self {
            code: "handler_error".to_string(),
            message: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_type_tag() {
        let msg = Message::Request {
            request_id: "r1".to_string(),
            method: "get_drives".to_string(),
            params: serde_json::json!({}),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "request");
        assert_eq!(json["method"], "get_drives");
    }

    #[test]
    fn response_round_trips_error_outcome() {
        let msg = Message::Response {
            request_id: "r1".to_string(),
            outcome: RpcOutcome::Error {
                error: RpcError::unknown_method("frobnicate"),
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn disc_event_kind_is_snake_case_on_wire() {
        let msg = Message::DiscEvent {
            drive_id: "d0".to_string(),
            kind: DiscEventKind::Ejected,
            fingerprint: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "ejected");
    }
}
