//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian
//! length. A connection is either request/response or, after a
//! `Subscribe` request, a one-way notification stream of dialog events.

use serde::{Deserialize, Serialize};

use crate::dialog::DialogState;
use crate::events::DialogEvent;
use crate::history::CommandEvent;
use crate::telemetry::TelemetrySnapshot;

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Request the newest-first command history
    GetHistory,

    /// Request the latest telemetry snapshot
    GetTelemetry,

    /// Start a voice capture cycle
    StartCapture,

    /// Empty the command history
    ClearHistory,

    /// Enable or disable spoken responses
    SetVoiceOutput { enabled: bool },

    /// Abort the current cycle and return the pipeline to idle
    Reset,

    /// Turn this connection into a dialog event stream
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Command history snapshot
    History { entries: Vec<CommandEvent> },

    /// Latest telemetry snapshot
    Telemetry(TelemetrySnapshot),

    /// Action was forwarded to the pipeline. For `StartCapture` this is
    /// an acknowledgment, not a guarantee: the busy check runs against a
    /// cached state snapshot, so a request landing between a manager
    /// transition and the cache update is accepted here and dropped by
    /// the manager. Subscribers learn the authoritative outcome from
    /// whether a `state_changed` to `listening` follows.
    Accepted,

    /// Start-capture rejected: the pipeline is mid-cycle. No-op for the
    /// caller, nothing was recorded.
    Busy,

    /// Subscription confirmed; dialog events follow
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification for subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A dialog event occurred
    Event { event: DialogEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current dialog state
    pub dialog_state: DialogState,

    /// Whether spoken responses are enabled
    pub voice_output: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            dialog_state: DialogState::default(),
            voice_output: true,
            uptime_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::SetVoiceOutput { enabled: false };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("set_voice_output"));
        assert!(json.contains("false"));
    }

    #[test]
    fn test_request_deserialization() {
        let json = r#"{"type":"start_capture"}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert!(matches!(req, Request::StartCapture));
    }

    #[test]
    fn test_status_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("\"dialog_state\":\"idle\""));
    }

    #[test]
    fn test_notification_wraps_dialog_event() {
        let notif = Notification::Event {
            event: DialogEvent::StateChanged {
                from: DialogState::Idle,
                to: DialogState::Listening,
            },
        };
        let json = serde_json::to_string(&notif).unwrap();
        assert!(json.contains("state_changed"));
    }
}
