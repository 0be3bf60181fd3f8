//! Events broadcast by the dialog manager
//!
//! Subscribers (the IPC server and its clients) receive one of these for
//! every observable pipeline change. Events are serializable so they can
//! be pushed to UI clients as-is.

use serde::{Deserialize, Serialize};

use crate::dialog::DialogState;
use crate::history::CommandEvent;

/// Events emitted by the dialog manager during a command cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogEvent {
    /// The dialog state machine moved to a new state.
    StateChanged {
        from: DialogState,
        to: DialogState,
    },

    /// An utterance finished resolving (success or error) and was
    /// recorded in the history buffer.
    CommandResolved {
        entry: CommandEvent,
    },

    /// The history buffer changed; carries the full newest-first
    /// snapshot so subscribers never reconstruct eviction locally.
    HistoryChanged {
        entries: Vec<CommandEvent>,
    },

    /// The voice output toggle changed.
    VoiceOutputChanged {
        enabled: bool,
    },
}

impl std::fmt::Display for DialogEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialogEvent::StateChanged { from, to } => {
                write!(f, "STATE_CHANGED ({from} -> {to})")
            }
            DialogEvent::CommandResolved { entry } => {
                write!(f, "COMMAND_RESOLVED ({:?})", entry.status)
            }
            DialogEvent::HistoryChanged { entries } => {
                write!(f, "HISTORY_CHANGED ({} entries)", entries.len())
            }
            DialogEvent::VoiceOutputChanged { enabled } => {
                write!(f, "VOICE_OUTPUT_CHANGED ({enabled})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = DialogEvent::StateChanged {
            from: DialogState::Idle,
            to: DialogState::Listening,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("state_changed"));
        assert!(json.contains("listening"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"voice_output_changed","enabled":false}"#;
        let event: DialogEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(
            event,
            DialogEvent::VoiceOutputChanged { enabled: false }
        ));
    }

    #[test]
    fn test_history_changed_carries_entries() {
        let event = DialogEvent::HistoryChanged {
            entries: vec![crate::history::CommandEvent::pending("hi")],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("history_changed"));
        assert!(json.contains("\"raw_input\":\"hi\""));
    }
}
