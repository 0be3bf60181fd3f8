//! Dialog module: the voice command state machine
//!
//! Provides an explicit state machine with four states:
//! - Idle: waiting for the user to start capture
//! - Listening: speech recognition in progress
//! - AwaitingResponse: resolving an utterance (matcher, then fallback)
//! - Speaking: playing the response back

mod manager;

pub use manager::{DialogManager, DialogState};

/// Inbound events driving the dialog state machine.
///
/// Everything that can move the pipeline — UI actions forwarded over IPC
/// and adapter callbacks alike — arrives on one mpsc channel, which is
/// what serializes the session: one utterance-to-response cycle at a
/// time, by construction.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// User toggled the microphone. Only honored in `Idle`.
    StartCapture,
    /// Capture adapter produced a transcription.
    Utterance(String),
    /// Capture adapter failed.
    CaptureError(String),
    /// Capture adapter finished without producing a transcription.
    CaptureEnded,
    /// Playback adapter finished speaking.
    PlaybackComplete,
    /// User cleared the command history. Legal in every state.
    ClearHistory,
    /// User toggled speech playback. Legal in every state.
    SetVoiceOutput(bool),
    /// User forced a reset: abort the current cycle and return to `Idle`.
    Reset,
}
