//! Error types for the voice pipeline

/// Errors produced inside the voice command pipeline.
///
/// None of these are fatal to the daemon: every variant is handled by
/// returning the dialog to `Idle` within one utterance cycle.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Speech recognition engine failure.
    #[error("capture error: {0}")]
    Capture(String),

    /// Remote completion endpoint failed: network, timeout, non-2xx
    /// status, or a malformed response body.
    #[error("fallback unavailable: {0}")]
    FallbackUnavailable(String),

    /// Speech synthesis failure.
    #[error("playback error: {0}")]
    Playback(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;
