//! Capture and playback adapter boundaries
//!
//! The speech engines are external collaborators; the daemon only sees
//! them through these traits. Results come back asynchronously as
//! [`PipelineEvent`]s on the dialog manager's channel.

mod simulated;

pub use simulated::{SimulatedCapture, SimulatedPlayback};

use crate::error::Result;

/// Speech-to-text boundary. One recognition attempt per `begin` call;
/// the outcome arrives as `Utterance`, `CaptureError`, or `CaptureEnded`.
pub trait CaptureAdapter: Send + Sync {
    /// Start one recognition attempt.
    fn begin(&self) -> Result<()>;

    /// Abort an in-progress recognition attempt. Results from an
    /// aborted attempt are dropped.
    fn cancel(&self);
}

/// Speech synthesis boundary. At most one outstanding `speak` call;
/// completion arrives as `PlaybackComplete`.
pub trait PlaybackAdapter: Send + Sync {
    /// Speak the given text.
    fn speak(&self, text: &str) -> Result<()>;

    /// Stop playback without waiting for completion.
    fn cancel(&self);
}
