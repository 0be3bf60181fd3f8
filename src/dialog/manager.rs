//! Dialog manager implementation
//!
//! Owns the dialog state, the command history, and the resolution path
//! for each utterance: catalog matcher first, remote fallback on a miss,
//! degraded reply when no fallback is configured. Runs as a single task
//! consuming [`PipelineEvent`]s, so there is never more than one
//! utterance in flight.

use std::sync::Arc;
use std::time::Instant;

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::adapters::{CaptureAdapter, PlaybackAdapter};
use crate::catalog::Catalog;
use crate::config::{HISTORY_CAPACITY, HISTORY_WINDOW_SECS};
use crate::events::DialogEvent;
use crate::fallback::{degraded_response, FallbackClient, APOLOGY_RESPONSE};
use crate::history::{CommandEvent, HistoryBuffer};

use super::PipelineEvent;

/// Input text recorded when the capture engine fails.
const CAPTURE_ERROR_INPUT: &str = "Error recognizing speech";

/// The four states of the voice pipeline. One global value, never
/// per-event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogState {
    /// Waiting for the user to start capture
    Idle,
    /// Speech recognition in progress
    Listening,
    /// Resolving an utterance (the only state with a suspension point)
    AwaitingResponse,
    /// Playing the response back
    Speaking,
}

impl Default for DialogState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for DialogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialogState::Idle => write!(f, "Idle"),
            DialogState::Listening => write!(f, "Listening"),
            DialogState::AwaitingResponse => write!(f, "AwaitingResponse"),
            DialogState::Speaking => write!(f, "Speaking"),
        }
    }
}

/// The state machine coordinating capture, resolution, and playback
pub struct DialogManager {
    /// Current state
    state: DialogState,
    /// Bounded, time-windowed record of resolved commands
    history: HistoryBuffer,
    /// Recognized command patterns, read-only
    catalog: Arc<Catalog>,
    /// Remote completion client; `None` means degraded mode
    fallback: Option<FallbackClient>,
    /// Whether responses are spoken aloud
    voice_output: bool,
    /// Speech recognition boundary
    capture: Arc<dyn CaptureAdapter>,
    /// Speech synthesis boundary
    playback: Arc<dyn PlaybackAdapter>,
    /// Time when the current non-Idle state was entered
    state_entered_at: Option<Instant>,
    /// Channel for emitting dialog events to subscribers
    event_tx: broadcast::Sender<DialogEvent>,
}

impl DialogManager {
    /// Create a new dialog manager
    pub fn new(
        catalog: Arc<Catalog>,
        fallback: Option<FallbackClient>,
        voice_output: bool,
        capture: Arc<dyn CaptureAdapter>,
        playback: Arc<dyn PlaybackAdapter>,
        event_tx: broadcast::Sender<DialogEvent>,
    ) -> Self {
        Self {
            state: DialogState::Idle,
            history: HistoryBuffer::new(
                HISTORY_CAPACITY,
                ChronoDuration::seconds(HISTORY_WINDOW_SECS),
            ),
            catalog,
            fallback,
            voice_output,
            capture,
            playback,
            state_entered_at: None,
            event_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> DialogState {
        self.state
    }

    /// Whether speech playback is currently enabled
    pub fn voice_output(&self) -> bool {
        self.voice_output
    }

    /// Newest-first snapshot of the history buffer
    pub fn history_snapshot(&mut self) -> Vec<CommandEvent> {
        self.history.snapshot()
    }

    /// Run the dialog manager, processing pipeline events
    pub async fn run(&mut self, mut rx: mpsc::Receiver<PipelineEvent>) {
        info!(fallback = self.fallback.is_some(), "dialog manager started in Idle state");

        while let Some(event) = rx.recv().await {
            self.step(event, &mut rx).await;
        }

        info!("dialog manager stopped");
    }

    /// Process one pipeline event. The receiver is threaded through so
    /// the fallback await can keep servicing control events.
    pub(crate) async fn step(
        &mut self,
        event: PipelineEvent,
        rx: &mut mpsc::Receiver<PipelineEvent>,
    ) {
        match event {
            PipelineEvent::StartCapture => self.handle_start_capture(),
            PipelineEvent::Utterance(text) => self.handle_utterance(text, rx).await,
            PipelineEvent::CaptureError(reason) => self.handle_capture_error(&reason),
            PipelineEvent::CaptureEnded => self.handle_capture_ended(),
            PipelineEvent::PlaybackComplete => self.handle_playback_complete(),
            PipelineEvent::ClearHistory => self.clear_history(),
            PipelineEvent::SetVoiceOutput(enabled) => self.set_voice_output(enabled),
            PipelineEvent::Reset => self.handle_reset(),
        }
    }

    /// Idle -> Listening. Rejected as a no-op in any other state: the
    /// input is dropped, no event is recorded.
    fn handle_start_capture(&mut self) {
        if self.state != DialogState::Idle {
            debug!(state = %self.state, "start capture rejected while busy");
            return;
        }

        self.transition_to(DialogState::Listening);

        if let Err(e) = self.capture.begin() {
            warn!(error = %e, "capture failed to start");
            let mut event = CommandEvent::pending(CAPTURE_ERROR_INPUT);
            event.resolve_error(None);
            self.record(event);
            self.transition_to(DialogState::Idle);
        }
    }

    /// Listening -> AwaitingResponse -> (Speaking | Idle).
    async fn handle_utterance(&mut self, text: String, rx: &mut mpsc::Receiver<PipelineEvent>) {
        if self.state != DialogState::Listening {
            debug!(state = %self.state, "utterance ignored outside Listening");
            return;
        }

        self.transition_to(DialogState::AwaitingResponse);

        let mut event = CommandEvent::pending(text.clone());

        if let Some(def) = self.catalog.find_match(&text) {
            debug!(pattern = %def.pattern, category = %def.category, "catalog match");
            event.resolve_matched(def);
        } else if let Some(client) = self.fallback.clone() {
            let cancelled = self.resolve_remote(&client, &text, &mut event, rx).await;
            if cancelled {
                self.record(event);
                self.transition_to(DialogState::Idle);
                return;
            }
        } else {
            debug!("no catalog match and no fallback configured, degraded reply");
            event.resolve_generated(degraded_response(&text));
        }

        self.finish_cycle(event);
    }

    /// Await the remote completion, servicing control events meanwhile.
    /// Returns true when the cycle was cancelled by a reset; the event
    /// is then already resolved as an error.
    async fn resolve_remote(
        &mut self,
        client: &FallbackClient,
        text: &str,
        event: &mut CommandEvent,
        rx: &mut mpsc::Receiver<PipelineEvent>,
    ) -> bool {
        let fut = client.complete(text);
        tokio::pin!(fut);

        loop {
            tokio::select! {
                result = &mut fut => {
                    match result {
                        Ok(reply) => event.resolve_generated(reply),
                        Err(e) => {
                            warn!(error = %e, "fallback unavailable");
                            event.resolve_error(Some(APOLOGY_RESPONSE.to_owned()));
                        }
                    }
                    return false;
                }

                maybe = rx.recv() => match maybe {
                    Some(PipelineEvent::Reset) => {
                        // Drop the in-flight request; its late result is
                        // discarded with the future.
                        info!("reset while awaiting fallback, cancelling");
                        event.resolve_error(Some(APOLOGY_RESPONSE.to_owned()));
                        return true;
                    }
                    Some(PipelineEvent::ClearHistory) => self.clear_history(),
                    Some(PipelineEvent::SetVoiceOutput(enabled)) => {
                        self.set_voice_output(enabled);
                    }
                    Some(PipelineEvent::StartCapture) => {
                        debug!("start capture rejected while awaiting response");
                    }
                    Some(other) => {
                        debug!(?other, "event ignored while awaiting response");
                    }
                    None => {
                        // Channel closed under us; resolve and let the
                        // run loop exit.
                        event.resolve_error(Some(APOLOGY_RESPONSE.to_owned()));
                        return false;
                    }
                },
            }
        }
    }

    /// Record the resolved event and either speak the response or go
    /// straight back to Idle.
    fn finish_cycle(&mut self, event: CommandEvent) {
        let response = event.response.clone();
        self.record(event);

        if self.voice_output {
            if let Some(text) = response {
                match self.playback.speak(&text) {
                    Ok(()) => {
                        self.transition_to(DialogState::Speaking);
                        return;
                    }
                    Err(e) => warn!(error = %e, "playback failed, skipping speech"),
                }
            }
        }

        self.transition_to(DialogState::Idle);
    }

    /// Listening -> Idle with an error-status event and no response.
    fn handle_capture_error(&mut self, reason: &str) {
        if self.state != DialogState::Listening {
            debug!(state = %self.state, reason, "capture error ignored outside Listening");
            return;
        }

        warn!(reason, "speech recognition error");
        let mut event = CommandEvent::pending(CAPTURE_ERROR_INPUT);
        event.resolve_error(None);
        self.record(event);
        self.transition_to(DialogState::Idle);
    }

    /// Capture finished without a transcription: quiet return to Idle.
    fn handle_capture_ended(&mut self) {
        if self.state == DialogState::Listening {
            debug!("capture ended without a transcription");
            self.transition_to(DialogState::Idle);
        }
    }

    /// Speaking -> Idle.
    fn handle_playback_complete(&mut self) {
        if self.state == DialogState::Speaking {
            self.transition_to(DialogState::Idle);
        } else {
            debug!(state = %self.state, "stray playback completion ignored");
        }
    }

    /// Force the pipeline back to Idle from any state.
    fn handle_reset(&mut self) {
        match self.state {
            DialogState::Idle => {}
            DialogState::Listening => {
                self.capture.cancel();
                self.transition_to(DialogState::Idle);
            }
            // AwaitingResponse resets are handled inside resolve_remote;
            // reaching here means no fallback call was in flight.
            DialogState::AwaitingResponse => self.transition_to(DialogState::Idle),
            DialogState::Speaking => {
                self.playback.cancel();
                self.transition_to(DialogState::Idle);
            }
        }
    }

    /// Empty the history buffer. Legal in every state and leaves the
    /// dialog state untouched.
    fn clear_history(&mut self) {
        self.history.clear();
        info!("command history cleared");
        let _ = self.event_tx.send(DialogEvent::HistoryChanged { entries: vec![] });
    }

    fn set_voice_output(&mut self, enabled: bool) {
        if self.voice_output != enabled {
            info!(enabled, "voice output toggled");
            self.voice_output = enabled;
            let _ = self.event_tx.send(DialogEvent::VoiceOutputChanged { enabled });
        }
    }

    /// Push a terminal event into history and notify subscribers. Push
    /// and eviction happen in one step; subscribers only ever see the
    /// post-eviction snapshot.
    fn record(&mut self, event: CommandEvent) {
        let entry = event.clone();
        self.history.push(event);
        let _ = self.event_tx.send(DialogEvent::CommandResolved { entry });
        let _ = self.event_tx.send(DialogEvent::HistoryChanged {
            entries: self.history.snapshot(),
        });
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: DialogState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }

        let duration_ms = self
            .state_entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "dialog transition"
        );

        self.state = new_state;
        self.state_entered_at = if new_state != DialogState::Idle {
            Some(Instant::now())
        } else {
            None
        };

        let _ = self.event_tx.send(DialogEvent::StateChanged {
            from: old_state,
            to: new_state,
        });
    }
}
