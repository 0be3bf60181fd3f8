//! Simulated speech engines
//!
//! Stand-ins for the platform speech recognition and synthesis engines:
//! capture "hears" a random phrase from a fixed script after a short
//! delay, playback "speaks" for a duration proportional to text length.
//! These drive the shipped binary and double as the test harness for the
//! dialog manager.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dialog::PipelineEvent;
use crate::error::{Result, VoiceError};

use super::{CaptureAdapter, PlaybackAdapter};

/// Default recognition delay before a simulated utterance arrives.
const CAPTURE_DELAY: Duration = Duration::from_millis(1500);

/// Per-character speaking time for simulated playback.
const SPEAK_MILLIS_PER_CHAR: u64 = 40;

/// Simulated speech recognizer: emits one scripted utterance per
/// `begin` call after a recognition delay.
pub struct SimulatedCapture {
    event_tx: mpsc::Sender<PipelineEvent>,
    phrases: Vec<String>,
    delay: Duration,
    /// Bumped on `cancel`; a pending attempt only delivers if the
    /// generation it was started under is still current.
    generation: Arc<AtomicU64>,
}

impl SimulatedCapture {
    /// Create a recognizer over the given utterance script.
    pub fn new(event_tx: mpsc::Sender<PipelineEvent>, phrases: Vec<String>) -> Self {
        Self {
            event_tx,
            phrases,
            delay: CAPTURE_DELAY,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Override the recognition delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl CaptureAdapter for SimulatedCapture {
    fn begin(&self) -> Result<()> {
        if self.phrases.is_empty() {
            return Err(VoiceError::Capture("no utterance script loaded".to_owned()));
        }

        let event_tx = self.event_tx.clone();
        let phrases = self.phrases.clone();
        let delay = self.delay;
        let generation = Arc::clone(&self.generation);
        let started_in = generation.load(Ordering::SeqCst);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if generation.load(Ordering::SeqCst) != started_in {
                debug!("simulated capture cancelled, dropping result");
                return;
            }

            let phrase = {
                use rand::seq::SliceRandom;
                let mut rng = rand::thread_rng();
                phrases.choose(&mut rng).cloned()
            };

            if let Some(text) = phrase {
                debug!(%text, "simulated utterance recognized");
                if event_tx.send(PipelineEvent::Utterance(text)).await.is_err() {
                    warn!("pipeline channel closed, utterance dropped");
                }
            }
        });

        Ok(())
    }

    fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Simulated speech synthesizer: signals completion after a delay
/// proportional to the text length.
pub struct SimulatedPlayback {
    event_tx: mpsc::Sender<PipelineEvent>,
    busy: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
}

impl SimulatedPlayback {
    pub fn new(event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self {
            event_tx,
            busy: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl PlaybackAdapter for SimulatedPlayback {
    fn speak(&self, text: &str) -> Result<()> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(VoiceError::Playback(
                "playback already in progress".to_owned(),
            ));
        }

        let event_tx = self.event_tx.clone();
        let busy = Arc::clone(&self.busy);
        let generation = Arc::clone(&self.generation);
        let started_in = generation.load(Ordering::SeqCst);
        let duration = Duration::from_millis(SPEAK_MILLIS_PER_CHAR * text.len() as u64);

        debug!(chars = text.len(), ?duration, "simulated playback started");

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            busy.store(false, Ordering::SeqCst);

            if generation.load(Ordering::SeqCst) != started_in {
                debug!("simulated playback cancelled");
                return;
            }

            if event_tx.send(PipelineEvent::PlaybackComplete).await.is_err() {
                warn!("pipeline channel closed, playback completion dropped");
            }
        });

        Ok(())
    }

    fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_emits_scripted_utterance() {
        let (tx, mut rx) = mpsc::channel(8);
        let capture = SimulatedCapture::new(tx, vec!["lock the car".to_owned()])
            .with_delay(Duration::from_millis(5));
        capture.begin().unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            PipelineEvent::Utterance(text) => assert_eq!(text, "lock the car"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_capture_empty_script_errors() {
        let (tx, _rx) = mpsc::channel(8);
        let capture = SimulatedCapture::new(tx, vec![]);
        assert!(capture.begin().is_err());
    }

    #[tokio::test]
    async fn test_cancelled_capture_drops_result() {
        let (tx, mut rx) = mpsc::channel(8);
        let capture = SimulatedCapture::new(tx, vec!["pause music".to_owned()])
            .with_delay(Duration::from_millis(20));
        capture.begin().unwrap();
        capture.cancel();

        let got = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(got.is_err(), "cancelled capture must not deliver");
    }

    #[tokio::test]
    async fn test_playback_signals_completion() {
        let (tx, mut rx) = mpsc::channel(8);
        let playback = SimulatedPlayback::new(tx);
        playback.speak("ok").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, PipelineEvent::PlaybackComplete));
    }

    #[tokio::test]
    async fn test_playback_rejects_overlapping_speak() {
        let (tx, _rx) = mpsc::channel(8);
        let playback = SimulatedPlayback::new(tx);
        playback.speak("a long sentence to keep the synthesizer busy").unwrap();
        assert!(playback.speak("second").is_err());
    }
}
