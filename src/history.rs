//! Command events and the bounded history buffer
//!
//! Every utterance produces one [`CommandEvent`]. The buffer keeps them
//! newest-first and applies two eviction rules after each insertion:
//! a fixed capacity and a time window, whichever is stricter.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{CommandCategory, CommandDefinition};

/// Lifecycle status of a command event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Resolution in flight. At most one event is pending at a time.
    Pending,
    /// Resolved with a response (local match, fallback reply, or the
    /// degraded-mode reply).
    Success,
    /// Capture failed, the fallback was unavailable, or the cycle was
    /// cancelled.
    Error,
}

/// Record of one user utterance moving through the pipeline.
///
/// Created when input is captured, mutated while `Pending`, and frozen
/// once it reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEvent {
    /// The transcribed input as received from the capture engine.
    pub raw_input: String,
    /// Catalog pattern that matched, set only on a local-match success.
    pub matched_pattern: Option<String>,
    /// Category of the matched catalog entry.
    pub category: Option<CommandCategory>,
    /// Reply shown/spoken to the user.
    pub response: Option<String>,
    /// Current status.
    pub status: CommandStatus,
    /// Capture time.
    pub created_at: DateTime<Utc>,
}

impl CommandEvent {
    /// New pending event for a freshly captured utterance.
    pub fn pending(raw_input: impl Into<String>) -> Self {
        Self {
            raw_input: raw_input.into(),
            matched_pattern: None,
            category: None,
            response: None,
            status: CommandStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Resolve via a local catalog match.
    pub fn resolve_matched(&mut self, def: &CommandDefinition) {
        self.matched_pattern = Some(def.pattern.clone());
        self.category = Some(def.category);
        self.response = Some(def.response.clone());
        self.status = CommandStatus::Success;
    }

    /// Resolve with generated or synthesized text (fallback reply or the
    /// degraded-mode reply). `matched_pattern` stays unset.
    pub fn resolve_generated(&mut self, response: impl Into<String>) {
        self.response = Some(response.into());
        self.status = CommandStatus::Success;
    }

    /// Resolve as failed, optionally with an explanatory response.
    pub fn resolve_error(&mut self, response: Option<String>) {
        self.response = response;
        self.status = CommandStatus::Error;
    }
}

/// Newest-first buffer of command events, bounded by capacity and age.
#[derive(Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<CommandEvent>,
    capacity: usize,
    window: Duration,
}

impl HistoryBuffer {
    /// Create a buffer holding at most `capacity` events no older than
    /// `window`.
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            window,
        }
    }

    /// Insert an event at the front and apply both eviction rules.
    ///
    /// Insertion and eviction happen in one call, so callers never
    /// observe an over-capacity or stale buffer.
    pub fn push(&mut self, event: CommandEvent) {
        self.entries.push_front(event);
        self.prune(Utc::now());
    }

    /// Drop entries beyond capacity and entries older than the window,
    /// oldest first.
    fn prune(&mut self, now: DateTime<Utc>) {
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
        let cutoff = now - self.window;
        while matches!(self.entries.back(), Some(e) if e.created_at < cutoff) {
            self.entries.pop_back();
        }
    }

    /// Remove every entry unconditionally.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of live entries, after re-applying the time window.
    pub fn len(&mut self) -> usize {
        self.prune(Utc::now());
        self.entries.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Newest-first snapshot of the live entries.
    pub fn snapshot(&mut self) -> Vec<CommandEvent> {
        self.prune(Utc::now());
        self.entries.iter().cloned().collect()
    }
}
