//! Simulated vehicle telemetry
//!
//! The dashboard widgets outside the voice pipeline only render numbers.
//! Each source is modeled as an isolated periodic task producing
//! immutable snapshots on a watch channel; nothing here shares mutable
//! state with the dialog manager.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// How often a new snapshot is produced.
const TICK_INTERVAL: Duration = Duration::from_secs(2);

/// Immutable reading of the simulated sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Battery charge, 0–100.
    pub battery_percent: f32,
    /// Cabin temperature in °C.
    pub cabin_temp_c: f32,
    /// Whether the vehicle is locked.
    pub doors_locked: bool,
    /// When this snapshot was produced.
    pub updated_at: DateTime<Utc>,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            battery_percent: 82.0,
            cabin_temp_c: 21.0,
            doors_locked: true,
            updated_at: Utc::now(),
        }
    }
}

/// Periodic random-walk producer for [`TelemetrySnapshot`]s.
pub struct TelemetrySimulator {
    tx: watch::Sender<TelemetrySnapshot>,
    interval: Duration,
}

impl TelemetrySimulator {
    /// Create a simulator and the receiver side of its channel.
    pub fn channel() -> (Self, watch::Receiver<TelemetrySnapshot>) {
        let (tx, rx) = watch::channel(TelemetrySnapshot::default());
        (
            Self {
                tx,
                interval: TICK_INTERVAL,
            },
            rx,
        )
    }

    /// Override the tick interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until every receiver is dropped.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            let next = {
                let mut rng = rand::thread_rng();
                step(&self.tx.borrow(), &mut rng)
            };
            debug!(
                battery = next.battery_percent,
                temp = next.cabin_temp_c,
                "telemetry tick"
            );
            if self.tx.send(next).is_err() {
                break;
            }
        }
    }
}

/// One random-walk step. Battery drains slowly, the cabin temperature
/// wanders around the climate setpoint, and the lock state flips rarely.
fn step<R: Rng>(current: &TelemetrySnapshot, rng: &mut R) -> TelemetrySnapshot {
    let battery = (current.battery_percent - rng.gen_range(0.0..0.05)).clamp(0.0, 100.0);
    let drift = rng.gen_range(-0.3..0.3) + (21.0 - current.cabin_temp_c) * 0.05;
    let temp = (current.cabin_temp_c + drift).clamp(15.0, 30.0);
    let locked = if rng.gen_bool(0.02) {
        !current.doors_locked
    } else {
        current.doors_locked
    };

    TelemetrySnapshot {
        battery_percent: battery,
        cabin_temp_c: temp,
        doors_locked: locked,
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_keeps_values_in_bounds() {
        let mut rng = rand::thread_rng();
        let mut snapshot = TelemetrySnapshot::default();
        for _ in 0..10_000 {
            snapshot = step(&snapshot, &mut rng);
            assert!((0.0..=100.0).contains(&snapshot.battery_percent));
            assert!((15.0..=30.0).contains(&snapshot.cabin_temp_c));
        }
    }

    #[test]
    fn test_battery_only_drains() {
        let mut rng = rand::thread_rng();
        let start = TelemetrySnapshot::default();
        let mut snapshot = start.clone();
        for _ in 0..100 {
            snapshot = step(&snapshot, &mut rng);
        }
        assert!(snapshot.battery_percent <= start.battery_percent);
    }

    #[tokio::test]
    async fn test_simulator_publishes_snapshots() {
        let (sim, mut rx) = TelemetrySimulator::channel();
        let sim = sim.with_interval(Duration::from_millis(5));
        tokio::spawn(sim.run());

        rx.changed().await.unwrap();
        let first = rx.borrow_and_update().clone();
        rx.changed().await.unwrap();
        let second = rx.borrow().clone();
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = TelemetrySnapshot::default();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("battery_percent"));
        assert!(json.contains("doors_locked"));
    }
}
