//! dashvoice-daemon: Voice command daemon for a simulated vehicle dashboard
//!
//! The daemon owns the voice command pipeline:
//! - Explicit dialog state machine (Idle, Listening, AwaitingResponse,
//!   Speaking)
//! - Catalog matching with a remote completion fallback
//! - Bounded, time-windowed command history
//! - IPC server for dashboard UI clients, with push notifications
//!
//! Speech engines are simulated; real recognizers/synthesizers plug in
//! behind the adapter traits.

mod adapters;
mod catalog;
mod config;
mod dialog;
mod error;
mod events;
mod fallback;
mod history;
mod ipc;
mod lifecycle;
mod telemetry;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::{SimulatedCapture, SimulatedPlayback};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::dialog::DialogManager;
use crate::events::DialogEvent;
use crate::fallback::FallbackClient;
use crate::ipc::Server;
use crate::telemetry::TelemetrySimulator;

/// Utterance script for the simulated recognizer: the demo phrases from
/// the dashboard, plus off-catalog ones that exercise the fallback path.
fn utterance_script() -> Vec<String> {
    [
        "Navigate to home",
        "Set temperature to 22 degrees",
        "Play my playlist",
        "Lock the car",
        "Turn on AC",
        "What's the battery level",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "dashvoice-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        fallback = config.fallback.is_some(),
        "configuration loaded"
    );

    // Create channels for inter-component communication
    // Adapters + IPC server -> dialog manager
    let (pipeline_tx, pipeline_rx) = mpsc::channel(32);
    // Dialog manager -> IPC server and subscribers
    let (event_tx, _event_rx) = broadcast::channel::<DialogEvent>(64);

    // Simulated speech engines behind the adapter boundaries
    let capture = Arc::new(SimulatedCapture::new(
        pipeline_tx.clone(),
        utterance_script(),
    ));
    let playback = Arc::new(SimulatedPlayback::new(pipeline_tx.clone()));

    // Remote completion client; absent means degraded mode
    let fallback = FallbackClient::from_config(config.fallback.as_ref())?;
    if fallback.is_none() {
        warn!("no fallback endpoint configured, unmatched commands get the degraded reply");
    }

    // Create the dialog manager
    let mut manager = DialogManager::new(
        Arc::new(Catalog::built_in()),
        fallback,
        config.voice_output,
        capture,
        playback,
        event_tx.clone(),
    );

    // Simulated vehicle sensors
    let (telemetry_sim, telemetry_rx) = TelemetrySimulator::channel();

    // Create IPC server
    let server = Server::new(
        &config.socket_path,
        pipeline_tx.clone(),
        event_tx.clone(),
        telemetry_rx,
    )?;
    server.set_voice_output(config.voice_output).await;

    // Keep the server's cached snapshots in sync with the pipeline
    let mut cache_rx = event_tx.subscribe();
    let server_for_events = &server;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the dialog manager (processes pipeline events)
        _ = manager.run(pipeline_rx) => {
            info!("dialog manager exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Run the telemetry simulator
        _ = telemetry_sim.run() => {
            info!("telemetry simulator exited");
        }

        // Mirror dialog events into the IPC server's caches
        _ = async {
            loop {
                match cache_rx.recv().await {
                    Ok(DialogEvent::StateChanged { to, .. }) => {
                        server_for_events.set_state(to).await;
                    }
                    Ok(DialogEvent::HistoryChanged { entries }) => {
                        server_for_events.set_history(entries).await;
                    }
                    Ok(DialogEvent::VoiceOutputChanged { enabled }) => {
                        server_for_events.set_voice_output(enabled).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event cache receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("event cache task exited");
        }

        // Wait for shutdown signal
        result = lifecycle::wait_for_shutdown() => {
            if let Err(e) = result {
                error!(?e, "signal handler error");
            } else {
                info!("shutdown signal received");
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;

    info!("dashvoice-daemon stopped");

    Ok(())
}
