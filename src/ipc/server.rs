//! Unix domain socket server for IPC
//!
//! Request-response communication for UI clients, plus a push stream of
//! dialog events for connections that subscribe. Reads are served from
//! cached snapshots so they never block the pipeline; actions are
//! forwarded to the dialog manager's channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::dialog::{DialogState, PipelineEvent};
use crate::events::DialogEvent;
use crate::history::CommandEvent;
use crate::telemetry::TelemetrySnapshot;

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State and channels shared with client handlers
struct Shared {
    state: RwLock<ServerState>,
    /// Forwarding channel into the dialog manager
    pipeline_tx: mpsc::Sender<PipelineEvent>,
    /// Source of push notifications for subscribed clients
    event_tx: broadcast::Sender<DialogEvent>,
    /// Latest telemetry snapshot
    telemetry_rx: watch::Receiver<TelemetrySnapshot>,
}

/// Cached view of the pipeline, fed from the broadcast channel
struct ServerState {
    status: DaemonStatus,
    history: Vec<CommandEvent>,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new IPC server bound to the given socket path
    pub fn new(
        socket_path: &Path,
        pipeline_tx: mpsc::Sender<PipelineEvent>,
        event_tx: broadcast::Sender<DialogEvent>,
        telemetry_rx: watch::Receiver<TelemetrySnapshot>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let shared = Arc::new(Shared {
            state: RwLock::new(ServerState {
                status: DaemonStatus::default(),
                history: Vec::new(),
                start_time: std::time::Instant::now(),
            }),
            pipeline_tx,
            event_tx,
            telemetry_rx,
        });

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            shared,
            shutdown_tx,
        })
    }

    /// Update the cached dialog state
    pub async fn set_state(&self, state: DialogState) {
        let mut server_state = self.shared.state.write().await;
        let old_state = server_state.status.dialog_state;
        server_state.status.dialog_state = state;

        if old_state != state {
            debug!(from = ?old_state, to = ?state, "IPC server: dialog state updated");
        }
    }

    /// Update the cached voice output flag
    pub async fn set_voice_output(&self, enabled: bool) {
        self.shared.state.write().await.status.voice_output = enabled;
    }

    /// Replace the cached history snapshot
    pub async fn set_history(&self, entries: Vec<CommandEvent>) {
        self.shared.state.write().await.history = entries;
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self
            .listener
            .as_ref()
            .context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(mut stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > 1024 * 1024 {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            stream.read_exact(&mut msg_buf).await?;

            // Parse request
            let request: Request =
                serde_json::from_slice(&msg_buf).context("failed to parse request")?;

            debug!(?request, "received request");

            if matches!(request, Request::Subscribe) {
                Self::send_message(&mut stream, &Response::Subscribed).await?;
                return Self::stream_events(stream, &shared).await;
            }

            let response = Self::process_request(request, &shared).await;
            Self::send_message(&mut stream, &response).await?;
        }
    }

    /// Forward dialog events to a subscribed client until either side
    /// goes away. The connection carries notifications only from here on.
    async fn stream_events(mut stream: UnixStream, shared: &Shared) -> Result<()> {
        let mut event_rx = shared.event_tx.subscribe();
        debug!("client subscribed to dialog events");

        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    Self::send_message(&mut stream, &Notification::Event { event }).await?;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "subscriber lagged behind dialog events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Ok(());
                }
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        stream.write_all(&msg_len).await?;
        stream.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    async fn process_request(request: Request, shared: &Shared) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = shared.state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                Response::Status(state.status.clone())
            }

            Request::GetHistory => {
                let state = shared.state.read().await;
                Response::History {
                    entries: state.history.clone(),
                }
            }

            Request::GetTelemetry => {
                Response::Telemetry(shared.telemetry_rx.borrow().clone())
            }

            Request::StartCapture => {
                // Advisory check against the cached state; the manager
                // re-checks on its own channel and stays authoritative.
                let busy = {
                    let state = shared.state.read().await;
                    state.status.dialog_state != DialogState::Idle
                };
                if busy {
                    debug!("start capture rejected: pipeline busy");
                    return Response::Busy;
                }
                Self::forward(shared, PipelineEvent::StartCapture).await
            }

            Request::ClearHistory => Self::forward(shared, PipelineEvent::ClearHistory).await,

            Request::SetVoiceOutput { enabled } => {
                Self::forward(shared, PipelineEvent::SetVoiceOutput(enabled)).await
            }

            Request::Reset => Self::forward(shared, PipelineEvent::Reset).await,

            // Handled before process_request; kept for exhaustiveness.
            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Forward an action to the dialog manager
    async fn forward(shared: &Shared, event: PipelineEvent) -> Response {
        match shared.pipeline_tx.send(event).await {
            Ok(()) => Response::Accepted,
            Err(e) => {
                error!(?e, "pipeline channel closed");
                Response::Error {
                    code: "pipeline_unavailable".to_owned(),
                    message: "dialog manager is not running".to_owned(),
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_server(dir: &std::path::Path) -> (Server, mpsc::Receiver<PipelineEvent>) {
        let (pipeline_tx, pipeline_rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(16);
        let (_telemetry_tx, telemetry_rx) = watch::channel(TelemetrySnapshot::default());
        let server = Server::new(&dir.join("test.sock"), pipeline_tx, event_tx, telemetry_rx)
            .expect("bind test socket");
        (server, pipeline_rx)
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dashvoice-test-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let dir = temp_dir("ping");
        let (server, _rx) = test_server(&dir);
        let response = Server::process_request(Request::Ping, &server.shared).await;
        assert!(matches!(response, Response::Pong));
    }

    #[tokio::test]
    async fn test_start_capture_busy_when_not_idle() {
        let dir = temp_dir("busy");
        let (server, mut rx) = test_server(&dir);

        server.set_state(DialogState::Speaking).await;
        let response = Server::process_request(Request::StartCapture, &server.shared).await;
        assert!(matches!(response, Response::Busy));
        // Nothing was forwarded to the pipeline.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_capture_forwarded_when_idle() {
        let dir = temp_dir("forward");
        let (server, mut rx) = test_server(&dir);

        let response = Server::process_request(Request::StartCapture, &server.shared).await;
        assert!(matches!(response, Response::Accepted));
        assert!(matches!(rx.recv().await, Some(PipelineEvent::StartCapture)));
    }

    #[tokio::test]
    async fn test_get_history_serves_cached_snapshot() {
        let dir = temp_dir("history");
        let (server, _rx) = test_server(&dir);

        server
            .set_history(vec![CommandEvent::pending("turn on ac")])
            .await;
        let response = Server::process_request(Request::GetHistory, &server.shared).await;
        match response {
            Response::History { entries } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].raw_input, "turn on ac");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
