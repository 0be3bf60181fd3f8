//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// History buffer capacity (entries).
pub const HISTORY_CAPACITY: usize = 50;
/// History entries older than this many seconds are evicted.
pub const HISTORY_WINDOW_SECS: i64 = 60;
/// Wall-clock budget for one remote completion call.
pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote completion endpoint settings. Only constructed when both the
/// URL and the credential are configured; otherwise the pipeline runs in
/// degraded mode and never performs network I/O.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Completion endpoint URL.
    pub url: String,
    /// Bearer credential for the endpoint.
    pub api_key: String,
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Remote fallback endpoint, if configured
    pub fallback: Option<FallbackConfig>,

    /// Whether speech playback starts enabled
    pub voice_output: bool,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        Ok(Self::from_values(
            &home,
            std::env::var("DASHVOICE_SOCKET").ok(),
            non_empty_env("DASHVOICE_FALLBACK_URL"),
            non_empty_env("DASHVOICE_FALLBACK_API_KEY"),
        ))
    }

    /// Assemble a configuration from already-read values.
    fn from_values(
        home: &str,
        socket_override: Option<String>,
        fallback_url: Option<String>,
        fallback_api_key: Option<String>,
    ) -> Self {
        let data_dir = PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("dashvoice");

        let socket_path = socket_override
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let fallback = match (fallback_url, fallback_api_key) {
            (Some(url), Some(api_key)) => Some(FallbackConfig { url, api_key }),
            _ => None,
        };

        Self {
            socket_path,
            data_dir,
            fallback,
            voice_output: true,
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
