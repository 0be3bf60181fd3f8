//! Remote completion fallback client
//!
//! When no catalog pattern matches an utterance, the raw input is sent to
//! an external natural-language completion endpoint together with a fixed
//! instruction keeping replies on vehicle-domain topics. One attempt per
//! utterance, bounded by a timeout; any failure maps to
//! [`VoiceError::FallbackUnavailable`] and is absorbed by the dialog
//! manager, never surfaced raw to the UI.

use serde::{Deserialize, Serialize};

use crate::config::{FallbackConfig, FALLBACK_TIMEOUT};
use crate::error::{Result, VoiceError};

/// System instruction sent with every completion request.
pub const SYSTEM_INSTRUCTION: &str = "You are an AI assistant integrated into a vehicle \
interface system. Respond naturally to commands about: music control (play, pause, next, \
previous), climate control (temperature, AC), navigation, vehicle status, and general \
inquiries. Keep responses brief and natural.";

/// Response recorded when the fallback call fails or is cancelled.
pub const APOLOGY_RESPONSE: &str = "I'm sorry, I encountered an error. Please try again.";

/// Deterministic reply used when no fallback endpoint is configured.
pub fn degraded_response(input: &str) -> String {
    format!(
        "I understand you want to {input}. However, I can only process basic commands at \
         the moment."
    )
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    instruction: &'a str,
    #[serde(rename = "userText")]
    user_text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
}

/// HTTP client for the remote completion endpoint.
#[derive(Clone)]
pub struct FallbackClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl FallbackClient {
    /// Build a client for the given endpoint. The request timeout is
    /// baked into the underlying HTTP client, so a hung endpoint fails
    /// the same way a network error does.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, api_key, FALLBACK_TIMEOUT)
    }

    fn with_timeout(
        url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            api_key: api_key.into(),
        })
    }

    /// Construct from configuration; `None` when the endpoint or
    /// credential is absent (degraded mode, see the dialog manager).
    pub fn from_config(fallback: Option<&FallbackConfig>) -> Result<Option<Self>> {
        match fallback {
            Some(cfg) => Ok(Some(Self::new(&cfg.url, &cfg.api_key)?)),
            None => Ok(None),
        }
    }

    /// Send one utterance for completion. Exactly one attempt; network
    /// errors, timeouts, non-2xx statuses, and malformed bodies all
    /// collapse to `FallbackUnavailable`.
    pub async fn complete(&self, input: &str) -> Result<String> {
        let request = CompletionRequest {
            instruction: SYSTEM_INSTRUCTION,
            user_text: input,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| VoiceError::FallbackUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoiceError::FallbackUnavailable(format!(
                "endpoint returned status {status}"
            )));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::FallbackUnavailable(format!("malformed response: {e}")))?;

        if body.text.trim().is_empty() {
            return Err(VoiceError::FallbackUnavailable(
                "empty completion text".to_owned(),
            ));
        }

        Ok(body.text)
    }
}

impl std::fmt::Debug for FallbackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP stub: accepts a single connection, consumes the
    /// request, replies with the canned response, and closes.
    async fn spawn_stub(status_line: &'static str, body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            // Read until the request body has fully arrived.
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find_headers_end(&buf) {
                    let headers = String::from_utf8_lossy(&buf[..pos]);
                    let content_length = headers
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0)))
                        .unwrap_or(0);
                    if buf.len() >= pos + 4 + content_length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
        });
        addr
    }

    fn find_headers_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    #[test]
    fn test_request_wire_format() {
        let request = CompletionRequest {
            instruction: SYSTEM_INSTRUCTION,
            user_text: "what's the range left",
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"instruction\""));
        assert!(json.contains("\"userText\":\"what's the range left\""));
    }

    #[test]
    fn test_degraded_response_is_deterministic() {
        let a = degraded_response("open the sunroof");
        assert_eq!(a, degraded_response("open the sunroof"));
        assert!(a.contains("only process basic commands"));
        assert!(a.contains("open the sunroof"));
    }

    #[test]
    fn test_from_config_disabled_without_endpoint() {
        assert!(FallbackClient::from_config(None).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_success() {
        let addr = spawn_stub("200 OK", r#"{"text":"Charging is at 80 percent."}"#).await;
        let client = FallbackClient::new(format!("http://{addr}/complete"), "key").unwrap();
        let reply = client.complete("how charged are we").await.unwrap();
        assert_eq!(reply, "Charging is at 80 percent.");
    }

    #[tokio::test]
    async fn test_non_2xx_is_unavailable() {
        let addr = spawn_stub("500 Internal Server Error", "{}").await;
        let client = FallbackClient::new(format!("http://{addr}/complete"), "key").unwrap();
        let err = client.complete("anything").await.unwrap_err();
        assert!(matches!(err, VoiceError::FallbackUnavailable(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_unavailable() {
        let addr = spawn_stub("200 OK", "not json").await;
        let client = FallbackClient::new(format!("http://{addr}/complete"), "key").unwrap();
        let err = client.complete("anything").await.unwrap_err();
        assert!(matches!(err, VoiceError::FallbackUnavailable(_)));
    }

    #[tokio::test]
    async fn test_hung_endpoint_times_out_as_unavailable() {
        // Stub accepts the connection and reads the request but never
        // sends a byte back.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut chunk = [0u8; 1024];
            while stream.read(&mut chunk).await.unwrap_or(0) > 0 {}
        });

        let client = FallbackClient::with_timeout(
            format!("http://{addr}/complete"),
            "key",
            std::time::Duration::from_millis(200),
        )
        .unwrap();
        let err = client.complete("anything").await.unwrap_err();
        assert!(matches!(err, VoiceError::FallbackUnavailable(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        // Bind then drop to get a port with no listener.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = FallbackClient::new(format!("http://{addr}/complete"), "key").unwrap();
        let err = client.complete("anything").await.unwrap_err();
        assert!(matches!(err, VoiceError::FallbackUnavailable(_)));
    }
}
