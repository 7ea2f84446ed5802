//! Streaming client for the external pose inference service
//!
//! One persistent WebSocket connection per evidence file. The first
//! exchange authenticates with an out-of-band credential; afterwards the
//! protocol is strictly serial request-response: one `{image}` message out,
//! one result (or error) message back before the next frame is sent.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Inference client errors; all of these abort the whole evidence file
#[derive(Debug, Error)]
pub enum InferenceError {
    /// WebSocket connection could not be established
    #[error("Connection to inference service failed: {0}")]
    ConnectFailed(String),

    /// Service rejected the credential
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// Connect/authentication handshake exceeded its timeout
    #[error("Authentication timed out after {0:?}")]
    AuthTimeout(Duration),

    /// One frame exchange exceeded its timeout; the stream can no longer
    /// be trusted to pair requests with responses
    #[error("Inference exchange timed out after {0:?}")]
    ExchangeTimeout(Duration),

    /// Service closed the connection mid-stream
    #[error("Connection closed by inference service")]
    ConnectionClosed,

    /// Underlying transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Handshake response was not a recognizable protocol message
    #[error("Malformed handshake response: {0}")]
    MalformedHandshake(String),
}

/// Successful inference output for one frame.
///
/// Only the keypoints feed the analysis core; the service's own score
/// fields are parsed for protocol fidelity and cross-checked in logs.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceResponse {
    /// `[[x, y, confidence] × N]` body landmarks
    pub keypoints: Vec<Vec<f64>>,
    #[serde(default)]
    pub posture_score: Option<ServiceScores>,
    #[serde(default)]
    pub measurements: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub raw_scores_percent: Option<BTreeMap<String, f64>>,
}

/// Score block as reported by the service
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceScores {
    /// View label detected by the service
    #[serde(default)]
    pub side: Option<String>,
    /// Per-metric weighted scores
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
}

/// Outcome of one frame exchange
#[derive(Debug)]
pub enum FrameOutcome {
    /// Frame produced landmarks
    Landmarks(Box<InferenceResponse>),
    /// Service reported a per-frame error (e.g. no person detected);
    /// skipped and counted, not fatal to the file
    Skipped(String),
}

/// Wire messages received from the service
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Incoming {
    Error { error: String },
    Auth { status: String },
    Result(Box<InferenceResponse>),
}

/// Connection factory for one inference endpoint
#[derive(Debug, Clone)]
pub struct InferenceClient {
    endpoint: String,
    credential: String,
    handshake_timeout: Duration,
    exchange_timeout: Duration,
}

impl InferenceClient {
    pub fn new(
        endpoint: impl Into<String>,
        credential: impl Into<String>,
        handshake_timeout: Duration,
        exchange_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential: credential.into(),
            handshake_timeout,
            exchange_timeout,
        }
    }

    /// Open a connection and complete the authentication handshake
    pub async fn connect(&self) -> Result<InferenceStream, InferenceError> {
        let url = format!(
            "{}?token={}",
            self.endpoint.trim_end_matches('/'),
            self.credential
        );

        let (ws, _) = tokio::time::timeout(self.handshake_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| InferenceError::AuthTimeout(self.handshake_timeout))?
            .map_err(|e| InferenceError::ConnectFailed(e.to_string()))?;

        let mut stream = InferenceStream {
            ws,
            exchange_timeout: self.exchange_timeout,
        };

        let text = tokio::time::timeout(self.handshake_timeout, stream.next_text())
            .await
            .map_err(|_| InferenceError::AuthTimeout(self.handshake_timeout))??;

        match serde_json::from_str::<Incoming>(&text) {
            Ok(Incoming::Auth { status }) if status == "authenticated" => {
                tracing::debug!(endpoint = %self.endpoint, "Inference service authenticated");
                Ok(stream)
            }
            Ok(Incoming::Auth { status }) => Err(InferenceError::AuthRejected(status)),
            Ok(Incoming::Error { error }) => Err(InferenceError::AuthRejected(error)),
            _ => Err(InferenceError::MalformedHandshake(text)),
        }
    }
}

/// Authenticated streaming session with the inference service
pub struct InferenceStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    exchange_timeout: Duration,
}

impl InferenceStream {
    /// Send one encoded frame and await its result.
    ///
    /// A per-frame service error, or a response that fails to parse,
    /// yields [`FrameOutcome::Skipped`]; transport failures and timeouts
    /// are hard errors that abort the file.
    pub async fn infer_frame(&mut self, frame: &[u8]) -> Result<FrameOutcome, InferenceError> {
        let payload = serde_json::json!({ "image": BASE64.encode(frame) }).to_string();
        self.ws
            .send(Message::Text(payload))
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let text = tokio::time::timeout(self.exchange_timeout, self.next_text())
            .await
            .map_err(|_| InferenceError::ExchangeTimeout(self.exchange_timeout))??;

        match serde_json::from_str::<Incoming>(&text) {
            Ok(Incoming::Result(response)) => Ok(FrameOutcome::Landmarks(response)),
            Ok(Incoming::Error { error }) => Ok(FrameOutcome::Skipped(error)),
            Ok(Incoming::Auth { status }) => {
                Ok(FrameOutcome::Skipped(format!("unexpected status message: {}", status)))
            }
            Err(e) => Ok(FrameOutcome::Skipped(format!("unparseable response: {}", e))),
        }
    }

    /// Close the connection gracefully
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }

    async fn next_text(&mut self) -> Result<String, InferenceError> {
        loop {
            match self.ws.next().await {
                None => return Err(InferenceError::ConnectionClosed),
                Some(Err(e)) => return Err(InferenceError::Transport(e.to_string())),
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Close(_))) => return Err(InferenceError::ConnectionClosed),
                // Control and binary frames are not part of the protocol
                Some(Ok(_)) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_result_messages() {
        let text = r#"{
            "keypoints": [[1.0, 2.0, 0.9], [3.0, 4.0, 0.8]],
            "posture_score": {"side": "left", "knee_angle": 0.25},
            "measurements": {"knee_angle": 15.0},
            "raw_scores_percent": {"knee_angle": 100.0}
        }"#;
        match serde_json::from_str::<Incoming>(text).unwrap() {
            Incoming::Result(response) => {
                assert_eq!(response.keypoints.len(), 2);
                let scores = response.posture_score.unwrap();
                assert_eq!(scores.side.as_deref(), Some("left"));
                assert_eq!(scores.metrics.get("knee_angle"), Some(&0.25));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn parses_error_and_auth_messages() {
        match serde_json::from_str::<Incoming>(r#"{"error": "No person detected"}"#).unwrap() {
            Incoming::Error { error } => assert_eq!(error, "No person detected"),
            other => panic!("unexpected parse: {:?}", other),
        }

        match serde_json::from_str::<Incoming>(
            r#"{"status": "authenticated", "user_id": "7"}"#,
        )
        .unwrap()
        {
            Incoming::Auth { status } => assert_eq!(status, "authenticated"),
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn bare_keypoints_still_parse() {
        let text = r#"{"keypoints": [[1.0, 2.0]]}"#;
        match serde_json::from_str::<Incoming>(text).unwrap() {
            Incoming::Result(response) => {
                assert!(response.posture_score.is_none());
                assert!(response.measurements.is_none());
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }
}
