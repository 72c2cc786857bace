//! Best-effort forwarding of extracted features to an external scoring service.
//!
//! Runs off the request path: the relay is dispatched after the response
//! payload exists, and its outcome is only ever logged.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Scoring relay is not configured")]
    NotConfigured,

    #[error("Scoring service unreachable: {0}")]
    Transport(String),

    #[error("Scoring service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

pub struct ScoringRelay {
    client: reqwest::Client,
    url: Option<String>,
}

impl ScoringRelay {
    pub fn new(url: Option<String>, timeout_secs: u64) -> Result<Self, ScoringError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ScoringError::HttpClient(e.to_string()))?;
        Ok(Self { client, url })
    }

    /// Relay that never sends anything.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            url: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// POST `payload` as JSON and return the status of a 2xx reply.
    pub async fn send(&self, payload: &Value) -> Result<StatusCode, ScoringError> {
        let url = self.url.as_deref().ok_or(ScoringError::NotConfigured)?;

        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| ScoringError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScoringError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // The reply body is not used; read it so the connection can be reused.
        let _ = response.bytes().await;
        Ok(status)
    }

    /// Spawn `send` as a detached task. Failures are logged and swallowed.
    pub fn dispatch(self: &Arc<Self>, payload: Value) -> JoinHandle<()> {
        let relay = Arc::clone(self);
        tokio::spawn(async move {
            if !relay.is_enabled() {
                tracing::debug!("Scoring relay disabled, skipping");
                return;
            }
            match relay.send(&payload).await {
                Ok(status) => {
                    tracing::info!(status = status.as_u16(), "Features relayed to scoring service");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Scoring relay failed");
                }
            }
        })
    }
}
