//! REST client for the session server.
//!
//! Thin wrapper over `reqwest` covering the interactive-session and archive
//! endpoints. Every method returns `Result`; HTTP failure bodies are mined
//! for the server's `detail` field so callers can surface a useful message.

use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use redel_core::{SaveMeta, SessionEvent, SessionMeta, SessionState};

/// Error from a REST call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced an HTTP response (connect/timeout/body).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server responded with a non-success status.
    #[error("server returned {status}: {detail}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-provided `detail` message, or the raw body when absent.
        detail: String,
    },
}

impl ApiError {
    /// Short human-readable form for notification toasts.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(err) if err.is_connect() => "Could not reach the server.".into(),
            Self::Transport(err) if err.is_timeout() => "The server took too long to respond.".into(),
            Self::Transport(_) => "The request could not be sent.".into(),
            Self::Status { status, detail } => format!("Server error {status}: {detail}"),
        }
    }
}

/// REST API client bound to one server base URL.
#[derive(Clone, Debug)]
pub struct RestApi {
    base: String,
    http: reqwest::Client,
}

impl RestApi {
    /// Create a client for the given base URL (no trailing slash).
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            http: reqwest::Client::new(),
        }
    }

    // ─── Interactive sessions ────────────────────────────────────────────

    /// List all interactive sessions.
    pub async fn list_states(&self) -> Result<Vec<SessionMeta>, ApiError> {
        self.get_json("/states").await
    }

    /// Fetch the full state snapshot of one interactive session.
    pub async fn get_state(&self, id: &str) -> Result<SessionState, ApiError> {
        self.get_json(&format!("/states/{id}")).await
    }

    /// Create a new interactive session, optionally seeded with a first
    /// user message.
    pub async fn create_state(
        &self,
        start_content: Option<&str>,
    ) -> Result<SessionState, ApiError> {
        let resp = self
            .http
            .post(format!("{}/states", self.base))
            .json(&json!({ "start_content": start_content }))
            .send()
            .await?;
        Self::decode(resp).await
    }

    // ─── Saved sessions ──────────────────────────────────────────────────

    /// List all saved sessions.
    pub async fn list_saves(&self) -> Result<Vec<SaveMeta>, ApiError> {
        self.get_json("/saves").await
    }

    /// Fetch the end-state snapshot of a saved session.
    pub async fn get_save_state(&self, id: &str) -> Result<SessionState, ApiError> {
        self.get_json(&format!("/saves/{id}")).await
    }

    /// Fetch the full recorded event list of a saved session, in order.
    pub async fn get_save_events(&self, id: &str) -> Result<Vec<SessionEvent>, ApiError> {
        self.get_json(&format!("/saves/{id}/events")).await
    }

    /// Delete a saved session; returns the metadata of what was removed.
    pub async fn delete_save(&self, id: &str) -> Result<SaveMeta, ApiError> {
        let resp = self
            .http
            .delete(format!("{}/saves/{id}", self.base))
            .send()
            .await?;
        Self::decode(resp).await
    }

    // ─── Plumbing ────────────────────────────────────────────────────────

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(path, "GET");
        let resp = self.http.get(format!("{}{path}", self.base)).send().await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let body = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str().map(ToOwned::to_owned)))
            .unwrap_or(body);
        Err(ApiError::Status {
            status: status.as_u16(),
            detail,
        })
    }
}
