//! Client configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the session client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL for REST calls (default `"http://127.0.0.1:8000/api"`).
    pub api_base: String,
    /// Base URL for the WebSocket endpoint (default `"ws://127.0.0.1:8000/api/ws"`).
    pub ws_base: String,
    /// Reconnect attempts before giving up (default `5`).
    pub max_reconnect_attempts: u32,
    /// Base backoff delay in milliseconds; attempt N waits `N * base + jitter`.
    pub reconnect_base_delay_ms: u64,
    /// Upper bound on the random jitter added to each backoff delay.
    pub reconnect_jitter_ms: u64,
    /// Close code the server sends when it wants the client to reconnect.
    pub restart_close_code: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000/api".into(),
            ws_base: "ws://127.0.0.1:8000/api/ws".into(),
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1000,
            reconnect_jitter_ms: 1000,
            restart_close_code: 1012,
        }
    }
}

impl ClientConfig {
    /// Full WebSocket URL for a session.
    #[must_use]
    pub fn ws_url(&self, session_id: &str) -> String {
        format!("{}/{session_id}", self.ws_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_api_base() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.api_base, "http://127.0.0.1:8000/api");
    }

    #[test]
    fn default_ws_base() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.ws_base, "ws://127.0.0.1:8000/api/ws");
    }

    #[test]
    fn default_reconnect_policy() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.max_reconnect_attempts, 5);
        assert_eq!(cfg.reconnect_base_delay_ms, 1000);
        assert_eq!(cfg.reconnect_jitter_ms, 1000);
    }

    #[test]
    fn default_restart_close_code() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.restart_close_code, 1012);
    }

    #[test]
    fn ws_url_appends_session_id() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.ws_url("sess-1"), "ws://127.0.0.1:8000/api/ws/sess-1");
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ClientConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.api_base, cfg.api_base);
        assert_eq!(back.ws_base, cfg.ws_base);
        assert_eq!(back.max_reconnect_attempts, cfg.max_reconnect_attempts);
        assert_eq!(back.restart_close_code, cfg.restart_close_code);
    }

    #[test]
    fn deserialize_from_json_string() {
        let json = r#"{"api_base":"http://10.0.0.1:9000/api","ws_base":"ws://10.0.0.1:9000/api/ws","max_reconnect_attempts":2,"reconnect_base_delay_ms":100,"reconnect_jitter_ms":50,"restart_close_code":4000}"#;
        let cfg: ClientConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.api_base, "http://10.0.0.1:9000/api");
        assert_eq!(cfg.max_reconnect_attempts, 2);
        assert_eq!(cfg.restart_close_code, 4000);
    }
}
