//! The session client composition root.
//!
//! [`SessionClient`] wires together the REST API, the shared
//! [`SessionStore`], the [`ConnectionManager`] and the notification sink
//! for one session. Everything is constructed and injected explicitly;
//! there are no process-wide singletons.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::warn;

use redel_core::{ChatMessage, SessionEvent};
use redel_state::{ReplayCursor, SessionStore};

use crate::api::{ApiError, RestApi};
use crate::config::ClientConfig;
use crate::connection::{ConnectionError, ConnectionManager, ConnectionStatus};
use crate::notify::NotificationSink;

/// Client for one interactive session: snapshot, live events, outbound
/// messages.
#[derive(Debug)]
pub struct SessionClient {
    session_id: String,
    api: RestApi,
    store: Arc<Mutex<SessionStore>>,
    connection: Arc<ConnectionManager>,
    notify: NotificationSink,
    ready: watch::Sender<bool>,
}

impl SessionClient {
    /// Create a client for a session. Nothing is fetched or dialed yet.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        config: ClientConfig,
        notify: NotificationSink,
    ) -> Self {
        let session_id = session_id.into();
        let store = Arc::new(Mutex::new(SessionStore::new()));
        let api = RestApi::new(config.api_base.clone());
        let connection = Arc::new(ConnectionManager::new(
            config.ws_url(&session_id),
            config,
            Arc::clone(&store),
            notify.clone(),
        ));
        let (ready, _rx) = watch::channel(false);
        Self {
            session_id,
            api,
            store,
            connection,
            notify,
            ready,
        }
    }

    /// The session this client is bound to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The underlying REST client, for callers that need the archive
    /// endpoints directly.
    #[must_use]
    pub fn api(&self) -> &RestApi {
        &self.api
    }

    /// Shared handle to the session state.
    #[must_use]
    pub fn store(&self) -> Arc<Mutex<SessionStore>> {
        Arc::clone(&self.store)
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Subscribe to connection status transitions.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch_status()
    }

    /// Subscribe to the typed event stream.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.connection.events()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Open the WebSocket (closing any prior transport first).
    pub async fn connect(&self) {
        self.connection.connect().await;
    }

    /// Close the WebSocket and cancel any pending reconnect.
    pub async fn close(&self) {
        self.connection.close().await;
    }

    /// Fetch the REST snapshot, hydrate the store, and release everyone
    /// waiting in [`wait_for_ready`](Self::wait_for_ready).
    ///
    /// On failure the error is surfaced through the notification sink and
    /// returned; the ready flag stays down.
    pub async fn fetch_snapshot(&self) -> Result<(), ApiError> {
        let snapshot = self.reported(self.api.get_state(&self.session_id).await)?;
        self.store.lock().hydrate(snapshot);
        let _ = self.ready.send_replace(true);
        Ok(())
    }

    /// Whether a snapshot has been hydrated.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolve once a snapshot has been hydrated. Resolves immediately if
    /// that already happened; all waiters are released together.
    pub async fn wait_for_ready(&self) {
        let mut rx = self.ready.subscribe();
        // the sender lives in self, so this cannot error
        let _ = rx.wait_for(|ready| *ready).await;
    }

    // ─── Messaging ───────────────────────────────────────────────────────

    /// Send a user message to the root kani. Fire-and-forget.
    pub fn send_message(&self, content: impl Into<String>) -> Result<(), ConnectionError> {
        self.connection.send(&SessionEvent::SendMessage {
            content: content.into(),
        })
    }

    /// Resolve with the next root assistant message that has no pending
    /// tool calls — the root's complete reply for the current round.
    /// Intermediate delegation messages are skipped.
    pub async fn wait_for_full_reply(&self) -> Result<ChatMessage, ConnectionError> {
        let mut events = self.connection.events();
        loop {
            match events.recv().await {
                Ok(SessionEvent::RootMessage { msg })
                    if msg.is_assistant() && !msg.has_tool_calls() =>
                {
                    return Ok(msg);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged while waiting for a reply");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ConnectionError::ChannelClosed);
                }
            }
        }
    }

    // ─── Archive playback ────────────────────────────────────────────────

    /// Load a saved session into a replay cursor positioned at its final
    /// state, ready to scrub backward.
    pub async fn fetch_save_replay(&self, save_id: &str) -> Result<ReplayCursor, ApiError> {
        let snapshot = self.reported(self.api.get_save_state(save_id).await)?;
        let events = self.reported(self.api.get_save_events(save_id).await)?;
        Ok(ReplayCursor::at_end(
            SessionStore::from_snapshot(snapshot),
            events,
        ))
    }

    fn reported<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(err) = &result {
            self.notify.http_error(err);
        }
        result
    }
}
