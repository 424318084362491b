//! WebSocket connection lifecycle.
//!
//! [`ConnectionManager`] owns the socket for one session: it dials, pumps
//! inbound frames into the shared [`SessionStore`], re-broadcasts the typed
//! events to subscribers, and reconnects with linear backoff plus jitter
//! when the transport drops or the server asks for a restart (close code
//! 1012). A clean server close with any other code is terminal.
//!
//! All socket I/O runs on one spawned task; `close()` cancels it via the
//! join handle, which also covers a task parked in backoff sleep.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use redel_core::SessionEvent;
use redel_state::SessionStore;

use crate::config::ClientConfig;
use crate::notify::NotificationSink;

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long `close()` waits for the graceful close before aborting the task.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Error from an outbound send.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// No open transport to write to. Outbound frames are never queued.
    #[error("not connected")]
    NotConnected,
    /// The event could not be encoded as JSON.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    /// The event broadcast channel shut down.
    #[error("event channel closed")]
    ChannelClosed,
}

/// Observable lifecycle state of the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Never connected.
    Idle,
    /// First dial in progress.
    Connecting,
    /// Socket open, events flowing.
    Open,
    /// Closed on purpose (by us, or by the server with a non-restart code).
    ClosedClean,
    /// Lost and not currently retrying; `connect()` starts over.
    ClosedDirty,
    /// Lost, retry scheduled or in progress.
    Reconnecting,
}

impl ConnectionStatus {
    /// Lowercase status name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::ClosedClean => "closed_clean",
            Self::ClosedDirty => "closed_dirty",
            Self::Reconnecting => "reconnecting",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    /// Do not reconnect.
    Clean,
    /// Reconnect if attempts remain.
    Dirty,
}

/// Manages one session's WebSocket: dial, pump, reconnect.
#[derive(Debug)]
pub struct ConnectionManager {
    config: ClientConfig,
    url: String,
    store: Arc<Mutex<SessionStore>>,
    notify: NotificationSink,
    events: broadcast::Sender<SessionEvent>,
    status: watch::Sender<ConnectionStatus>,
    writer: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager for the given WebSocket URL. Nothing is dialed
    /// until [`connect`](Self::connect).
    #[must_use]
    pub fn new(
        url: String,
        config: ClientConfig,
        store: Arc<Mutex<SessionStore>>,
        notify: NotificationSink,
    ) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status, _rx) = watch::channel(ConnectionStatus::Idle);
        Self {
            config,
            url,
            store,
            notify,
            events,
            status,
            writer: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Subscribe to status transitions.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Subscribe to the typed event stream. Every decoded inbound event is
    /// re-broadcast here after it has been applied to the store.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Open the connection, closing any prior transport cleanly first.
    pub async fn connect(self: &Arc<Self>) {
        self.close().await;
        self.set_status(ConnectionStatus::Connecting);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *self.task.lock() = Some(handle);
    }

    /// Close the connection and cancel any pending reconnect. Idempotent.
    pub async fn close(&self) {
        let writer = self.writer.lock().take();
        let task = self.task.lock().take();
        let had_transport = writer.is_some() || task.is_some();

        if let Some(tx) = writer {
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "closed by client".into(),
            })));
        }
        if let Some(mut handle) = task {
            // The run task exits on its own once the close frame is written;
            // abort covers a task parked in backoff sleep.
            if tokio::time::timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        if had_transport {
            self.set_status(ConnectionStatus::ClosedClean);
        }
    }

    /// Serialize an event and write it as a text frame.
    ///
    /// Fire-and-forget: there is no delivery confirmation and nothing is
    /// queued while the socket is down.
    pub fn send(&self, event: &SessionEvent) -> Result<(), ConnectionError> {
        let json = serde_json::to_string(event)?;
        let guard = self.writer.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(ConnectionError::NotConnected);
        };
        tx.send(Message::text(json))
            .map_err(|_| ConnectionError::NotConnected)
    }

    // ─── Run loop ────────────────────────────────────────────────────────

    async fn run(self: Arc<Self>) {
        let mut attempt: u32 = 0;
        loop {
            match self.dial_and_pump(&mut attempt).await {
                Disposition::Clean => {
                    let _ = self.writer.lock().take();
                    self.set_status(ConnectionStatus::ClosedClean);
                    info!("connection closed cleanly");
                    return;
                }
                Disposition::Dirty => {
                    let _ = self.writer.lock().take();
                    attempt += 1;
                    if attempt > self.config.max_reconnect_attempts {
                        self.set_status(ConnectionStatus::ClosedDirty);
                        self.notify.error("Lost connection to the server.");
                        warn!(attempts = attempt - 1, "giving up on reconnection");
                        return;
                    }
                    self.set_status(ConnectionStatus::Reconnecting);
                    let delay = self.backoff_delay(attempt);
                    debug!(attempt, ?delay, "reconnecting after backoff");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn dial_and_pump(&self, attempt: &mut u32) -> Disposition {
        let stream = match connect_async(&self.url).await {
            Ok((stream, _resp)) => stream,
            Err(err) => {
                warn!(error = %err, url = %self.url, "websocket dial failed");
                return Disposition::Dirty;
            }
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.writer.lock() = Some(tx);
        let (mut sink, mut source) = stream.split();

        // writer is registered before the status flips, so a send() racing
        // on the Open transition cannot miss the channel
        let reconnected = *attempt > 0;
        *attempt = 0;
        self.set_status(ConnectionStatus::Open);
        info!(url = %self.url, "websocket open");
        if reconnected {
            self.notify.success("Reconnected to the server.");
        }

        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    let Some(message) = outbound else {
                        // writer slot dropped out from under us: local close
                        return Disposition::Clean;
                    };
                    let closing = matches!(message, Message::Close(_));
                    if let Err(err) = sink.send(message).await {
                        warn!(error = %err, "websocket write failed");
                        return Disposition::Dirty;
                    }
                    if closing {
                        return Disposition::Clean;
                    }
                }
                inbound = source.next() => match inbound {
                    Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()),
                    Some(Ok(Message::Close(frame))) => return self.close_disposition(frame.as_ref()),
                    // ping/pong are answered by the protocol layer; binary
                    // frames have no meaning on this wire
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket read failed");
                        return Disposition::Dirty;
                    }
                    None => {
                        warn!("websocket stream ended without a close frame");
                        return Disposition::Dirty;
                    }
                }
            }
        }
    }

    /// Decode one inbound text frame, fold it into the store, re-broadcast.
    ///
    /// Malformed frames are logged and dropped; the stream keeps flowing.
    pub(crate) fn handle_frame(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "dropping non-JSON frame");
                return;
            }
        };
        match SessionEvent::from_value(value) {
            Ok(event) => {
                if let SessionEvent::Error { msg } = &event {
                    self.notify.error(msg.clone());
                }
                self.store.lock().apply(&event);
                let _ = self.events.send(event);
            }
            Err(err) => warn!(error = %err, "dropping undecodable event frame"),
        }
    }

    fn close_disposition(&self, frame: Option<&CloseFrame>) -> Disposition {
        match frame {
            Some(frame) if u16::from(frame.code) == self.config.restart_close_code => {
                info!("server requested a reconnect");
                Disposition::Dirty
            }
            Some(frame) => {
                debug!(code = u16::from(frame.code), "server closed the connection");
                Disposition::Clean
            }
            // no close frame at all is an unclean shutdown
            None => Disposition::Dirty,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = u64::from(attempt) * self.config.reconnect_base_delay_ms;
        let jitter = if self.config.reconnect_jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..self.config.reconnect_jitter_ms)
        };
        Duration::from_millis(base + jitter)
    }

    fn set_status(&self, status: ConnectionStatus) {
        debug!(status = status.as_str(), "connection status");
        let _ = self.status.send_replace(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::notify::NotificationLevel;

    const WAIT: Duration = Duration::from_secs(5);

    fn manager_with(config: ClientConfig, url: &str) -> (Arc<ConnectionManager>, Arc<Mutex<SessionStore>>, NotificationSink) {
        let store = Arc::new(Mutex::new(SessionStore::new()));
        let notify = NotificationSink::default();
        let manager = Arc::new(ConnectionManager::new(
            url.into(),
            config,
            Arc::clone(&store),
            notify.clone(),
        ));
        (manager, store, notify)
    }

    fn spawn_json(id: &str) -> String {
        json!({
            "type": "kani_spawn",
            "id": id,
            "depth": 0,
            "parent": null,
            "children": [],
            "always_included_messages": [],
            "chat_history": [],
            "state": "running",
            "name": id,
            "engine_type": "OpenAIEngine",
            "engine_repr": "gpt-4"
        })
        .to_string()
    }

    async fn wait_for_status(rx: &mut watch::Receiver<ConnectionStatus>, want: ConnectionStatus) {
        let result = tokio::time::timeout(WAIT, rx.wait_for(|status| *status == want)).await;
        let _ = result
            .unwrap_or_else(|_| panic!("timed out waiting for {}", want.as_str()))
            .unwrap();
    }

    #[test]
    fn status_starts_idle() {
        let (manager, _, _) = manager_with(ClientConfig::default(), "ws://127.0.0.1:1");
        assert_eq!(manager.status(), ConnectionStatus::Idle);
    }

    #[test]
    fn send_before_connect_fails() {
        let (manager, _, _) = manager_with(ClientConfig::default(), "ws://127.0.0.1:1");
        let err = manager
            .send(&SessionEvent::SendMessage {
                content: "hi".into(),
            })
            .unwrap_err();
        assert_matches!(err, ConnectionError::NotConnected);
    }

    #[tokio::test]
    async fn frame_applies_to_store_and_rebroadcasts() {
        let (manager, store, _) = manager_with(ClientConfig::default(), "ws://127.0.0.1:1");
        let mut events = manager.events();

        manager.handle_frame(&spawn_json("root"));
        assert_eq!(store.lock().len(), 1);
        assert_matches!(events.try_recv().unwrap(), SessionEvent::KaniSpawn(_));
    }

    #[tokio::test]
    async fn unknown_event_is_rebroadcast_losslessly() {
        let (manager, store, _) = manager_with(ClientConfig::default(), "ws://127.0.0.1:1");
        let mut events = manager.events();

        manager.handle_frame(r#"{"type": "brand_new_thing", "payload": 7}"#);
        assert!(store.lock().is_empty());
        assert_matches!(
            events.try_recv().unwrap(),
            SessionEvent::Unknown { event_type, data } => {
                assert_eq!(event_type, "brand_new_thing");
                assert_eq!(data["payload"], 7);
            }
        );
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let (manager, store, _) = manager_with(ClientConfig::default(), "ws://127.0.0.1:1");
        let mut events = manager.events();

        manager.handle_frame("not json");
        // typed but malformed payload
        manager.handle_frame(r#"{"type": "kani_state_change", "id": 42}"#);
        assert!(store.lock().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn error_event_reaches_notification_sink() {
        let (manager, _, notify) = manager_with(ClientConfig::default(), "ws://127.0.0.1:1");
        let mut notes = notify.subscribe();

        manager.handle_frame(r#"{"type": "error", "msg": "engine exploded"}"#);
        let note = notes.recv().await.unwrap();
        assert_eq!(note.level, NotificationLevel::Danger);
        assert_eq!(note.message, "engine exploded");
    }

    #[test]
    fn close_disposition_table() {
        let (manager, _, _) = manager_with(ClientConfig::default(), "ws://127.0.0.1:1");
        let frame = |code: CloseCode| CloseFrame {
            code,
            reason: "".into(),
        };
        assert_eq!(
            manager.close_disposition(Some(&frame(CloseCode::Normal))),
            Disposition::Clean
        );
        assert_eq!(
            manager.close_disposition(Some(&frame(CloseCode::Restart))),
            Disposition::Dirty
        );
        // any non-restart code in a clean close is terminal
        assert_eq!(
            manager.close_disposition(Some(&frame(CloseCode::Library(4000)))),
            Disposition::Clean
        );
        assert_eq!(manager.close_disposition(None), Disposition::Dirty);
    }

    #[test]
    fn backoff_grows_linearly_with_jitter_bound() {
        let config = ClientConfig {
            reconnect_base_delay_ms: 1000,
            reconnect_jitter_ms: 1000,
            ..ClientConfig::default()
        };
        let (manager, _, _) = manager_with(config, "ws://127.0.0.1:1");
        for attempt in 1..=5u32 {
            let delay = manager.backoff_delay(attempt);
            let base = Duration::from_millis(u64::from(attempt) * 1000);
            assert!(delay >= base, "attempt {attempt}: {delay:?} below base");
            assert!(delay < base + Duration::from_millis(1000), "attempt {attempt}: {delay:?} over jitter bound");
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let config = ClientConfig {
            reconnect_base_delay_ms: 250,
            reconnect_jitter_ms: 0,
            ..ClientConfig::default()
        };
        let (manager, _, _) = manager_with(config, "ws://127.0.0.1:1");
        assert_eq!(manager.backoff_delay(3), Duration::from_millis(750));
    }

    // ─── Live socket tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn live_session_applies_events_then_closes_clean() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.send(Message::text(spawn_json("root"))).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "done".into(),
            }))
            .await
            .unwrap();
        });

        let (manager, store, _) = manager_with(ClientConfig::default(), &format!("ws://{addr}"));
        let mut status = manager.watch_status();
        let mut events = manager.events();
        manager.connect().await;

        let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert_matches!(event, SessionEvent::KaniSpawn(_));
        wait_for_status(&mut status, ConnectionStatus::ClosedClean).await;

        assert_eq!(store.lock().len(), 1);
        assert_eq!(store.lock().root().unwrap().id, "root");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn outbound_send_reaches_the_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            let frame = ws.next().await.unwrap().unwrap();
            let text = frame.into_text().unwrap();
            serde_json::from_str::<serde_json::Value>(text.as_str()).unwrap()
        });

        let (manager, _, _) = manager_with(ClientConfig::default(), &format!("ws://{addr}"));
        let mut status = manager.watch_status();
        manager.connect().await;
        wait_for_status(&mut status, ConnectionStatus::Open).await;

        manager
            .send(&SessionEvent::SendMessage {
                content: "hello from the client".into(),
            })
            .unwrap();

        let received = server.await.unwrap();
        assert_eq!(received["type"], "send_message");
        assert_eq!(received["content"], "hello from the client");
        manager.close().await;
    }

    #[tokio::test]
    async fn restart_code_reconnects_then_gives_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Restart,
                reason: "rolling restart".into(),
            }))
            .await
            .unwrap();
            // drop the listener: every retry gets connection refused
        });

        let config = ClientConfig {
            max_reconnect_attempts: 2,
            reconnect_base_delay_ms: 1,
            reconnect_jitter_ms: 0,
            ..ClientConfig::default()
        };
        let (manager, _, notify) = manager_with(config, &format!("ws://{addr}"));
        let mut status = manager.watch_status();
        let mut notes = notify.subscribe();
        manager.connect().await;

        wait_for_status(&mut status, ConnectionStatus::ClosedDirty).await;
        server.await.unwrap();

        let note = tokio::time::timeout(WAIT, notes.recv()).await.unwrap().unwrap();
        assert_eq!(note.level, NotificationLevel::Danger);
    }

    #[tokio::test]
    async fn close_cancels_a_pending_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Restart,
                reason: "".into(),
            }))
            .await
            .unwrap();
        });

        // backoff long enough that the task is certainly parked in sleep
        let config = ClientConfig {
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 60_000,
            reconnect_jitter_ms: 0,
            ..ClientConfig::default()
        };
        let (manager, _, _) = manager_with(config, &format!("ws://{addr}"));
        let mut status = manager.watch_status();
        manager.connect().await;

        wait_for_status(&mut status, ConnectionStatus::Reconnecting).await;
        server.await.unwrap();

        manager.close().await;
        assert_eq!(manager.status(), ConnectionStatus::ClosedClean);
        // idempotent
        manager.close().await;
        assert_eq!(manager.status(), ConnectionStatus::ClosedClean);
    }
}
