//! # redel-client
//!
//! Client for the session server: REST snapshots and archive access,
//! the live WebSocket event stream with automatic reconnection, and the
//! [`SessionClient`] composition root that ties them to a shared
//! [`redel_state::SessionStore`].
//!
//! Typical use:
//!
//! 1. build a [`ClientConfig`] and a [`NotificationSink`],
//! 2. construct a [`SessionClient`] for a session id,
//! 3. `connect()` then `fetch_snapshot()`,
//! 4. read state from the store, subscribe to `events()`, and
//!    `send_message()` to talk to the root kani.

#![deny(unsafe_code)]

pub mod api;
pub mod client;
pub mod config;
pub mod connection;
pub mod logging;
pub mod notify;

pub use api::{ApiError, RestApi};
pub use client::SessionClient;
pub use config::ClientConfig;
pub use connection::{ConnectionError, ConnectionManager, ConnectionStatus};
pub use notify::{Notification, NotificationLevel, NotificationSink};
