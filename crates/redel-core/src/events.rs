//! The [`SessionEvent`] tagged union — every message on the session stream.
//!
//! Each event is one JSON text frame with a `"type"` discriminator, matching
//! the server's event schema string-for-string (e.g. `"kani_spawn"`).
//! Decoding is lossless for forward compatibility: a frame whose `type` is
//! not recognized becomes [`SessionEvent::Unknown`] carrying the raw JSON,
//! while a *recognized* type with a malformed payload is a decode error the
//! caller logs and drops.

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::chat::{ChatMessage, ChatRole};
use crate::kani::{KaniState, RunState};

/// Wire discriminators of all known event types, in schema order.
pub const KNOWN_EVENT_TYPES: [&str; 10] = [
    "kani_spawn",
    "kani_state_change",
    "kani_message",
    "root_message",
    "stream_delta",
    "session_meta_update",
    "tokens_used",
    "round_complete",
    "error",
    "send_message",
];

/// A recognized frame whose payload did not match its declared type.
#[derive(Debug, Error)]
#[error("malformed {event_type} event: {source}")]
pub struct EventDecodeError {
    /// The declared `type` discriminator.
    pub event_type: String,
    /// The underlying JSON error.
    #[source]
    pub source: serde_json::Error,
}

/// A typed state-change event on the session stream.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// A new kani was spawned; carries its full state. A repeated id
    /// overwrites the previous state.
    KaniSpawn(KaniState),
    /// A kani's run state changed.
    KaniStateChange {
        /// Kani ID.
        id: String,
        /// New run state.
        state: RunState,
    },
    /// A kani appended a message to its chat history.
    KaniMessage {
        /// Kani ID.
        id: String,
        /// The appended message.
        msg: ChatMessage,
    },
    /// The root kani has a new message (fired in addition to `kani_message`).
    RootMessage {
        /// The appended message.
        msg: ChatMessage,
    },
    /// A kani is streaming and emitted a new token.
    StreamDelta {
        /// Kani ID.
        id: String,
        /// Partial text chunk.
        delta: String,
        /// Role of the in-progress message.
        role: ChatRole,
    },
    /// The session's title changed.
    SessionMetaUpdate {
        /// New title.
        title: Option<String>,
    },
    /// A kani finished an engine request that used this many tokens.
    TokensUsed {
        /// Kani ID.
        id: String,
        /// Prompt tokens consumed.
        prompt_tokens: u64,
        /// Completion tokens generated.
        completion_tokens: u64,
    },
    /// The root kani finished a full round; control returns to the user.
    RoundComplete {
        /// Session ID.
        session_id: String,
    },
    /// A server-side error surfaced to the client.
    Error {
        /// Error message.
        msg: String,
    },
    /// Outbound: the user submitted a message to the root kani.
    SendMessage {
        /// Message text.
        content: String,
    },
    /// An event type this client does not recognize; kept verbatim.
    Unknown {
        /// The declared `type` discriminator (empty if absent).
        event_type: String,
        /// The full raw frame.
        data: Value,
    },
}

// Per-variant payload mirrors. Kept private; `SessionEvent` itself owns the
// `type` dispatch so unknown discriminators can fall through losslessly.
#[derive(Deserialize)]
struct KaniStateChangePayload {
    id: String,
    state: RunState,
}

#[derive(Deserialize)]
struct KaniMessagePayload {
    id: String,
    msg: ChatMessage,
}

#[derive(Deserialize)]
struct RootMessagePayload {
    msg: ChatMessage,
}

#[derive(Deserialize)]
struct StreamDeltaPayload {
    id: String,
    delta: String,
    role: ChatRole,
}

#[derive(Deserialize)]
struct SessionMetaUpdatePayload {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct TokensUsedPayload {
    id: String,
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct RoundCompletePayload {
    session_id: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    msg: String,
}

#[derive(Deserialize)]
struct SendMessagePayload {
    content: String,
}

impl SessionEvent {
    /// The wire `type` discriminator for this event.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::KaniSpawn(_) => "kani_spawn",
            Self::KaniStateChange { .. } => "kani_state_change",
            Self::KaniMessage { .. } => "kani_message",
            Self::RootMessage { .. } => "root_message",
            Self::StreamDelta { .. } => "stream_delta",
            Self::SessionMetaUpdate { .. } => "session_meta_update",
            Self::TokensUsed { .. } => "tokens_used",
            Self::RoundComplete { .. } => "round_complete",
            Self::Error { .. } => "error",
            Self::SendMessage { .. } => "send_message",
            Self::Unknown { event_type, .. } => event_type,
        }
    }

    /// The kani ID this event targets, for id-addressed events.
    #[must_use]
    pub fn kani_id(&self) -> Option<&str> {
        match self {
            Self::KaniSpawn(k) => Some(&k.id),
            Self::KaniStateChange { id, .. }
            | Self::KaniMessage { id, .. }
            | Self::StreamDelta { id, .. }
            | Self::TokensUsed { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Decode a frame from a JSON value.
    ///
    /// Unknown `type` discriminators produce [`SessionEvent::Unknown`];
    /// a known discriminator with a malformed payload is an error.
    pub fn from_value(value: Value) -> Result<Self, EventDecodeError> {
        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let wrap = |source| EventDecodeError {
            event_type: event_type.clone(),
            source,
        };

        match event_type.as_str() {
            "kani_spawn" => serde_json::from_value(value)
                .map(Self::KaniSpawn)
                .map_err(wrap),
            "kani_state_change" => serde_json::from_value(value)
                .map(|p: KaniStateChangePayload| Self::KaniStateChange {
                    id: p.id,
                    state: p.state,
                })
                .map_err(wrap),
            "kani_message" => serde_json::from_value(value)
                .map(|p: KaniMessagePayload| Self::KaniMessage { id: p.id, msg: p.msg })
                .map_err(wrap),
            "root_message" => serde_json::from_value(value)
                .map(|p: RootMessagePayload| Self::RootMessage { msg: p.msg })
                .map_err(wrap),
            "stream_delta" => serde_json::from_value(value)
                .map(|p: StreamDeltaPayload| Self::StreamDelta {
                    id: p.id,
                    delta: p.delta,
                    role: p.role,
                })
                .map_err(wrap),
            "session_meta_update" => serde_json::from_value(value)
                .map(|p: SessionMetaUpdatePayload| Self::SessionMetaUpdate { title: p.title })
                .map_err(wrap),
            "tokens_used" => serde_json::from_value(value)
                .map(|p: TokensUsedPayload| Self::TokensUsed {
                    id: p.id,
                    prompt_tokens: p.prompt_tokens,
                    completion_tokens: p.completion_tokens,
                })
                .map_err(wrap),
            "round_complete" => serde_json::from_value(value)
                .map(|p: RoundCompletePayload| Self::RoundComplete {
                    session_id: p.session_id,
                })
                .map_err(wrap),
            "error" => serde_json::from_value(value)
                .map(|p: ErrorPayload| Self::Error { msg: p.msg })
                .map_err(wrap),
            "send_message" => serde_json::from_value(value)
                .map(|p: SendMessagePayload| Self::SendMessage { content: p.content })
                .map_err(wrap),
            _ => Ok(Self::Unknown {
                event_type,
                data: value,
            }),
        }
    }

    /// Encode this event to a JSON value with its `type` discriminator.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        fn tagged(event_type: &str, mut fields: Map<String, Value>) -> Value {
            let _ = fields.insert("type".to_owned(), Value::String(event_type.to_owned()));
            Value::Object(fields)
        }

        let as_map = |v: Value| match v {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Ok(match self {
            Self::KaniSpawn(kani) => tagged("kani_spawn", as_map(serde_json::to_value(kani)?)),
            Self::KaniStateChange { id, state } => tagged(
                "kani_state_change",
                as_map(serde_json::json!({ "id": id, "state": state })),
            ),
            Self::KaniMessage { id, msg } => tagged(
                "kani_message",
                as_map(serde_json::json!({ "id": id, "msg": msg })),
            ),
            Self::RootMessage { msg } => {
                tagged("root_message", as_map(serde_json::json!({ "msg": msg })))
            }
            Self::StreamDelta { id, delta, role } => tagged(
                "stream_delta",
                as_map(serde_json::json!({ "id": id, "delta": delta, "role": role })),
            ),
            Self::SessionMetaUpdate { title } => tagged(
                "session_meta_update",
                as_map(serde_json::json!({ "title": title })),
            ),
            Self::TokensUsed {
                id,
                prompt_tokens,
                completion_tokens,
            } => tagged(
                "tokens_used",
                as_map(serde_json::json!({
                    "id": id,
                    "prompt_tokens": prompt_tokens,
                    "completion_tokens": completion_tokens,
                })),
            ),
            Self::RoundComplete { session_id } => tagged(
                "round_complete",
                as_map(serde_json::json!({ "session_id": session_id })),
            ),
            Self::Error { msg } => tagged("error", as_map(serde_json::json!({ "msg": msg }))),
            Self::SendMessage { content } => tagged(
                "send_message",
                as_map(serde_json::json!({ "content": content })),
            ),
            Self::Unknown { data, .. } => data.clone(),
        })
    }
}

impl Serialize for SessionEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_value()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SessionEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
