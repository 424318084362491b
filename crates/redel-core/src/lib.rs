//! # redel-core
//!
//! Wire schema and data model for the ReDel session viewer client.
//!
//! This crate provides the shared vocabulary the other crates depend on:
//!
//! - **Chat types**: `ChatRole`, `ChatMessage`, `ToolCall`, `FunctionCall`
//! - **Kani state**: `KaniState`, `RunState`, `AiFunctionState` — one node in
//!   the delegation tree
//! - **Session types**: `SessionMeta`, `SaveMeta`, `SessionState`
//! - **Events**: `SessionEvent` — the tagged union delivered over the
//!   WebSocket, with a lossless `Unknown` fallback for forward compatibility
//!
//! Every type serializes to the exact snake_case wire format the Python
//! server and TypeScript viewer use.

#![deny(unsafe_code)]

pub mod chat;
pub mod events;
pub mod kani;
pub mod session;

pub use chat::{ChatMessage, ChatRole, FunctionCall, ToolCall};
pub use events::SessionEvent;
pub use kani::{AiFunctionState, KaniState, RunState};
pub use session::{SaveMeta, SessionMeta, SessionState};
