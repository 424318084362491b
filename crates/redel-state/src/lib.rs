//! # redel-state
//!
//! The authoritative in-memory mirror of server session state.
//!
//! [`SessionStore`] merges a one-shot REST snapshot with the live event
//! stream: `hydrate` installs a full snapshot, `apply` folds forward events
//! into the tree, and `undo` reverses a recorded event sequence for
//! time-travel playback. [`ReplayCursor`] drives `apply`/`undo` over a
//! finite archived event list.
//!
//! Every per-event error here is non-fatal: logged via `tracing` and
//! dropped, never a panic. The tree is an id-keyed table with parent/child
//! id lists, so there is no cyclic ownership to manage.

#![deny(unsafe_code)]

pub mod replay;
pub mod store;
pub mod tree;

pub use replay::ReplayCursor;
pub use store::{SessionStore, TokenCounters};
pub use tree::TreeNode;
