//! Session and save metadata delivered over REST.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kani::KaniState;

/// Metadata about a session (interactive or saved).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Session ID.
    pub id: String,
    /// User-visible title, if one has been generated.
    #[serde(default)]
    pub title: Option<String>,
    /// Last-modified time (epoch seconds).
    pub last_modified: f64,
    /// Number of events recorded in this session.
    pub n_events: u64,
}

impl SessionMeta {
    /// The last-modified time as a UTC timestamp.
    ///
    /// `None` if the wire value is out of `chrono`'s representable range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn last_modified_time(&self) -> Option<DateTime<Utc>> {
        let millis = (self.last_modified * 1000.0) as i64;
        DateTime::from_timestamp_millis(millis)
    }
}

/// Metadata about a saved (archived) session on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveMeta {
    /// Shared session metadata.
    #[serde(flatten)]
    pub meta: SessionMeta,
    /// Directory grouping components for the save browser.
    #[serde(default)]
    pub grouping_prefix: Vec<String>,
}

/// Full wire snapshot of a session: metadata plus the flattened kani list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Shared session metadata.
    #[serde(flatten)]
    pub meta: SessionMeta,
    /// All kanis in the session, in arbitrary order.
    pub state: Vec<KaniState>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
