//! Kani (agent) node state.
//!
//! A [`KaniState`] is one sub-conversation participant in the delegation
//! tree, flattened for the wire: parent/children are id references, never
//! nested objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ChatMessage, ChatRole};

/// Execution state of a kani, used for node coloring in the viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Not running anything or waiting on a child.
    Stopped,
    /// The engine is generating.
    Running,
    /// Waiting on a child.
    Waiting,
    /// Panicked.
    Errored,
}

impl RunState {
    /// Canonical wire string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Errored => "errored",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A callable function declared on a kani.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AiFunctionState {
    /// Function name.
    pub name: String,
    /// Human-readable description.
    pub desc: String,
    /// Whether the kani retries on malformed arguments.
    pub auto_retry: bool,
    /// Max result length before truncation, if any.
    #[serde(default)]
    pub auto_truncate: Option<u64>,
    /// Role the result is recorded under.
    pub after: ChatRole,
    /// JSON schema of the arguments.
    pub json_schema: Value,
}

/// Full state of one kani in the delegation tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KaniState {
    /// Unique kani ID.
    pub id: String,
    /// Depth in the tree (0 for the root).
    pub depth: u32,
    /// Parent kani ID; `None` only for the unique root.
    #[serde(default)]
    pub parent: Option<String>,
    /// Ordered child kani IDs.
    #[serde(default)]
    pub children: Vec<String>,
    /// Messages pinned to the top of the context.
    #[serde(default)]
    pub always_included_messages: Vec<ChatMessage>,
    /// Ordered conversation history.
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    /// Current run state.
    pub state: RunState,
    /// Display name.
    pub name: String,
    /// Engine class name.
    #[serde(default)]
    pub engine_type: String,
    /// Engine repr (model, params).
    #[serde(default)]
    pub engine_repr: String,
    /// Declared callable functions.
    #[serde(default)]
    pub functions: Vec<AiFunctionState>,
}

impl KaniState {
    /// Whether this kani is the tree root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_kani_json() -> Value {
        json!({
            "id": "root",
            "depth": 0,
            "parent": null,
            "children": [],
            "always_included_messages": [],
            "chat_history": [],
            "state": "stopped",
            "name": "root",
            "engine_type": "OpenAIEngine",
            "engine_repr": "gpt-4",
            "functions": []
        })
    }

    #[test]
    fn run_state_wire_strings() {
        for (state, s) in [
            (RunState::Stopped, "stopped"),
            (RunState::Running, "running"),
            (RunState::Waiting, "waiting"),
            (RunState::Errored, "errored"),
        ] {
            assert_eq!(state.as_str(), s);
            assert_eq!(serde_json::to_value(state).unwrap(), json!(s));
        }
    }

    #[test]
    fn kani_state_roundtrip() {
        let kani: KaniState = serde_json::from_value(minimal_kani_json()).unwrap();
        assert!(kani.is_root());
        assert_eq!(kani.state, RunState::Stopped);
        let back = serde_json::to_value(&kani).unwrap();
        let again: KaniState = serde_json::from_value(back).unwrap();
        assert_eq!(again, kani);
    }

    #[test]
    fn child_kani_is_not_root() {
        let mut json = minimal_kani_json();
        json["id"] = "child-1".into();
        json["parent"] = "root".into();
        json["depth"] = 1.into();
        let kani: KaniState = serde_json::from_value(json).unwrap();
        assert!(!kani.is_root());
        assert_eq!(kani.parent.as_deref(), Some("root"));
    }

    #[test]
    fn missing_collections_default_empty() {
        let kani: KaniState = serde_json::from_value(json!({
            "id": "k", "depth": 1, "parent": "root", "state": "running", "name": "k"
        }))
        .unwrap();
        assert!(kani.children.is_empty());
        assert!(kani.chat_history.is_empty());
        assert!(kani.functions.is_empty());
    }

    #[test]
    fn ai_function_state_roundtrip() {
        let f = AiFunctionState {
            name: "delegate".into(),
            desc: "Delegate a task".into(),
            auto_retry: true,
            auto_truncate: Some(4096),
            after: ChatRole::Function,
            json_schema: json!({"type": "object"}),
        };
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["after"], "function");
        let back: AiFunctionState = serde_json::from_value(json).unwrap();
        assert_eq!(back, f);
    }
}
