//! The [`SessionStore`] — sole mutation point for session state.
//!
//! The store mirrors the server's view of a session: an id-keyed table of
//! [`KaniState`]s forming a rooted tree, the root transcript, session
//! metadata, and the per-kani stream-delta buffers.
//!
//! Forward semantics (`apply`) match the server's event contract; backward
//! semantics (`undo`) are a best-effort inverse that is only valid when
//! invoked in exact reverse order of a recorded apply sequence. Every
//! per-event error is logged and dropped — malformed-but-typed input never
//! panics.

use std::collections::HashMap;

use tracing::{debug, warn};

use redel_core::{ChatMessage, ChatRole, KaniState, RunState, SessionEvent, SessionMeta, SessionState};

use crate::tree::TreeNode;

/// Accumulated engine token usage for one kani.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenCounters {
    /// Total prompt tokens consumed.
    pub prompt_tokens: u64,
    /// Total completion tokens generated.
    pub completion_tokens: u64,
}

/// Authoritative in-memory mirror of one session's state tree.
#[derive(Debug, Default)]
pub struct SessionStore {
    kanis: HashMap<String, KaniState>,
    root_id: Option<String>,
    root_messages: Vec<ChatMessage>,
    meta: Option<SessionMeta>,
    stream_buffers: HashMap<String, String>,
    token_usage: HashMap<String, TokenCounters>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store hydrated from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: SessionState) -> Self {
        let mut store = Self::new();
        store.hydrate(snapshot);
        store
    }

    // ─── Hydration ───────────────────────────────────────────────────────

    /// Replace all state with the contents of a wire snapshot.
    ///
    /// Identifies the unique null-parent kani as the root and copies its
    /// chat history into the root transcript. Zero or multiple roots is an
    /// invariant violation: logged loudly, never fatal — whatever resolves
    /// is still installed (last null-parent wins).
    pub fn hydrate(&mut self, snapshot: SessionState) {
        self.kanis.clear();
        self.root_id = None;
        self.root_messages.clear();
        self.stream_buffers.clear();
        self.token_usage.clear();

        let mut root_count = 0usize;
        for kani in snapshot.state {
            if kani.is_root() {
                root_count += 1;
                self.root_id = Some(kani.id.clone());
                self.root_messages = kani.chat_history.clone();
            }
            let _ = self.kanis.insert(kani.id.clone(), kani);
        }
        self.meta = Some(snapshot.meta);

        match root_count {
            1 => debug!(kanis = self.kanis.len(), "hydrated session state"),
            0 => warn!("snapshot contains no root kani; root transcript unavailable"),
            n => warn!(roots = n, "snapshot contains multiple root kanis; using the last"),
        }
    }

    // ─── Forward apply ───────────────────────────────────────────────────

    /// Fold one stream event into the tree.
    ///
    /// Unknown event kinds are ignored with a debug log (forward
    /// compatibility); dangling id references are warned and dropped.
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::KaniSpawn(kani) => self.on_kani_spawn(kani),
            SessionEvent::KaniStateChange { id, state } => self.on_kani_state_change(id, *state),
            SessionEvent::KaniMessage { id, msg } => self.on_kani_message(id, msg),
            SessionEvent::RootMessage { msg } => self.on_root_message(msg),
            SessionEvent::StreamDelta { id, delta, role } => {
                self.on_stream_delta(id, delta, *role);
            }
            SessionEvent::SessionMetaUpdate { title } => self.on_session_meta_update(title),
            SessionEvent::TokensUsed {
                id,
                prompt_tokens,
                completion_tokens,
            } => self.on_tokens_used(id, *prompt_tokens, *completion_tokens),
            // Connection/client-level events; no tree effect.
            SessionEvent::RoundComplete { .. }
            | SessionEvent::Error { .. }
            | SessionEvent::SendMessage { .. } => {}
            SessionEvent::Unknown { event_type, .. } => {
                debug!(event_type, "ignoring unknown event kind");
            }
        }
    }

    fn on_kani_spawn(&mut self, kani: &KaniState) {
        // Duplicate ids overwrite the previous state (last-write-wins).
        let _ = self.kanis.insert(kani.id.clone(), kani.clone());

        let Some(parent_id) = &kani.parent else {
            // Becomes the root iff no root is set yet.
            if self.root_id.is_none() {
                self.root_id = Some(kani.id.clone());
                self.root_messages = kani.chat_history.clone();
            }
            return;
        };
        let Some(parent) = self.kanis.get_mut(parent_id) else {
            warn!(id = %kani.id, parent = %parent_id, "kani_spawn parent does not exist; node stored orphaned");
            return;
        };
        if !parent.children.contains(&kani.id) {
            parent.children.push(kani.id.clone());
        }
    }

    fn on_kani_state_change(&mut self, id: &str, state: RunState) {
        let Some(kani) = self.kanis.get_mut(id) else {
            warn!(id, "kani_state_change for nonexistent kani");
            return;
        };
        kani.state = state;
    }

    fn on_kani_message(&mut self, id: &str, msg: &ChatMessage) {
        let Some(kani) = self.kanis.get_mut(id) else {
            warn!(id, "kani_message for nonexistent kani");
            return;
        };
        kani.chat_history.push(msg.clone());
        // A finalized message ends any in-progress stream for this kani.
        let _ = self.stream_buffers.remove(id);
    }

    fn on_root_message(&mut self, msg: &ChatMessage) {
        if self.root_id.is_none() {
            warn!("root_message before a root kani is known");
            return;
        }
        self.root_messages.push(msg.clone());
    }

    fn on_stream_delta(&mut self, id: &str, delta: &str, role: ChatRole) {
        // Only assistant output is streamed to the viewer.
        if role != ChatRole::Assistant {
            return;
        }
        self.stream_buffers
            .entry(id.to_owned())
            .or_default()
            .push_str(delta);
    }

    fn on_session_meta_update(&mut self, title: &Option<String>) {
        let Some(meta) = self.meta.as_mut() else {
            warn!("session_meta_update before session meta is known");
            return;
        };
        meta.title.clone_from(title);
    }

    fn on_tokens_used(&mut self, id: &str, prompt_tokens: u64, completion_tokens: u64) {
        if !self.kanis.contains_key(id) {
            warn!(id, "tokens_used for nonexistent kani");
            return;
        }
        let counters = self.token_usage.entry(id.to_owned()).or_default();
        counters.prompt_tokens += prompt_tokens;
        counters.completion_tokens += completion_tokens;
    }

    // ─── Backward undo ───────────────────────────────────────────────────

    /// Reverse one previously applied event.
    ///
    /// Only valid when invoked in exact reverse order of a recorded apply
    /// sequence. Not a general inverse: `kani_state_change` undo guesses
    /// the prior state, since the wire does not carry it. Mismatches are
    /// logged, never fatal.
    pub fn undo(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::KaniSpawn(kani) => self.undo_kani_spawn(kani),
            SessionEvent::KaniStateChange { id, state } => self.undo_kani_state_change(id, *state),
            SessionEvent::KaniMessage { id, msg } => self.undo_kani_message(id, msg),
            SessionEvent::RootMessage { msg } => self.undo_root_message(msg),
            SessionEvent::TokensUsed {
                id,
                prompt_tokens,
                completion_tokens,
            } => self.undo_tokens_used(id, *prompt_tokens, *completion_tokens),
            other => {
                debug!(event_type = other.event_type(), "no undo handler for event kind");
            }
        }
    }

    fn undo_kani_spawn(&mut self, kani: &KaniState) {
        if let Some(parent_id) = &kani.parent {
            match self.kanis.get_mut(parent_id) {
                Some(parent) if parent.children.contains(&kani.id) => {
                    parent.children.retain(|child| child != &kani.id);
                }
                _ => {
                    warn!(id = %kani.id, parent = %parent_id, "undoing kani_spawn but parent is missing or lacks the child");
                }
            }
        } else if self.root_id.is_some() {
            self.root_id = None;
            self.root_messages.clear();
        }
        let _ = self.kanis.remove(&kani.id);
        let _ = self.stream_buffers.remove(&kani.id);
        let _ = self.token_usage.remove(&kani.id);
    }

    fn undo_kani_state_change(&mut self, id: &str, state: RunState) {
        let Some(kani) = self.kanis.get_mut(id) else {
            warn!(id, "undoing kani_state_change for nonexistent kani");
            return;
        };
        // Best-effort guess; the true prior state is not retained on the wire.
        kani.state = match state {
            RunState::Running => RunState::Waiting,
            RunState::Waiting | RunState::Stopped => RunState::Running,
            RunState::Errored => RunState::Stopped,
        };
    }

    fn undo_kani_message(&mut self, id: &str, msg: &ChatMessage) {
        let Some(kani) = self.kanis.get_mut(id) else {
            warn!(id, "undoing kani_message for nonexistent kani");
            return;
        };
        let removed = kani.chat_history.pop();
        if removed.as_ref().map(|m| &m.content) != Some(&msg.content) {
            warn!(id, "undo of kani_message popped a mismatched message");
        }
        let _ = self.stream_buffers.remove(id);
    }

    fn undo_root_message(&mut self, msg: &ChatMessage) {
        let removed = self.root_messages.pop();
        if removed.as_ref().map(|m| &m.content) != Some(&msg.content) {
            warn!("undo of root_message popped a mismatched message");
        }
    }

    fn undo_tokens_used(&mut self, id: &str, prompt_tokens: u64, completion_tokens: u64) {
        if let Some(counters) = self.token_usage.get_mut(id) {
            counters.prompt_tokens = counters.prompt_tokens.saturating_sub(prompt_tokens);
            counters.completion_tokens = counters.completion_tokens.saturating_sub(completion_tokens);
        }
    }

    // ─── Read-only views ─────────────────────────────────────────────────

    /// Build a read-only nested snapshot of the tree, rooted at the current
    /// root. `None` if no root is known.
    ///
    /// Child ids that do not resolve are skipped with a warning; a kani is
    /// visited at most once, so malformed parent/child links cannot recurse
    /// forever.
    #[must_use]
    pub fn snapshot_tree(&self) -> Option<TreeNode> {
        let root_id = self.root_id.as_deref()?;
        let mut visited = std::collections::HashSet::new();
        self.build_subtree(root_id, &mut visited)
    }

    fn build_subtree<'a>(
        &'a self,
        id: &'a str,
        visited: &mut std::collections::HashSet<&'a str>,
    ) -> Option<TreeNode> {
        if !visited.insert(id) {
            warn!(id, "cycle in kani tree; skipping repeated node");
            return None;
        }
        let Some(kani) = self.kanis.get(id) else {
            warn!(id, "dangling child reference in kani tree");
            return None;
        };
        let children = kani
            .children
            .iter()
            .filter_map(|child| self.build_subtree(child, visited))
            .collect();
        Some(TreeNode {
            id: kani.id.clone(),
            name: kani.name.clone(),
            state: kani.state,
            depth: kani.depth,
            children,
        })
    }

    /// Look up a kani by id.
    #[must_use]
    pub fn kani(&self, id: &str) -> Option<&KaniState> {
        self.kanis.get(id)
    }

    /// The current root kani, if known.
    #[must_use]
    pub fn root(&self) -> Option<&KaniState> {
        self.kanis.get(self.root_id.as_deref()?)
    }

    /// The root transcript (chat history of the root kani, as a view).
    #[must_use]
    pub fn root_messages(&self) -> &[ChatMessage] {
        &self.root_messages
    }

    /// Session metadata, once hydrated.
    #[must_use]
    pub fn meta(&self) -> Option<&SessionMeta> {
        self.meta.as_ref()
    }

    /// In-progress stream text for a kani, if any.
    #[must_use]
    pub fn stream_buffer(&self, id: &str) -> Option<&str> {
        self.stream_buffers.get(id).map(String::as_str)
    }

    /// Accumulated token usage for a kani.
    #[must_use]
    pub fn token_usage(&self, id: &str) -> Option<TokenCounters> {
        self.token_usage.get(id).copied()
    }

    /// Number of kanis in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kanis.len()
    }

    /// Whether the store holds no kanis.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kanis.is_empty()
    }

    /// Iterate over all kani ids in arbitrary order.
    pub fn kani_ids(&self) -> impl Iterator<Item = &str> {
        self.kanis.keys().map(String::as_str)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
