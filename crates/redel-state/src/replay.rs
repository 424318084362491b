//! Time-travel playback over an archived event list.
//!
//! A [`ReplayCursor`] owns a [`SessionStore`] plus the full ordered event
//! list of a saved session, and moves a position through it. Position `n`
//! means the first `n` events have been applied; `0` is the pristine state
//! and `len()` is the final state. Backward motion uses the store's
//! best-effort `undo`, so seeking is O(distance) with no re-apply from
//! scratch.

use redel_core::SessionEvent;

use crate::store::SessionStore;

/// A position-tracking cursor over a finite, ordered event list.
#[derive(Debug)]
pub struct ReplayCursor {
    store: SessionStore,
    events: Vec<SessionEvent>,
    position: usize,
}

impl ReplayCursor {
    /// Cursor at position 0 over an empty store. Stepping forward builds
    /// the session from nothing, as the live stream originally did.
    #[must_use]
    pub fn new(events: Vec<SessionEvent>) -> Self {
        Self {
            store: SessionStore::new(),
            events,
            position: 0,
        }
    }

    /// Cursor already at the final position, backed by a pre-hydrated
    /// store. Use when the saved end-state snapshot is available, so the
    /// common case (open at the end, scrub backward) costs no replay.
    #[must_use]
    pub fn at_end(store: SessionStore, events: Vec<SessionEvent>) -> Self {
        let position = events.len();
        Self {
            store,
            events,
            position,
        }
    }

    /// Move to an absolute position, clamped to `0..=len()`.
    ///
    /// Applies or undoes exactly the events between the current and target
    /// positions, in order (forward) or strict reverse order (backward).
    /// Returns the position actually reached.
    pub fn seek(&mut self, target: usize) -> usize {
        let target = target.min(self.events.len());
        while self.position < target {
            self.store.apply(&self.events[self.position]);
            self.position += 1;
        }
        while self.position > target {
            self.position -= 1;
            self.store.undo(&self.events[self.position]);
        }
        self.position
    }

    /// Apply the next event, if any. Returns the event stepped over.
    pub fn forward(&mut self) -> Option<&SessionEvent> {
        if self.position >= self.events.len() {
            return None;
        }
        self.store.apply(&self.events[self.position]);
        self.position += 1;
        Some(&self.events[self.position - 1])
    }

    /// Undo the previous event, if any. Returns the event stepped over.
    pub fn back(&mut self) -> Option<&SessionEvent> {
        if self.position == 0 {
            return None;
        }
        self.position -= 1;
        self.store.undo(&self.events[self.position]);
        Some(&self.events[self.position])
    }

    /// Current position: the count of applied events.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total number of events under the cursor.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the event list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether the cursor sits at the final state.
    #[must_use]
    pub fn at_final(&self) -> bool {
        self.position == self.events.len()
    }

    /// The state as of the current position.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redel_core::{ChatMessage, ChatRole, KaniState, RunState};

    fn kani(id: &str, parent: Option<&str>) -> KaniState {
        KaniState {
            id: id.into(),
            depth: u32::from(parent.is_some()),
            parent: parent.map(Into::into),
            children: vec![],
            always_included_messages: vec![],
            chat_history: vec![],
            state: RunState::Stopped,
            name: id.into(),
            engine_type: "OpenAIEngine".into(),
            engine_repr: "gpt-4".into(),
            functions: vec![],
        }
    }

    fn sample_events() -> Vec<SessionEvent> {
        vec![
            SessionEvent::KaniSpawn(kani("root", None)),
            SessionEvent::RootMessage {
                msg: ChatMessage::user("do the thing"),
            },
            SessionEvent::KaniSpawn(kani("helper", Some("root"))),
            SessionEvent::KaniMessage {
                id: "helper".into(),
                msg: ChatMessage::assistant("working on it"),
            },
            SessionEvent::RootMessage {
                msg: ChatMessage::assistant("done"),
            },
        ]
    }

    #[test]
    fn new_cursor_starts_pristine() {
        let cursor = ReplayCursor::new(sample_events());
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.len(), 5);
        assert!(cursor.store().is_empty());
    }

    #[test]
    fn forward_steps_apply_one_event_each() {
        let mut cursor = ReplayCursor::new(sample_events());
        assert!(cursor.forward().is_some());
        assert_eq!(cursor.store().len(), 1);
        assert!(cursor.forward().is_some());
        assert_eq!(cursor.store().root_messages().len(), 1);
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn forward_past_end_is_noop() {
        let mut cursor = ReplayCursor::new(sample_events());
        let _ = cursor.seek(5);
        assert!(cursor.at_final());
        assert!(cursor.forward().is_none());
        assert_eq!(cursor.position(), 5);
    }

    #[test]
    fn back_at_start_is_noop() {
        let mut cursor = ReplayCursor::new(sample_events());
        assert!(cursor.back().is_none());
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn seek_forward_reaches_full_state() {
        let mut cursor = ReplayCursor::new(sample_events());
        assert_eq!(cursor.seek(5), 5);
        let store = cursor.store();
        assert_eq!(store.len(), 2);
        assert_eq!(store.root_messages().len(), 2);
        assert_eq!(
            store.kani("helper").unwrap().chat_history[0].content.as_deref(),
            Some("working on it")
        );
    }

    #[test]
    fn seek_backward_unwinds_to_pristine() {
        let mut cursor = ReplayCursor::new(sample_events());
        let _ = cursor.seek(5);
        assert_eq!(cursor.seek(0), 0);
        assert!(cursor.store().is_empty());
        assert!(cursor.store().root_messages().is_empty());
    }

    #[test]
    fn seek_is_clamped_to_event_count() {
        let mut cursor = ReplayCursor::new(sample_events());
        assert_eq!(cursor.seek(1000), 5);
        assert!(cursor.at_final());
    }

    #[test]
    fn partial_seek_shows_intermediate_state() {
        let mut cursor = ReplayCursor::new(sample_events());
        let _ = cursor.seek(3);
        let store = cursor.store();
        assert_eq!(store.len(), 2);
        // helper spawned but has not spoken yet
        assert!(store.kani("helper").unwrap().chat_history.is_empty());
        assert_eq!(store.root_messages().len(), 1);
    }

    #[test]
    fn seek_forward_then_back_round_trips() {
        let mut cursor = ReplayCursor::new(sample_events());
        let _ = cursor.seek(3);
        let tree_at_3 = cursor.store().snapshot_tree();
        let _ = cursor.seek(5);
        let _ = cursor.seek(3);
        assert_eq!(cursor.store().snapshot_tree(), tree_at_3);
    }

    #[test]
    fn at_end_cursor_scrubs_backward_without_replay() {
        let events = sample_events();
        let mut store = SessionStore::new();
        for event in &events {
            store.apply(event);
        }
        let mut cursor = ReplayCursor::at_end(store, events);
        assert!(cursor.at_final());

        assert!(cursor.back().is_some());
        assert_eq!(cursor.store().root_messages().len(), 1);
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn empty_event_list_pins_cursor_at_zero() {
        let mut cursor = ReplayCursor::new(vec![]);
        assert!(cursor.is_empty());
        assert!(cursor.at_final());
        assert_eq!(cursor.seek(3), 0);
        assert!(cursor.forward().is_none());
    }

    #[test]
    fn stream_deltas_replay_through_cursor() {
        let mut events = sample_events();
        events.push(SessionEvent::StreamDelta {
            id: "helper".into(),
            delta: "more ".into(),
            role: ChatRole::Assistant,
        });
        events.push(SessionEvent::StreamDelta {
            id: "helper".into(),
            delta: "text".into(),
            role: ChatRole::Assistant,
        });
        let mut cursor = ReplayCursor::new(events);
        let _ = cursor.seek(7);
        assert_eq!(cursor.store().stream_buffer("helper"), Some("more text"));
    }
}
