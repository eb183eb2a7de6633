use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::turn::HistoryEntry;

/// Session lifecycle state (spec.md §4.3).
///
/// Transitions are monotonic within a turn: `PROCESSING` never goes back to
/// `LISTENING` before passing through `IDLE`, and `SPEAKING` never goes back
/// to `PROCESSING`. `CLOSED` is reachable from any state and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initialized,
    Listening,
    Processing,
    Speaking,
    Idle,
    Closed,
}

impl SessionState {
    /// Whether `self -> to` is a legal edge in the state machine.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        if to == Closed {
            return true;
        }
        matches!(
            (self, to),
            (Initialized, Listening)
                | (Listening, Processing)
                | (Processing, Listening)
                | (Processing, Speaking)
                // an empty final transcript ends the turn without ever
                // reaching SPEAKING (spec.md §4.3 step 1 / §8 scenario 2)
                | (Processing, Idle)
                | (Speaking, Idle)
                | (Idle, Listening)
        )
    }
}

/// A live voice-conversation session (spec.md §3).
///
/// Owned by the session store; a turn-pipeline borrows a session for the
/// duration of one turn and is the only writer of its state and history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub language: String,
    pub state: SessionState,
    /// Append-only, but truncated to the most recent `2 * max_history_turns`
    /// entries on every push.
    pub history: Vec<HistoryEntry>,
    pub max_history_turns: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(language: impl Into<String>, max_history_turns: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            language: language.into(),
            state: SessionState::Initialized,
            history: Vec::new(),
            max_history_turns,
            created_at: now,
            last_activity: now,
        }
    }

    /// Move to `to`, panicking in debug builds on an illegal edge -- state
    /// is advanced only by the owning turn-pipeline, never by external
    /// callers, so an illegal transition is a pipeline bug, not recoverable
    /// input.
    pub fn transition(&mut self, to: SessionState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "illegal session transition {:?} -> {:?}",
            self.state,
            to
        );
        self.state = to;
        self.touch();
    }

    /// Bump `last_activity` to now. Monotonic: `Utc::now()` never regresses
    /// within a process, so no max-with-previous is needed.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Append a history entry, then truncate to the most recent `2N`
    /// messages (spec.md §4.3 "Numeric semantics").
    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
        let bound = self.max_history_turns * 2;
        if self.history.len() > bound {
            let drop = self.history.len() - bound;
            self.history.drain(0..drop);
        }
        self.touch();
    }

    /// Force the session back to `IDLE` regardless of current state.
    ///
    /// Used only on the turn-pipeline error path (spec.md §7): a provider
    /// failure must return the session to IDLE no matter which state the
    /// turn was in when it failed, which the normal transition table does
    /// not fully cover (e.g. a failure while still `LISTENING`).
    pub fn recover_to_idle(&mut self) {
        self.state = SessionState::Idle;
        self.touch();
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.touch();
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::Role;

    #[test]
    fn legal_transitions_follow_spec_table() {
        use SessionState::*;
        assert!(Initialized.can_transition_to(Listening));
        assert!(Listening.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Listening));
        assert!(Processing.can_transition_to(Speaking));
        assert!(Speaking.can_transition_to(Idle));
        assert!(Processing.can_transition_to(Idle));
        assert!(Idle.can_transition_to(Listening));
        assert!(Listening.can_transition_to(Closed));
    }

    #[test]
    fn recover_to_idle_bypasses_the_transition_table() {
        let mut session = Session::new("en-US", 10);
        session.transition(SessionState::Listening);
        session.recover_to_idle();
        assert_eq!(session.state, SessionState::Idle);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        use SessionState::*;
        assert!(!Speaking.can_transition_to(Processing));
        assert!(!Listening.can_transition_to(Idle));
        assert!(!Initialized.can_transition_to(Speaking));
    }

    #[test]
    fn history_bound_enforced_at_2n() {
        let mut session = Session::new("en-US", 2);
        for i in 0..10 {
            session.push_history(HistoryEntry {
                role: Role::User,
                text: format!("msg {i}"),
            });
        }
        assert_eq!(session.history.len(), 4);
        assert_eq!(session.history.first().unwrap().text, "msg 6");
        assert_eq!(session.history.last().unwrap().text, "msg 9");
    }

    #[test]
    #[should_panic]
    fn illegal_transition_panics_in_debug() {
        let mut session = Session::new("en-US", 10);
        session.transition(SessionState::Speaking);
    }
}
