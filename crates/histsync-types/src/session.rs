use crate::turn::{SessionKey, Turn};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a tracked session.
///
/// `Exported` and `Discarded` are terminal: no transition ever leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Still receiving turns, idle boundary not yet reached.
    Active,
    /// Idle boundary reached with enough turns; waiting for the exporter.
    Ready,
    /// Digest handed to the exporter (delivered or durably queued).
    Exported,
    /// Idle boundary reached with too few turns to be worth exporting.
    Discarded,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Exported | SessionState::Discarded)
    }
}

/// A group of turns from one source, bounded by an inactivity gap.
///
/// Invariants: `turns` is ordered by timestamp and `last_activity` equals the
/// maximum turn timestamp. Purely in-memory — rebuilt from source re-reads
/// after a restart.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub source_id: String,
    pub turns: Vec<Turn>,
    pub first_seen: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub state: SessionState,
}

impl Session {
    pub fn new(first_turn: Turn) -> Self {
        let timestamp = first_turn.timestamp;
        Session {
            key: first_turn.session_key.clone(),
            source_id: first_turn.source_id.clone(),
            turns: vec![first_turn],
            first_seen: timestamp,
            last_activity: timestamp,
            state: SessionState::Active,
        }
    }

    /// Append a turn, keeping the timestamp ordering invariant.
    ///
    /// Sources are mostly append-only so the common case is a push; an
    /// out-of-order timestamp is inserted at its sorted position.
    pub fn push(&mut self, turn: Turn) {
        if turn.timestamp > self.last_activity {
            self.last_activity = turn.timestamp;
        }
        if turn.timestamp < self.first_seen {
            self.first_seen = turn.timestamp;
        }

        match self.turns.last() {
            Some(last) if last.timestamp <= turn.timestamp => self.turns.push(turn),
            None => self.turns.push(turn),
            Some(_) => {
                let idx = self
                    .turns
                    .partition_point(|t| t.timestamp <= turn.timestamp);
                self.turns.insert(idx, turn);
            }
        }
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::TurnRole;
    use chrono::TimeZone;

    fn turn_at(secs: i64, text: &str) -> Turn {
        Turn {
            source_id: "test".to_string(),
            session_key: SessionKey::new("test", "s1"),
            role: TurnRole::User,
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            text: text.to_string(),
        }
    }

    #[test]
    fn push_keeps_turns_ordered_by_timestamp() {
        let mut session = Session::new(turn_at(100, "b"));
        session.push(turn_at(50, "a"));
        session.push(turn_at(200, "c"));

        let texts: Vec<&str> = session.turns.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(session.first_seen, Utc.timestamp_opt(50, 0).unwrap());
        assert_eq!(session.last_activity, Utc.timestamp_opt(200, 0).unwrap());
    }

    #[test]
    fn last_activity_is_max_turn_timestamp() {
        let mut session = Session::new(turn_at(100, "a"));
        session.push(turn_at(90, "late arrival"));
        assert_eq!(session.last_activity, Utc.timestamp_opt(100, 0).unwrap());
    }

    #[test]
    fn terminal_states() {
        assert!(!SessionState::Active.is_terminal());
        assert!(!SessionState::Ready.is_terminal());
        assert!(SessionState::Exported.is_terminal());
        assert!(SessionState::Discarded.is_terminal());
    }
}
