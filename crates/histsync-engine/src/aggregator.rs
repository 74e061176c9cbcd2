//! Session aggregation and the idle-timeout state machine.
//!
//! The aggregator exclusively owns the active session set. It is driven by
//! the single-threaded scheduler, so `ingest` and `sweep` never race on the
//! same key. Sessions here are derived state: after a restart they are
//! rebuilt from source re-reads. A crash can replay at most one byte range;
//! consecutive-duplicate suppression absorbs the common single-record case of
//! that replay.

use chrono::{DateTime, Duration, Utc};
use histsync_types::{Session, SessionKey, SessionState, Turn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Hard cap on turns held per session; when hit, the oldest turns are shed
/// and only the most recent `TURNS_KEPT_AFTER_TRIM` are kept.
const MAX_TURNS_PER_SESSION: usize = 500;
const TURNS_KEPT_AFTER_TRIM: usize = 200;

/// What one sweep did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub became_ready: usize,
    pub discarded: usize,
}

#[derive(Default)]
pub struct SessionAggregator {
    sessions: HashMap<SessionKey, Session>,
    /// Hash of the last ingested turn text per session, for consecutive
    /// duplicate suppression.
    last_text_hash: HashMap<SessionKey, [u8; 32]>,
    max_turns: usize,
    kept_after_trim: usize,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::with_turn_cap(MAX_TURNS_PER_SESSION, TURNS_KEPT_AFTER_TRIM)
    }

    pub fn with_turn_cap(max_turns: usize, kept_after_trim: usize) -> Self {
        SessionAggregator {
            sessions: HashMap::new(),
            last_text_hash: HashMap::new(),
            max_turns,
            kept_after_trim,
        }
    }

    /// Append a turn to its session, creating the session on first sight.
    ///
    /// A turn whose text matches the previous turn of the same session is
    /// dropped; this absorbs single-record replays after a crash. A replayed
    /// range of several distinct records can still double-ingest.
    pub fn ingest(&mut self, turn: Turn) {
        if turn.text.trim().is_empty() {
            return;
        }

        let hash: [u8; 32] = Sha256::digest(turn.text.as_bytes()).into();
        if self.last_text_hash.get(&turn.session_key) == Some(&hash) {
            tracing::debug!(session = %turn.session_key, "dropping duplicate turn");
            return;
        }

        let key = turn.session_key.clone();
        match self.sessions.get_mut(&key) {
            Some(session) if !session.state.is_terminal() => session.push(turn),
            Some(_) => {
                // Terminal sessions never revert; late turns for the same key
                // are dropped until the session is pruned.
                tracing::debug!(session = %key, "ignoring turn for terminal session");
                return;
            }
            None => {
                self.sessions.insert(key.clone(), Session::new(turn));
            }
        }
        self.last_text_hash.insert(key.clone(), hash);

        if let Some(session) = self.sessions.get_mut(&key)
            && session.turns.len() > self.max_turns
        {
            let excess = session.turns.len() - self.kept_after_trim;
            session.turns.drain(..excess);
            tracing::debug!(session = %key, dropped = excess, "trimmed over-long session");
        }
    }

    /// Run the idle-timeout state machine over every active session.
    ///
    /// Active sessions past the idle boundary become Ready when they have
    /// enough turns, Discarded otherwise. Discarded sessions are pruned here;
    /// Ready sessions wait for [`take_ready`](Self::take_ready).
    pub fn sweep(&mut self, now: DateTime<Utc>, idle_timeout: Duration, min_turns: usize) -> SweepReport {
        let mut report = SweepReport::default();

        for session in self.sessions.values_mut() {
            if session.state != SessionState::Active || session.idle_for(now) < idle_timeout {
                continue;
            }
            if session.turn_count() >= min_turns {
                session.state = SessionState::Ready;
                report.became_ready += 1;
            } else {
                session.state = SessionState::Discarded;
                report.discarded += 1;
                tracing::debug!(session = %session.key, turns = session.turn_count(), "discarding short session");
            }
        }

        self.prune(SessionState::Discarded);
        report
    }

    /// Hand every Ready session to the caller, removing it from the active
    /// set. Ownership moves to the exporter/retry queue from here on.
    pub fn take_ready(&mut self) -> Vec<Session> {
        let ready_keys: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.state == SessionState::Ready)
            .map(|(k, _)| k.clone())
            .collect();

        let mut ready = Vec::with_capacity(ready_keys.len());
        for key in ready_keys {
            if let Some(session) = self.sessions.remove(&key) {
                self.last_text_hash.remove(&key);
                ready.push(session);
            }
        }
        ready.sort_by(|a, b| a.first_seen.cmp(&b.first_seen));
        ready
    }

    /// Put a session back after a failed export-side step, preserving its
    /// state so the next tick picks it up again.
    pub fn restore(&mut self, session: Session) {
        self.sessions.insert(session.key.clone(), session);
    }

    /// Earliest instant at which any active session crosses the idle
    /// boundary. Drives the adaptive poll interval.
    pub fn next_idle_deadline(&self, idle_timeout: Duration) -> Option<DateTime<Utc>> {
        self.sessions
            .values()
            .filter(|s| s.state == SessionState::Active)
            .map(|s| s.last_activity + idle_timeout)
            .min()
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.state == SessionState::Active)
            .count()
    }

    pub fn session(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    fn prune(&mut self, state: SessionState) {
        let doomed: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.state == state)
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            self.sessions.remove(&key);
            self.last_text_hash.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use histsync_types::TurnRole;

    fn key() -> SessionKey {
        SessionKey::new("test", "s1")
    }

    fn turn_at(secs: i64, text: &str) -> Turn {
        Turn {
            source_id: "test".to_string(),
            session_key: key(),
            role: TurnRole::User,
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            text: text.to_string(),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn ingest_groups_by_session_key_and_tracks_activity() {
        let mut agg = SessionAggregator::new();
        agg.ingest(turn_at(0, "hello"));
        agg.ingest(turn_at(90, "again"));

        let session = agg.session(&key()).unwrap();
        assert_eq!(session.turn_count(), 2);
        assert_eq!(session.last_activity, at(90));
        assert_eq!(session.state, SessionState::Active);
    }

    #[test]
    fn idle_boundary_respects_last_activity_not_first_seen() {
        // Turns at t=0s and t=90s with a 300s timeout: ready at t>=390s.
        let mut agg = SessionAggregator::new();
        agg.ingest(turn_at(0, "hello"));
        agg.ingest(turn_at(90, "again"));

        let report = agg.sweep(at(389), Duration::seconds(300), 1);
        assert_eq!(report.became_ready, 0);
        assert_eq!(agg.session(&key()).unwrap().state, SessionState::Active);

        let report = agg.sweep(at(390), Duration::seconds(300), 1);
        assert_eq!(report.became_ready, 1);
        assert_eq!(agg.session(&key()).unwrap().state, SessionState::Ready);
    }

    #[test]
    fn short_sessions_are_discarded_not_exported() {
        let mut agg = SessionAggregator::new();
        agg.ingest(turn_at(0, "only one"));

        let report = agg.sweep(at(60), Duration::seconds(60), 2);
        assert_eq!(report.became_ready, 0);
        assert_eq!(report.discarded, 1);
        assert!(agg.session(&key()).is_none());
        assert!(agg.take_ready().is_empty());
    }

    #[test]
    fn take_ready_removes_sessions_and_orders_by_first_seen() {
        let mut agg = SessionAggregator::new();
        let mut newer = turn_at(50, "newer");
        newer.session_key = SessionKey::new("test", "s2");
        agg.ingest(turn_at(10, "older"));
        agg.ingest(newer);

        agg.sweep(at(1000), Duration::seconds(300), 1);
        let ready = agg.take_ready();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].turns[0].text, "older");
        assert_eq!(agg.active_count(), 0);
        assert!(agg.take_ready().is_empty());
    }

    #[test]
    fn consecutive_duplicate_turns_are_dropped() {
        let mut agg = SessionAggregator::new();
        agg.ingest(turn_at(0, "same"));
        agg.ingest(turn_at(1, "same"));
        agg.ingest(turn_at(2, "different"));
        agg.ingest(turn_at(3, "same"));

        assert_eq!(agg.session(&key()).unwrap().turn_count(), 3);
    }

    #[test]
    fn turn_cap_sheds_oldest_turns() {
        let mut agg = SessionAggregator::with_turn_cap(10, 4);
        for i in 0..12 {
            agg.ingest(turn_at(i, &format!("turn {}", i)));
        }
        let session = agg.session(&key()).unwrap();
        assert!(session.turn_count() <= 10);
        assert_eq!(session.turns.last().unwrap().text, "turn 11");
    }

    #[test]
    fn next_idle_deadline_tracks_the_most_idle_active_session() {
        let mut agg = SessionAggregator::new();
        agg.ingest(turn_at(100, "a"));
        let mut other = turn_at(40, "b");
        other.session_key = SessionKey::new("test", "s2");
        agg.ingest(other);

        let deadline = agg.next_idle_deadline(Duration::seconds(300)).unwrap();
        assert_eq!(deadline, at(340));
        assert!(agg.next_idle_deadline(Duration::seconds(300)).is_some());
    }

    #[test]
    fn empty_turns_are_ignored() {
        let mut agg = SessionAggregator::new();
        agg.ingest(turn_at(0, "   "));
        assert!(agg.session(&key()).is_none());
    }
}
