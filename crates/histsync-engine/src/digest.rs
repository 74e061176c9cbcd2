//! Canonical markdown digest for a completed session.
//!
//! The digest is the unit of export: field order is stable so the remote
//! endpoint can upsert idempotently by session key and diff cleanly.

use histsync_types::Session;

/// Render a session into its canonical digest.
///
/// Header carries the session identity, source, and time range; the body is
/// the ordered transcript. Turn text is assumed to be scrubbed already — the
/// redaction pass runs before turns ever reach the aggregator.
pub fn render_digest(session: &Session) -> String {
    let mut out = String::new();

    out.push_str(&format!("# Session {}\n\n", session.key));
    out.push_str(&format!("Source: {}\n", session.source_id));
    out.push_str(&format!(
        "Range: {} .. {}\n",
        session.first_seen.to_rfc3339(),
        session.last_activity.to_rfc3339()
    ));
    out.push_str(&format!("Turns: {}\n\n", session.turn_count()));
    out.push_str("## Transcript\n");

    for turn in &session.turns {
        out.push_str(&format!(
            "\n### {} @ {}\n\n{}\n",
            turn.role.label(),
            turn.timestamp.to_rfc3339(),
            turn.text
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use histsync_types::{SessionKey, Turn, TurnRole};

    fn sample_session() -> Session {
        let key = SessionKey::new("term_log", "20260825");
        let mut session = Session::new(Turn {
            source_id: "term_log".to_string(),
            session_key: key.clone(),
            role: TurnRole::User,
            timestamp: Utc.with_ymd_and_hms(2026, 8, 25, 10, 0, 1).unwrap(),
            text: "hello".to_string(),
        });
        session.push(Turn {
            source_id: "term_log".to_string(),
            session_key: key,
            role: TurnRole::Assistant,
            timestamp: Utc.with_ymd_and_hms(2026, 8, 25, 10, 0, 2).unwrap(),
            text: "hi".to_string(),
        });
        session
    }

    #[test]
    fn digest_has_stable_header_then_ordered_transcript() {
        let digest = render_digest(&sample_session());

        let header_pos = digest.find("# Session term_log/20260825").unwrap();
        let source_pos = digest.find("Source: term_log").unwrap();
        let range_pos = digest.find("Range: 2026-08-25T10:00:01+00:00 .. 2026-08-25T10:00:02+00:00").unwrap();
        let turns_pos = digest.find("Turns: 2").unwrap();
        let user_pos = digest.find("### user @").unwrap();
        let assistant_pos = digest.find("### assistant @").unwrap();

        assert!(header_pos < source_pos);
        assert!(source_pos < range_pos);
        assert!(range_pos < turns_pos);
        assert!(turns_pos < user_pos);
        assert!(user_pos < assistant_pos);
        assert!(digest.contains("hello"));
        assert!(digest.contains("hi"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let session = sample_session();
        assert_eq!(render_digest(&session), render_digest(&session));
    }
}
