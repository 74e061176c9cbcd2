//! Timestamp-delimited records: `[HH:MM:SS] role: text`.

use chrono::{DateTime, NaiveTime, Utc};
use histsync_types::{SessionKey, Turn, TurnRole};
use once_cell::sync::Lazy;
use regex::Regex;

static RECORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(\d{2}:\d{2}:\d{2})\]\s+(\w+):\s*(.*)$").expect("invalid record regex")
});

/// The format carries only a time of day, so records are stamped onto the
/// date of `now` and grouped into one session per day. A time of day ahead
/// of `now` can only be a record written before midnight and polled after,
/// so it is stamped onto the previous day instead.
pub fn parse(source_id: &str, chunk: &str, now: DateTime<Utc>) -> Vec<Turn> {
    let mut turns = Vec::new();

    for line in chunk.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(caps) = RECORD_RE.captures(line) else {
            tracing::debug!(source = source_id, "skipping malformed timestamp record");
            continue;
        };

        let Ok(time) = NaiveTime::parse_from_str(&caps[1], "%H:%M:%S") else {
            tracing::debug!(source = source_id, "skipping record with invalid time");
            continue;
        };

        let role = match &caps[2] {
            "user" => TurnRole::User,
            "assistant" => TurnRole::Assistant,
            other => {
                tracing::debug!(source = source_id, role = other, "skipping unknown role");
                continue;
            }
        };

        let text = caps[3].trim();
        if text.is_empty() {
            continue;
        }

        let mut timestamp = now.date_naive().and_time(time).and_utc();
        if timestamp > now {
            timestamp -= chrono::Duration::days(1);
        }
        let day = timestamp.format("%Y%m%d").to_string();

        turns.push(Turn {
            source_id: source_id.to_string(),
            session_key: SessionKey::new(source_id, &day),
            role,
            timestamp,
            text: text.to_string(),
        });
    }

    turns
}
