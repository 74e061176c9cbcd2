//! Per-session JSONL event files from nested session directories.
//!
//! Each file is one session; the local session id is the file stem, which the
//! registry passes down as the session hint. Only `response_item` events with
//! message or reasoning payloads carry conversational text.

use chrono::{DateTime, Utc};
use histsync_types::{SessionKey, Turn, TurnRole};
use serde_json::Value;

pub fn parse(
    source_id: &str,
    session_hint: Option<&str>,
    chunk: &str,
    now: DateTime<Utc>,
) -> Vec<Turn> {
    let Some(local_id) = session_hint else {
        tracing::debug!(source = source_id, "session file without a session hint");
        return Vec::new();
    };

    let mut turns = Vec::new();

    for line in chunk.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(source = source_id, %err, "skipping malformed session record");
                continue;
            }
        };

        if record.get("type").and_then(Value::as_str) != Some("response_item") {
            continue;
        }
        let Some(payload) = record.get("payload") else {
            continue;
        };

        let text = match payload.get("type").and_then(Value::as_str) {
            Some("message") => {
                let texts: Vec<&str> = payload
                    .get("content")
                    .and_then(Value::as_array)
                    .map(|content| {
                        content
                            .iter()
                            .filter(|c| {
                                c.get("type").and_then(Value::as_str) == Some("output_text")
                            })
                            .filter_map(|c| c.get("text").and_then(Value::as_str))
                            .filter(|t| !t.trim().is_empty())
                            .collect()
                    })
                    .unwrap_or_default();
                texts.join("\n")
            }
            Some("reasoning") => payload
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => continue,
        };

        if text.trim().is_empty() {
            continue;
        }

        turns.push(Turn {
            source_id: source_id.to_string(),
            session_key: SessionKey::new(source_id, local_id),
            role: TurnRole::Assistant,
            timestamp: now,
            text,
        });
    }

    turns
}
