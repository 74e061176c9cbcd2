//! Prompt-history JSONL: one JSON object per line, written by AI CLI tools.
//!
//! Tools disagree on field names, so the registry row supplies the candidate
//! session-id keys and text keys to probe in order.

use chrono::{DateTime, Utc};
use histsync_types::{SessionKey, Turn, TurnRole};
use serde_json::Value;

pub fn parse(
    source_id: &str,
    sid_keys: &[&str],
    text_keys: &[&str],
    chunk: &str,
    now: DateTime<Utc>,
) -> Vec<Turn> {
    let mut turns = Vec::new();

    for line in chunk.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(source = source_id, %err, "skipping malformed JSONL record");
                continue;
            }
        };

        let local_id = extract_session_id(&record, sid_keys)
            .unwrap_or_else(|| format!("{}_default", source_id));

        let Some(text) = extract_text(&record, text_keys) else {
            continue;
        };

        turns.push(Turn {
            source_id: source_id.to_string(),
            session_key: SessionKey::new(source_id, &local_id),
            role: TurnRole::User,
            timestamp: now,
            text,
        });
    }

    turns
}

fn extract_session_id(record: &Value, sid_keys: &[&str]) -> Option<String> {
    for key in sid_keys {
        match record.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn extract_text(record: &Value, text_keys: &[&str]) -> Option<String> {
    for key in text_keys {
        if let Some(Value::String(s)) = record.get(key) {
            let s = s.trim();
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }

    // Fallback for part-structured records: join the text parts, prefixed by
    // the raw input field when present.
    let parts = record.get("parts")?.as_array()?;
    let mut texts: Vec<&str> = Vec::new();
    for part in parts {
        if part.get("type").and_then(Value::as_str) == Some("text")
            && let Some(text) = part.get("text").and_then(Value::as_str)
            && !text.trim().is_empty()
        {
            texts.push(text.trim());
        }
    }
    if texts.is_empty() {
        return None;
    }

    let joined = texts.join("\n");
    match record.get("input").and_then(Value::as_str) {
        Some(input) if !input.trim().is_empty() => Some(format!("{}\n{}", input.trim(), joined)),
        _ => Some(joined),
    }
}
