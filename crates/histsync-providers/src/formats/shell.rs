//! Shell history lines: zsh extended format (`: <epoch>:<dur>;cmd`) or plain
//! bash lines. Commands are grouped into one session per day; history
//! introspection commands are not worth recording.

use chrono::{DateTime, TimeZone, Utc};
use histsync_types::{SessionKey, Turn, TurnRole};
use once_cell::sync::Lazy;
use regex::Regex;

static ZSH_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:\s*(\d+):\d+;(.*)$").expect("invalid zsh history regex"));

const IGNORED_PREFIXES: &[&str] = &["history", "fc "];

pub fn parse(source_id: &str, chunk: &str, now: DateTime<Utc>) -> Vec<Turn> {
    let mut turns = Vec::new();

    for line in chunk.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (timestamp, command) = match ZSH_LINE_RE.captures(line) {
            Some(caps) => {
                let epoch: i64 = match caps[1].parse() {
                    Ok(epoch) => epoch,
                    Err(_) => continue,
                };
                let Some(ts) = Utc.timestamp_opt(epoch, 0).single() else {
                    tracing::debug!(source = source_id, epoch, "skipping out-of-range epoch");
                    continue;
                };
                (ts, caps[2].trim().to_string())
            }
            None => (now, line.to_string()),
        };

        if command.is_empty() {
            continue;
        }
        let lowered = command.to_lowercase();
        if IGNORED_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
            continue;
        }

        let day = timestamp.format("%Y%m%d").to_string();
        turns.push(Turn {
            source_id: source_id.to_string(),
            session_key: SessionKey::new(source_id, &day),
            role: TurnRole::Command,
            timestamp,
            text: command,
        });
    }

    turns
}
