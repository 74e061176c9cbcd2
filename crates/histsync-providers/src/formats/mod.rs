//! Format parsers: one variant per known source shape.
//!
//! The set of shapes is closed by design — adding a source kind means adding
//! one variant here and one row to the registry table. Every parser skips
//! malformed records (logged at debug) and never aborts the rest of a read.
//!
//! Parsers receive only complete lines: the cursor store never hands over a
//! partial trailing record, so none of them need cross-poll buffering.

mod prompt_jsonl;
mod session_jsonl;
mod shell;
mod timestamp;

use chrono::{DateTime, Utc};
use histsync_types::Turn;

/// Shape of a raw history source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `[HH:MM:SS] role: text` delimited records.
    TimestampLog,
    /// One JSON object per line; the session-id and text keys vary per tool.
    PromptJsonl {
        sid_keys: &'static [&'static str],
        text_keys: &'static [&'static str],
    },
    /// Per-session JSONL event files from nested session directories.
    /// The local session id is the file stem, carried as the source hint.
    SessionJsonl,
    /// Shell history lines (zsh extended or plain bash).
    ShellHistory,
}

impl SourceFormat {
    /// Stable name, matching what `format_from_name` accepts.
    pub fn name(&self) -> &'static str {
        match self {
            SourceFormat::TimestampLog => "timestamp_log",
            SourceFormat::PromptJsonl { .. } => "prompt_jsonl",
            SourceFormat::SessionJsonl => "session_jsonl",
            SourceFormat::ShellHistory => "shell_history",
        }
    }

    /// Extract ordered turns from a chunk of complete lines.
    ///
    /// `session_hint` carries the source-local session id for formats where
    /// it lives outside the record (the session file name). `now` stamps
    /// records whose format carries no timestamp of its own.
    pub fn parse(
        &self,
        source_id: &str,
        session_hint: Option<&str>,
        chunk: &str,
        now: DateTime<Utc>,
    ) -> Vec<Turn> {
        match self {
            SourceFormat::TimestampLog => timestamp::parse(source_id, chunk, now),
            SourceFormat::PromptJsonl {
                sid_keys,
                text_keys,
            } => prompt_jsonl::parse(source_id, sid_keys, text_keys, chunk, now),
            SourceFormat::SessionJsonl => {
                session_jsonl::parse(source_id, session_hint, chunk, now)
            }
            SourceFormat::ShellHistory => shell::parse(source_id, chunk, now),
        }
    }
}
