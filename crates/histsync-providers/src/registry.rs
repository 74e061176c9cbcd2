//! Known source roots and per-poll discovery.
//!
//! Discovery is re-run every poll: each table row lists candidate paths in
//! preference order and the first one that exists wins, so a tool that moves
//! its history file between releases keeps working. Nested session
//! directories fan out into one source per recently-modified session file.

use crate::formats::SourceFormat;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

/// How a root maps onto sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// The root is itself the history file.
    File,
    /// The root is a directory tree of per-session files.
    SessionDir,
}

/// One row of the source table.
#[derive(Debug, Clone)]
pub struct RootSpec {
    pub name: String,
    pub format: SourceFormat,
    pub kind: RootKind,
    pub candidates: Vec<PathBuf>,
}

/// A concrete discovered source: one file to tail.
///
/// `id` is stable for a given name and path, and is what cursors and session
/// keys hang off. It must never depend on read order or line counts.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub format: SourceFormat,
    /// Source-local session id for per-session files (the file stem).
    pub session_hint: Option<String>,
}

/// Session files untouched for longer than this are not tailed; their
/// sessions are long over and skipping them bounds the cursor map.
const SESSION_FILE_RECENT_WINDOW: Duration = Duration::from_secs(3600);

const CLAUDE_SID_KEYS: &[&str] = &["sessionId", "session_id"];
const CLAUDE_TEXT_KEYS: &[&str] = &["display", "text", "input", "prompt"];
const CODEX_SID_KEYS: &[&str] = &["session_id", "sessionId", "id"];
const CODEX_TEXT_KEYS: &[&str] = &["text", "input", "prompt"];
const PROMPT_SID_KEYS: &[&str] = &["session_id", "sessionId", "id"];
const PROMPT_TEXT_KEYS: &[&str] = &["input", "prompt", "text"];

/// Map a configured format name onto a parser variant and root kind, for
/// user-defined sources that are not in the built-in table.
pub fn format_from_name(name: &str) -> Option<(SourceFormat, RootKind)> {
    match name {
        "timestamp_log" => Some((SourceFormat::TimestampLog, RootKind::File)),
        "shell_history" => Some((SourceFormat::ShellHistory, RootKind::File)),
        "prompt_jsonl" => Some((
            SourceFormat::PromptJsonl {
                sid_keys: PROMPT_SID_KEYS,
                text_keys: PROMPT_TEXT_KEYS,
            },
            RootKind::File,
        )),
        "session_jsonl" => Some((SourceFormat::SessionJsonl, RootKind::SessionDir)),
        _ => None,
    }
}

pub fn expand_home_path(path: &str) -> Option<PathBuf> {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return Some(home.join(stripped));
    }
    Some(PathBuf::from(path)).filter(|p| p.is_absolute())
}

fn candidates(paths: &[&str]) -> Vec<PathBuf> {
    paths.iter().filter_map(|p| expand_home_path(p)).collect()
}

/// The built-in source table.
pub fn default_roots() -> Vec<RootSpec> {
    vec![
        RootSpec {
            name: "claude_code".to_string(),
            format: SourceFormat::PromptJsonl {
                sid_keys: CLAUDE_SID_KEYS,
                text_keys: CLAUDE_TEXT_KEYS,
            },
            kind: RootKind::File,
            candidates: candidates(&["~/.claude/history.jsonl"]),
        },
        RootSpec {
            name: "codex_history".to_string(),
            format: SourceFormat::PromptJsonl {
                sid_keys: CODEX_SID_KEYS,
                text_keys: CODEX_TEXT_KEYS,
            },
            kind: RootKind::File,
            candidates: candidates(&["~/.codex/history.jsonl"]),
        },
        RootSpec {
            name: "codex_sessions".to_string(),
            format: SourceFormat::SessionJsonl,
            kind: RootKind::SessionDir,
            candidates: candidates(&["~/.codex/sessions"]),
        },
        RootSpec {
            name: "opencode".to_string(),
            format: SourceFormat::PromptJsonl {
                sid_keys: PROMPT_SID_KEYS,
                text_keys: PROMPT_TEXT_KEYS,
            },
            kind: RootKind::File,
            candidates: candidates(&[
                "~/.local/state/opencode/prompt-history.jsonl",
                "~/.config/opencode/prompt-history.jsonl",
                "~/.opencode/prompt-history.jsonl",
            ]),
        },
        RootSpec {
            name: "kilo".to_string(),
            format: SourceFormat::PromptJsonl {
                sid_keys: PROMPT_SID_KEYS,
                text_keys: PROMPT_TEXT_KEYS,
            },
            kind: RootKind::File,
            candidates: candidates(&[
                "~/.local/state/kilo/prompt-history.jsonl",
                "~/.config/kilo/prompt-history.jsonl",
            ]),
        },
        RootSpec {
            name: "shell_zsh".to_string(),
            format: SourceFormat::ShellHistory,
            kind: RootKind::File,
            candidates: candidates(&["~/.zsh_history"]),
        },
        RootSpec {
            name: "shell_bash".to_string(),
            format: SourceFormat::ShellHistory,
            kind: RootKind::File,
            candidates: candidates(&["~/.bash_history"]),
        },
    ]
}

/// Enumerate the currently-live sources for the given roots.
///
/// Lazy and restartable: this walks the filesystem fresh on every call and
/// never mutates anything. Unreadable entries are skipped.
pub fn discover(roots: &[RootSpec]) -> Vec<Source> {
    let mut sources = Vec::new();

    for root in roots {
        match root.kind {
            RootKind::File => {
                if let Some(path) = root.candidates.iter().find(|p| p.is_file()) {
                    sources.push(make_source(root, path, None));
                }
            }
            RootKind::SessionDir => {
                for dir in root.candidates.iter().filter(|p| p.is_dir()) {
                    scan_session_dir(root, dir, &mut sources);
                }
            }
        }
    }

    sources
}

fn scan_session_dir(root: &RootSpec, dir: &Path, sources: &mut Vec<Source>) {
    let now = SystemTime::now();

    for entry in WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|e| e != "jsonl") {
            continue;
        }

        let recent = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|mtime| now.duration_since(mtime).ok())
            .is_some_and(|age| age < SESSION_FILE_RECENT_WINDOW);
        if !recent {
            continue;
        }

        let hint = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());
        sources.push(make_source(root, path, hint));
    }
}

fn make_source(root: &RootSpec, path: &Path, session_hint: Option<String>) -> Source {
    Source {
        id: source_id(&root.name, path),
        name: root.name.clone(),
        path: path.to_path_buf(),
        format: root.format,
        session_hint,
    }
}

/// Stable source identity: table name plus a short hash of the path, so two
/// files under the same root get distinct cursors and session keys.
fn source_id(name: &str, path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let short: String = digest.iter().take(5).map(|b| format!("{:02x}", b)).collect();
    format!("{}:{}", name, short)
}
