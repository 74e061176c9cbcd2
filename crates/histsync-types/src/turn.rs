use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a record in a history source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    /// Shell command line (no conversational counterpart).
    Command,
}

impl TurnRole {
    pub fn label(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Command => "command",
        }
    }
}

/// Identity of a logical session: source id plus the source-local session id.
///
/// Derivation must be stable across polls and restarts — it never depends on
/// line counts or read order, so a replayed byte range maps to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(source_id: &str, local_id: &str) -> Self {
        SessionKey(format!("{}/{}", source_id, local_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic filesystem-safe stem for artifacts derived from this key.
    ///
    /// A sanitized readable prefix plus a hash prefix, so distinct keys that
    /// sanitize to the same text still get distinct file names.
    pub fn file_stem(&self) -> String {
        use sha2::{Digest, Sha256};

        let digest = Sha256::digest(self.0.as_bytes());
        let hash_prefix: String = digest
            .iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect();

        let readable: String = self
            .0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .take(48)
            .collect();

        format!("{}_{}", readable, hash_prefix)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One extracted record from a raw history source. Ephemeral: produced per
/// poll, consumed by the aggregator immediately.
#[derive(Debug, Clone)]
pub struct Turn {
    pub source_id: String,
    pub session_key: SessionKey,
    pub role: TurnRole,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}
