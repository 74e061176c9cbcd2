use serde::{Deserialize, Serialize};

/// Saved read position and rotation-detection fingerprint for one source.
///
/// The fingerprint hashes the first `fingerprint_len` bytes of the file; a
/// changed fingerprint at the same path means the file was rotated and is a
/// new file as far as the cursor is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Byte offset of the next unread byte.
    pub offset: u64,
    /// Hex SHA-256 of the file's leading bytes.
    pub fingerprint: String,
    /// How many leading bytes the fingerprint covers.
    pub fingerprint_len: u64,
    /// File size observed at the last successful read.
    pub last_seen_size: u64,
}

impl Cursor {
    pub fn start(fingerprint: String, fingerprint_len: u64, size: u64) -> Self {
        Cursor {
            offset: 0,
            fingerprint,
            fingerprint_len,
            last_seen_size: size,
        }
    }
}
