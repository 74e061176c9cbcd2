//! Durable cursor store: last-read position plus rotation fingerprint per
//! source.
//!
//! The store is persisted with an atomic replace immediately after every
//! successful read, so a crash can mis-replay at most the single byte range
//! between a read and its persist. Session keys are content-derived, so the
//! replay lands in the same sessions; consecutive-duplicate suppression
//! downstream absorbs the single-record case.
//!
//! Reads stop at the last complete line: a partial trailing record stays
//! ahead of the cursor and is picked up once a later poll completes it. That
//! one rule is the whole cross-poll buffering story for every format.

use crate::error::{Error, Result};
use crate::storage;
use histsync_types::Cursor;
use histsync_providers::Source;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

/// How many leading bytes the identity fingerprint covers at most.
const FINGERPRINT_SPAN: u64 = 1024;

pub struct CursorStore {
    path: PathBuf,
    cursors: HashMap<String, Cursor>,
}

impl CursorStore {
    /// Load the store from disk; a missing file is an empty store.
    pub fn load(path: PathBuf) -> Result<Self> {
        let cursors = storage::read_json(&path)?.unwrap_or_default();
        Ok(CursorStore { path, cursors })
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn cursor(&self, source_id: &str) -> Option<&Cursor> {
        self.cursors.get(source_id)
    }

    /// Return the complete lines appended to `source` since its cursor, or
    /// `None` when nothing new is readable yet.
    ///
    /// Rotation (leading-bytes fingerprint changed) and truncation (file
    /// shrank) both reset the cursor to 0 before reading. The cursor is
    /// persisted before this returns; a persist failure is a storage error
    /// and the in-memory cursor is rolled back so the range is re-read.
    pub fn read_new(&mut self, source: &Source) -> Result<Option<String>> {
        let mut file = File::open(&source.path)?;
        let size = file.metadata()?.len();

        let mut offset = match self.cursors.get(source.id.as_str()) {
            Some(cursor) => {
                if size < cursor.fingerprint_len || size < cursor.offset {
                    // Shrank below what we already read or fingerprinted:
                    // truncated in place, or rotated to a smaller file.
                    tracing::warn!(
                        source = %source.id,
                        path = %source.path.display(),
                        "source shrank, resetting cursor (possible data loss)"
                    );
                    0
                } else if fingerprint(&mut file, cursor.fingerprint_len)? != cursor.fingerprint {
                    tracing::info!(
                        source = %source.id,
                        path = %source.path.display(),
                        "source rotated, treating as new file"
                    );
                    0
                } else {
                    cursor.offset
                }
            }
            None => 0,
        };

        if size <= offset {
            return Ok(None);
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity((size - offset) as usize);
        file.read_to_end(&mut buf)?;

        // Hold back the partial trailing record.
        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(None);
        };
        buf.truncate(last_newline + 1);
        offset += buf.len() as u64;

        let span = size.min(FINGERPRINT_SPAN);
        let new_fingerprint = fingerprint(&mut file, span)?;

        let previous = self.cursors.insert(
            source.id.clone(),
            Cursor {
                offset,
                fingerprint: new_fingerprint,
                fingerprint_len: span,
                last_seen_size: size,
            },
        );

        if let Err(err) = self.persist() {
            // Roll back so the range is replayed rather than skipped.
            match previous {
                Some(cursor) => {
                    self.cursors.insert(source.id.clone(), cursor);
                }
                None => {
                    self.cursors.remove(source.id.as_str());
                }
            }
            return Err(err);
        }

        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    pub fn persist(&self) -> Result<()> {
        storage::atomic_write_json(&self.path, &self.cursors)
    }
}

fn fingerprint(file: &mut File, span: u64) -> Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = vec![0u8; span as usize];
    file.read_exact(&mut buf)
        .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("fingerprint read: {}", e))))?;
    let digest = Sha256::digest(&buf);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}
