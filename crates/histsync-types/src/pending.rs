use crate::turn::SessionKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A rendered digest whose remote delivery has not succeeded yet.
///
/// Created only on delivery failure, persisted until delivery succeeds, and
/// never dropped on further failures. `attempt_count` only ever increases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingExport {
    pub session_key: SessionKey,
    pub source_id: String,
    pub digest: String,
    pub first_seen: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub turn_count: usize,
    pub created_at: DateTime<Utc>,
    pub attempt_count: u32,
}
