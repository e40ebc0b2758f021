//! Download progress tracking for incremental sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp;

/// Tracks download progress for one account
///
/// Persisted separately from the records. Only one SyncCursor per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub account_id: String,
    /// Latest server timestamp covered by a fully applied download
    pub latest_timestamp: String,
    /// When the cursor last moved
    pub last_sync_at: DateTime<Utc>,
    /// Schema version for migrations
    pub sync_version: u32,
}

impl SyncCursor {
    pub fn new(account_id: impl Into<String>, latest_timestamp: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            latest_timestamp: latest_timestamp.into(),
            last_sync_at: Utc::now(),
            sync_version: 1,
        }
    }

    /// Advance to a newly reported timestamp
    ///
    /// The cursor keeps the later of the two values, so a server that
    /// reports an older or epoch timestamp never moves it backwards.
    pub fn advanced(mut self, reported: &str) -> Self {
        self.latest_timestamp = timestamp::later(&self.latest_timestamp, reported).to_string();
        self.last_sync_at = Utc::now();
        self
    }

    /// Whichever of this and the stored cursor is further along
    pub fn merged(self, stored: Option<&SyncCursor>) -> Self {
        match stored {
            Some(stored)
                if timestamp::compare(&stored.latest_timestamp, &self.latest_timestamp).is_gt() =>
            {
                stored.clone()
            }
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_moves_forward() {
        let cursor = SyncCursor::new("me@example.com", "2024-01-01 00:00:00");
        let cursor = cursor.advanced("2024-01-02 00:00:00.000001");
        assert_eq!(cursor.latest_timestamp, "2024-01-02 00:00:00.000001");
    }

    #[test]
    fn test_advance_never_moves_backwards() {
        let cursor = SyncCursor::new("me@example.com", "2024-01-02 00:00:00");
        let cursor = cursor.advanced(timestamp::EPOCH);
        assert_eq!(cursor.latest_timestamp, "2024-01-02 00:00:00");
    }

    #[test]
    fn test_merged_keeps_stored_when_later() {
        let stored = SyncCursor::new("me@example.com", "2024-01-02 00:00:00.000002");
        let stale = SyncCursor::new("me@example.com", "2024-01-02 00:00:00.000001");
        assert_eq!(stale.merged(Some(&stored)).latest_timestamp, stored.latest_timestamp);

        let fresh = SyncCursor::new("me@example.com", "2024-01-03 00:00:00");
        assert_eq!(fresh.clone().merged(Some(&stored)), fresh);
        assert_eq!(fresh.clone().merged(None), fresh);
    }

    #[test]
    fn test_serialization() {
        let cursor = SyncCursor::new("me@example.com", "2024-01-01 00:00:00");
        let json = serde_json::to_string(&cursor).unwrap();
        let parsed: SyncCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(cursor, parsed);
    }
}
