//! Applying a single remote change to the local store

use anyhow::Result;
use log::{debug, warn};

use crate::models::Link;
use crate::remote::api::RemoteLink;
use crate::storage::{LinkStore, UpsertOutcome};

/// What applying one remote record did locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The record was inserted or replaced, clean
    Stored,
    /// A remote tombstone removed the local record
    Removed,
    /// A remote tombstone for a record this replica never had
    Absent,
    /// The record's url belongs to another local record
    Ignored,
}

/// Apply one remote record by sha
///
/// A tombstone hard-deletes any local record with that sha. Anything else
/// replaces the local record, dirty or not, and leaves it clean.
pub fn apply_remote_link(store: &dyn LinkStore, remote: &RemoteLink) -> Result<ApplyOutcome> {
    if remote.deleted {
        let removed = store.delete_by_sha(&remote.sha)?;
        debug!("Remote tombstone {} (local copy removed: {})", remote.sha, removed);
        return Ok(if removed {
            ApplyOutcome::Removed
        } else {
            ApplyOutcome::Absent
        });
    }

    match store.upsert(Link::from_remote(remote))? {
        UpsertOutcome::Inserted(_) | UpsertOutcome::Updated(_) => {
            debug!("Stored remote link {}", remote.sha);
            Ok(ApplyOutcome::Stored)
        }
        UpsertOutcome::Ignored => {
            warn!(
                "Remote link {} ignored: url {} already held by another record",
                remote.sha, remote.url
            );
            Ok(ApplyOutcome::Ignored)
        }
    }
}
