//! Link records as held by a local replica

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::remote::api::RemoteLink;

/// Local row identifier assigned by the store
///
/// Only meaningful within one replica. Records are matched across replicas
/// by `sha`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub i64);

impl LinkId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for LinkId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A saved link
///
/// `dirty` marks a local change the remote has not acknowledged yet and
/// `deleted` marks a tombstone waiting for its deletion to be propagated.
/// A tombstone is always dirty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Store-assigned row id, `None` until the record has been stored
    pub id: Option<LinkId>,
    /// Cross-replica identity, unique and immutable
    pub sha: String,
    pub url: String,
    /// Server timestamp of the last accepted change, if known
    pub timestamp: Option<String>,
    pub deleted: bool,
    pub dirty: bool,
}

impl Link {
    /// Create a link added locally, pending upload
    pub fn new_local(sha: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            sha: sha.into(),
            url: url.into(),
            timestamp: None,
            deleted: false,
            dirty: true,
        }
    }

    /// Create a clean local copy of a record received from the remote
    pub fn from_remote(remote: &RemoteLink) -> Self {
        Self {
            id: None,
            sha: remote.sha.clone(),
            url: remote.url.clone(),
            timestamp: remote.timestamp.clone(),
            deleted: false,
            dirty: false,
        }
    }

    /// Turn this record into a tombstone pending propagation
    pub fn tombstone(mut self) -> Self {
        self.deleted = true;
        self.dirty = true;
        self
    }

    /// Mark the record as acknowledged by the remote
    pub fn mark_clean(mut self, timestamp: Option<String>) -> Self {
        self.dirty = false;
        if timestamp.is_some() {
            self.timestamp = timestamp;
        }
        self
    }

    pub fn is_tombstone(&self) -> bool {
        self.deleted
    }

    /// Reject states a store must never hold
    pub fn validate(&self) -> Result<()> {
        if self.sha.is_empty() {
            bail!("link sha must not be empty");
        }
        if self.url.is_empty() {
            bail!("link {} has an empty url", self.sha);
        }
        if self.deleted && !self.dirty {
            bail!(
                "link {} is a clean tombstone; deletions must stay dirty until propagated",
                self.sha
            );
        }
        Ok(())
    }
}
