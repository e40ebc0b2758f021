//! Storage trait definitions

use anyhow::Result;
use log::debug;
use parking_lot::RwLock;

use crate::models::{Link, LinkId};

/// Which records a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFilter {
    /// Every record, tombstones included
    All,
    /// Records not marked deleted
    Live,
    /// Records with local changes pending upload
    Dirty,
}

impl LinkFilter {
    pub fn matches(self, link: &Link) -> bool {
        match self {
            LinkFilter::All => true,
            LinkFilter::Live => !link.deleted,
            LinkFilter::Dirty => link.dirty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOrder {
    /// Oldest local insert first
    IdAscending,
    /// Newest local insert first
    IdDescending,
}

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(LinkId),
    Updated(LinkId),
    /// The write would have duplicated another record's url or sha
    Ignored,
}

impl UpsertOutcome {
    pub fn id(self) -> Option<LinkId> {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => Some(id),
            UpsertOutcome::Ignored => None,
        }
    }

    pub fn is_ignored(self) -> bool {
        matches!(self, UpsertOutcome::Ignored)
    }
}

/// A committed change, delivered to subscribers after the write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Upserted { id: LinkId, sha: String },
    Deleted { sha: String },
    Cleared,
}

pub type ChangeListener = Box<dyn Fn(&StoreChange) + Send + Sync>;

/// Fan-out of store changes to subscribed listeners
///
/// Stores call `notify` after releasing their own locks, so a listener may
/// read from the store.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: RwLock<Vec<ChangeListener>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: ChangeListener) {
        self.listeners.write().push(listener);
    }

    pub fn notify(&self, change: &StoreChange) {
        let listeners = self.listeners.read();
        debug!("Store change {:?} -> {} listeners", change, listeners.len());
        for listener in listeners.iter() {
            listener(change);
        }
    }
}

/// Trait for link storage operations
///
/// Every mutation is atomic per record. Records are matched by `sha`;
/// `url` is unique per store and a write that would duplicate another
/// record's url is ignored, never overwritten.
pub trait LinkStore: Send + Sync {
    /// Get a record by local id
    fn get(&self, id: LinkId) -> Result<Option<Link>>;

    /// Get a record by sha
    fn get_by_sha(&self, sha: &str) -> Result<Option<Link>>;

    /// Get a record by url
    fn get_by_url(&self, url: &str) -> Result<Option<Link>>;

    /// List records matching a filter
    fn list(&self, filter: LinkFilter, order: LinkOrder) -> Result<Vec<Link>>;

    /// Count records matching a filter
    fn count(&self, filter: LinkFilter) -> Result<usize>;

    /// Insert a new record
    ///
    /// Never replaces anything: a taken sha or url yields `Ignored`.
    fn insert(&self, link: Link) -> Result<UpsertOutcome>;

    /// Insert a record, or replace the record with the same sha
    ///
    /// The link's `id` is ignored; a replaced record keeps its local id.
    /// A `None` timestamp keeps the stored one. Fails if the link is a clean
    /// tombstone.
    fn upsert(&self, link: Link) -> Result<UpsertOutcome>;

    /// Clear the dirty flag if the record still matches the uploaded snapshot
    ///
    /// Returns false when the record changed (or vanished) since `uploaded`
    /// was read, leaving it dirty for the next pass.
    fn clear_dirty(&self, uploaded: &Link, timestamp: Option<String>) -> Result<bool>;

    /// Hard-delete the record with this sha, returning whether one existed
    fn delete_by_sha(&self, sha: &str) -> Result<bool>;

    /// Register a listener for committed changes
    fn subscribe(&self, listener: ChangeListener);

    /// Clear all data (for testing)
    fn clear(&self) -> Result<()>;
}
