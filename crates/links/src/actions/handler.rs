//! Local add and delete
//!
//! Changes are written to the local store first, marked dirty, and then an
//! upload-only pass is requested. The remote learns about them on that pass,
//! or on a later one if it fails.

use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};

use crate::ids::generate_id;
use crate::models::{Link, LinkId};
use crate::storage::{LinkFilter, LinkOrder, LinkStore, UpsertOutcome};
use crate::sync::{SyncRequest, SyncScheduler};

/// Result of adding a link locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(Link),
    /// Another record already holds this url
    DuplicateUrl { existing_sha: String },
    /// The generated sha is already taken; nothing was stored
    IdCollision { sha: String },
}

/// Handler for local link actions
pub struct LinkActions {
    store: Arc<dyn LinkStore>,
    scheduler: Option<Arc<dyn SyncScheduler>>,
    account: String,
}

impl LinkActions {
    pub fn new(store: Arc<dyn LinkStore>, account: impl Into<String>) -> Self {
        Self {
            store,
            scheduler: None,
            account: account.into(),
        }
    }

    /// Request an upload-only pass after every change
    pub fn with_scheduler(mut self, scheduler: Arc<dyn SyncScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Add a link under a freshly generated sha
    pub fn add_link(&self, url: &str) -> Result<AddOutcome> {
        self.add_link_with_sha(&generate_id(), url)
    }

    /// Add a link under a given sha
    pub fn add_link_with_sha(&self, sha: &str, url: &str) -> Result<AddOutcome> {
        let url = url.trim();
        match self.store.insert(Link::new_local(sha, url))? {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => {
                info!("Added link {} ({})", sha, url);
                let link = self.stored(id, sha, url)?;
                self.request_upload();
                Ok(AddOutcome::Added(link))
            }
            UpsertOutcome::Ignored => {
                if let Some(existing) = self.store.get_by_url(url)? {
                    info!("Link {} already saved as {}", url, existing.sha);
                    return Ok(AddOutcome::DuplicateUrl {
                        existing_sha: existing.sha,
                    });
                }
                warn!("Generated id {} collides with an existing link", sha);
                Ok(AddOutcome::IdCollision {
                    sha: sha.to_string(),
                })
            }
        }
    }

    /// Mark a link deleted, pending propagation
    ///
    /// Returns false when no link has this sha.
    pub fn delete_link(&self, sha: &str) -> Result<bool> {
        let Some(link) = self.store.get_by_sha(sha)? else {
            return Ok(false);
        };
        if !link.deleted {
            self.store.upsert(link.tombstone())?;
            info!("Deleted link {}", sha);
        }
        self.request_upload();
        Ok(true)
    }

    /// Live links, newest first
    pub fn list_links(&self) -> Result<Vec<Link>> {
        self.store.list(LinkFilter::Live, LinkOrder::IdDescending)
    }

    /// Records with changes not yet acknowledged by the remote
    pub fn pending_count(&self) -> Result<usize> {
        self.store.count(LinkFilter::Dirty)
    }

    fn stored(&self, id: LinkId, sha: &str, url: &str) -> Result<Link> {
        let mut link = self
            .store
            .get(id)?
            .unwrap_or_else(|| Link::new_local(sha, url));
        link.id = Some(id);
        Ok(link)
    }

    fn request_upload(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.request_sync(SyncRequest::upload_only(self.account.clone()));
        }
    }
}
