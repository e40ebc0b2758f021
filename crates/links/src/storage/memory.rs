//! In-memory storage implementation
//!
//! Used by tests and demos. All indexes sit behind one RwLock so each
//! operation is a single atomic step.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use log::debug;
use parking_lot::RwLock;

use super::traits::{
    ChangeListener, ChangeNotifier, LinkFilter, LinkOrder, LinkStore, StoreChange, UpsertOutcome,
};
use crate::models::{Link, LinkId};

#[derive(Default)]
struct MemoryState {
    /// Records keyed by local id, iterated in id order
    links: BTreeMap<LinkId, Link>,
    by_sha: HashMap<String, LinkId>,
    by_url: HashMap<String, LinkId>,
    next_id: i64,
}

impl MemoryState {
    fn allocate_id(&mut self) -> LinkId {
        self.next_id += 1;
        LinkId(self.next_id)
    }
}

/// In-memory implementation of LinkStore
pub struct InMemoryLinkStore {
    state: RwLock<MemoryState>,
    notifier: ChangeNotifier,
}

impl InMemoryLinkStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            notifier: ChangeNotifier::new(),
        }
    }
}

impl Default for InMemoryLinkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStore for InMemoryLinkStore {
    fn get(&self, id: LinkId) -> Result<Option<Link>> {
        Ok(self.state.read().links.get(&id).cloned())
    }

    fn get_by_sha(&self, sha: &str) -> Result<Option<Link>> {
        let state = self.state.read();
        Ok(state
            .by_sha
            .get(sha)
            .and_then(|id| state.links.get(id))
            .cloned())
    }

    fn get_by_url(&self, url: &str) -> Result<Option<Link>> {
        let state = self.state.read();
        Ok(state
            .by_url
            .get(url)
            .and_then(|id| state.links.get(id))
            .cloned())
    }

    fn list(&self, filter: LinkFilter, order: LinkOrder) -> Result<Vec<Link>> {
        let state = self.state.read();
        let matching = state.links.values().filter(|link| filter.matches(link));
        let links = match order {
            LinkOrder::IdAscending => matching.cloned().collect(),
            LinkOrder::IdDescending => {
                let mut links: Vec<Link> = matching.cloned().collect();
                links.reverse();
                links
            }
        };
        Ok(links)
    }

    fn count(&self, filter: LinkFilter) -> Result<usize> {
        let state = self.state.read();
        Ok(state.links.values().filter(|link| filter.matches(link)).count())
    }

    fn insert(&self, mut link: Link) -> Result<UpsertOutcome> {
        link.validate()?;

        let outcome = {
            let mut state = self.state.write();
            if state.by_sha.contains_key(&link.sha) || state.by_url.contains_key(&link.url) {
                UpsertOutcome::Ignored
            } else {
                let id = state.allocate_id();
                link.id = Some(id);
                state.by_sha.insert(link.sha.clone(), id);
                state.by_url.insert(link.url.clone(), id);
                state.links.insert(id, link.clone());
                UpsertOutcome::Inserted(id)
            }
        };

        if let UpsertOutcome::Inserted(id) = outcome {
            self.notifier.notify(&StoreChange::Upserted { id, sha: link.sha });
        }
        Ok(outcome)
    }

    fn upsert(&self, mut link: Link) -> Result<UpsertOutcome> {
        link.validate()?;

        let outcome = {
            let mut state = self.state.write();
            let existing = state.by_sha.get(&link.sha).copied();
            let url_owner = state.by_url.get(&link.url).copied();

            match existing {
                Some(id) => {
                    if url_owner.is_some_and(|owner| owner != id) {
                        UpsertOutcome::Ignored
                    } else {
                        let previous = state.links.get(&id).cloned();
                        if let Some(previous) = previous {
                            if link.timestamp.is_none() {
                                link.timestamp = previous.timestamp;
                            }
                            if previous.url != link.url {
                                state.by_url.remove(&previous.url);
                                state.by_url.insert(link.url.clone(), id);
                            }
                        }
                        link.id = Some(id);
                        state.links.insert(id, link.clone());
                        UpsertOutcome::Updated(id)
                    }
                }
                None if url_owner.is_some() => UpsertOutcome::Ignored,
                None => {
                    let id = state.allocate_id();
                    link.id = Some(id);
                    state.by_sha.insert(link.sha.clone(), id);
                    state.by_url.insert(link.url.clone(), id);
                    state.links.insert(id, link.clone());
                    UpsertOutcome::Inserted(id)
                }
            }
        };

        match outcome {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => {
                self.notifier.notify(&StoreChange::Upserted { id, sha: link.sha });
            }
            UpsertOutcome::Ignored => {
                debug!("Ignored upsert of {} ({}): url or sha taken", link.sha, link.url);
            }
        }
        Ok(outcome)
    }

    fn clear_dirty(&self, uploaded: &Link, timestamp: Option<String>) -> Result<bool> {
        let id = {
            let mut state = self.state.write();
            let Some(id) = state.by_sha.get(&uploaded.sha).copied() else {
                return Ok(false);
            };
            let Some(current) = state.links.get_mut(&id) else {
                return Ok(false);
            };
            if !current.dirty || current.deleted || current.url != uploaded.url {
                return Ok(false);
            }
            current.dirty = false;
            if timestamp.is_some() {
                current.timestamp = timestamp;
            }
            id
        };

        self.notifier.notify(&StoreChange::Upserted {
            id,
            sha: uploaded.sha.clone(),
        });
        Ok(true)
    }

    fn delete_by_sha(&self, sha: &str) -> Result<bool> {
        let removed = {
            let mut state = self.state.write();
            match state.by_sha.remove(sha) {
                Some(id) => {
                    if let Some(link) = state.links.remove(&id) {
                        state.by_url.remove(&link.url);
                    }
                    true
                }
                None => false,
            }
        };

        if removed {
            self.notifier.notify(&StoreChange::Deleted { sha: sha.to_string() });
        }
        Ok(removed)
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.notifier.subscribe(listener);
    }

    fn clear(&self) -> Result<()> {
        *self.state.write() = MemoryState::default();
        self.notifier.notify(&StoreChange::Cleared);
        Ok(())
    }
}
