//! In-memory link service
//!
//! Behaves like the real service: records keyed by sha, a server clock that
//! stamps every accepted change, tombstones kept so incremental listings can
//! report deletions. Failures can be scripted per operation for tests.

use std::collections::{HashMap, VecDeque};

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use log::debug;
use parking_lot::Mutex;

use super::api::{LinkList, RemoteLink};
use super::{BearerToken, LinksRemote, RemoteError};
use crate::models::timestamp;

/// Remote operations that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    List,
    Get,
    Add,
    Delete,
    RegisterPush,
}

/// When a scripted failure hits
#[derive(Debug, Clone)]
enum Failure {
    /// Fail without touching server state
    Before(RemoteError),
    /// Apply the change, then fail as if the acknowledgement was lost
    After(RemoteError),
}

#[derive(Debug, Clone)]
struct ServerLink {
    url: String,
    deleted: bool,
    timestamp: NaiveDateTime,
}

#[derive(Default)]
struct ServerState {
    links: HashMap<String, ServerLink>,
    /// Last stamp handed out; each change gets a strictly later one
    clock: Option<NaiveDateTime>,
    failures: HashMap<RemoteOp, VecDeque<Failure>>,
    calls: HashMap<RemoteOp, usize>,
    list_requests: Vec<(bool, Option<String>)>,
    push_ids: Vec<String>,
    /// Push id that originated each change, by sha
    origins: HashMap<String, Option<String>>,
}

impl ServerState {
    fn tick(&mut self) -> NaiveDateTime {
        let base = NaiveDateTime::parse_from_str("2024-01-01 00:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap_or_default();
        let next = match self.clock {
            Some(last) => last + ChronoDuration::microseconds(1),
            None => base,
        };
        self.clock = Some(next);
        next
    }

    fn take_failure(&mut self, op: RemoteOp) -> Option<Failure> {
        *self.calls.entry(op).or_default() += 1;
        self.failures.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn to_remote(sha: &str, link: &ServerLink) -> RemoteLink {
        RemoteLink {
            url: link.url.clone(),
            sha: sha.to_string(),
            deleted: link.deleted,
            timestamp: Some(timestamp::format(link.timestamp)),
        }
    }
}

/// In-memory implementation of LinksRemote
pub struct InMemoryRemote {
    state: Mutex<ServerState>,
    accepted_token: Option<String>,
}

impl InMemoryRemote {
    /// Accept any bearer token
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState::default()),
            accepted_token: None,
        }
    }

    /// Reject every token except this one with 401
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(ServerState::default()),
            accepted_token: Some(token.into()),
        }
    }

    /// Fail the next call of `op` without applying it
    pub fn fail_next(&self, op: RemoteOp, error: RemoteError) {
        self.push_failure(op, Failure::Before(error));
    }

    /// Apply the next call of `op`, then report `error` as if the response was lost
    pub fn lose_next_ack(&self, op: RemoteOp, error: RemoteError) {
        self.push_failure(op, Failure::After(error));
    }

    fn push_failure(&self, op: RemoteOp, failure: Failure) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(failure);
    }

    /// Change made by another device, bypassing any failure script
    pub fn insert_from_other_device(&self, sha: &str, url: &str) -> RemoteLink {
        let mut state = self.state.lock();
        let stamp = state.tick();
        let link = ServerLink {
            url: url.to_string(),
            deleted: false,
            timestamp: stamp,
        };
        let remote = ServerState::to_remote(sha, &link);
        state.links.insert(sha.to_string(), link);
        state.origins.insert(sha.to_string(), None);
        remote
    }

    /// Deletion made by another device; returns the tombstone if the link existed
    pub fn delete_from_other_device(&self, sha: &str) -> Option<RemoteLink> {
        let mut state = self.state.lock();
        let stamp = state.tick();
        let link = state.links.get_mut(sha)?;
        link.deleted = true;
        link.timestamp = stamp;
        let remote = ServerState::to_remote(sha, link);
        state.origins.insert(sha.to_string(), None);
        Some(remote)
    }

    /// Current server-side view of one link, tombstones included
    pub fn link(&self, sha: &str) -> Option<RemoteLink> {
        let state = self.state.lock();
        state
            .links
            .get(sha)
            .map(|link| ServerState::to_remote(sha, link))
    }

    /// All live links, sorted by sha
    pub fn live_links(&self) -> Vec<RemoteLink> {
        let state = self.state.lock();
        let mut links: Vec<RemoteLink> = state
            .links
            .iter()
            .filter(|(_, link)| !link.deleted)
            .map(|(sha, link)| ServerState::to_remote(sha, link))
            .collect();
        links.sort_by(|a, b| a.sha.cmp(&b.sha));
        links
    }

    /// Number of calls made for an operation, failed ones included
    pub fn calls(&self, op: RemoteOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// `(show_deleted, timestamp_min)` of every list request, in order
    pub fn list_requests(&self) -> Vec<(bool, Option<String>)> {
        self.state.lock().list_requests.clone()
    }

    /// Push ids registered so far
    pub fn registered_push_ids(&self) -> Vec<String> {
        self.state.lock().push_ids.clone()
    }

    /// Push id that sent the last change to `sha`, if any
    pub fn origin_of(&self, sha: &str) -> Option<String> {
        self.state.lock().origins.get(sha).cloned().flatten()
    }

    fn check_token(&self, token: &BearerToken) -> Result<(), RemoteError> {
        match &self.accepted_token {
            Some(accepted) if accepted != token.as_str() => Err(RemoteError::Unauthorized),
            _ => Ok(()),
        }
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl LinksRemote for InMemoryRemote {
    fn list_links(
        &self,
        token: &BearerToken,
        show_deleted: bool,
        timestamp_min: Option<&str>,
    ) -> Result<LinkList, RemoteError> {
        self.check_token(token)?;
        let mut state = self.state.lock();
        state
            .list_requests
            .push((show_deleted, timestamp_min.map(str::to_string)));
        if let Some(Failure::Before(e) | Failure::After(e)) = state.take_failure(RemoteOp::List) {
            return Err(e);
        }

        let min = match timestamp_min {
            Some(value) => Some(timestamp::parse(value).ok_or_else(|| {
                RemoteError::from_status(400, format!("bad timestampMin {value:?}"))
            })?),
            None => None,
        };

        let mut matching: Vec<(&String, &ServerLink)> = state
            .links
            .iter()
            .filter(|(_, link)| show_deleted || !link.deleted)
            .filter(|(_, link)| min.is_none_or(|min| link.timestamp > min))
            .collect();
        matching.sort_by_key(|(_, link)| link.timestamp);

        let latest = matching
            .last()
            .map(|(_, link)| timestamp::format(link.timestamp))
            .unwrap_or_else(|| timestamp::EPOCH.to_string());
        let links = matching
            .into_iter()
            .map(|(sha, link)| ServerState::to_remote(sha, link))
            .collect();

        debug!("In-memory remote listed links newer than {:?}", timestamp_min);
        Ok(LinkList {
            latest_timestamp: Some(latest),
            links,
        })
    }

    fn get_link(&self, token: &BearerToken, sha: &str) -> Result<RemoteLink, RemoteError> {
        self.check_token(token)?;
        let mut state = self.state.lock();
        if let Some(Failure::Before(e) | Failure::After(e)) = state.take_failure(RemoteOp::Get) {
            return Err(e);
        }
        state
            .links
            .get(sha)
            .map(|link| ServerState::to_remote(sha, link))
            .ok_or_else(|| RemoteError::from_status(404, format!("no link {sha}")))
    }

    fn add_link(
        &self,
        token: &BearerToken,
        link: &RemoteLink,
        push_id: Option<&str>,
    ) -> Result<RemoteLink, RemoteError> {
        self.check_token(token)?;
        let mut state = self.state.lock();
        let failure = state.take_failure(RemoteOp::Add);
        if let Some(Failure::Before(e)) = failure {
            return Err(e);
        }

        let stamp = state.tick();
        let stored = ServerLink {
            url: link.url.clone(),
            deleted: link.deleted,
            timestamp: stamp,
        };
        let ack = ServerState::to_remote(&link.sha, &stored);
        state.links.insert(link.sha.clone(), stored);
        state
            .origins
            .insert(link.sha.clone(), push_id.map(str::to_string));

        match failure {
            Some(Failure::After(e)) => Err(e),
            _ => Ok(ack),
        }
    }

    fn delete_link(
        &self,
        token: &BearerToken,
        sha: &str,
        push_id: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.check_token(token)?;
        let mut state = self.state.lock();
        let failure = state.take_failure(RemoteOp::Delete);
        if let Some(Failure::Before(e)) = failure {
            return Err(e);
        }

        let stamp = state.tick();
        if let Some(link) = state.links.get_mut(sha) {
            link.deleted = true;
            link.timestamp = stamp;
            state
                .origins
                .insert(sha.to_string(), push_id.map(str::to_string));
        }

        match failure {
            Some(Failure::After(e)) => Err(e),
            _ => Ok(()),
        }
    }

    fn register_push(&self, token: &BearerToken, push_id: &str) -> Result<(), RemoteError> {
        self.check_token(token)?;
        let mut state = self.state.lock();
        if let Some(Failure::Before(e) | Failure::After(e)) =
            state.take_failure(RemoteOp::RegisterPush)
        {
            return Err(e);
        }
        if !state.push_ids.iter().any(|id| id == push_id) {
            state.push_ids.push(push_id.to_string());
        }
        Ok(())
    }
}
