//! Sync engine
//!
//! One pass runs these steps in order and stops at the first failure:
//!
//! 1. Obtain a bearer token for the account
//! 2. Register for push wake-ups if this app version is not registered yet
//!    (failures are logged and ignored)
//! 3. Upload every dirty record in local id order: tombstones become remote
//!    deletes and are then removed locally, everything else is sent and then
//!    marked clean
//! 4. Download (skipped for upload-only passes): the full live snapshot when
//!    there is no cursor, otherwise every change after the cursor including
//!    tombstones
//! 5. Save the cursor once the whole batch is applied
//!
//! Records already committed when a pass fails stay committed; the next pass
//! picks up from there.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use super::apply::{ApplyOutcome, apply_remote_link};
use super::error::{SyncError, SyncErrorKind};
use super::push::{PushIdSource, PushMessage, PushOutcome};
use super::scheduler::SyncScheduler;
use crate::models::{DeviceState, SyncCursor, timestamp};
use crate::remote::api::RemoteLink;
use crate::remote::{BearerToken, CredentialProvider, LinksRemote};
use crate::storage::{CursorStore, LinkFilter, LinkOrder, LinkStore};

/// A request for one sync pass
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncRequest {
    pub account: String,
    /// Data set being synced; passes are deduplicated per account and authority
    pub authority: String,
    /// Skip the download phase
    pub upload_only: bool,
}

impl SyncRequest {
    pub const DEFAULT_AUTHORITY: &'static str = "links";

    /// Upload, then download
    pub fn full(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            authority: Self::DEFAULT_AUTHORITY.to_string(),
            upload_only: false,
        }
    }

    /// Push local changes only
    pub fn upload_only(account: impl Into<String>) -> Self {
        Self {
            upload_only: true,
            ..Self::full(account)
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    fn key(&self) -> (String, String) {
        (self.account.clone(), self.authority.clone())
    }
}

/// What one successful pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records sent to the remote and marked clean
    pub uploaded: usize,
    /// Records sent but edited locally meanwhile; they stay pending
    pub changed_during_upload: usize,
    /// Tombstones propagated to the remote and removed locally
    pub remote_deletes: usize,
    /// Remote records stored locally
    pub downloaded: usize,
    /// Local records removed by remote tombstones
    pub local_deletes: usize,
    /// Remote records skipped because their url is held by another record
    pub ignored: usize,
    /// Cursor after the pass
    pub cursor: Option<String>,
    /// Whether this pass registered the device for push
    pub push_registered: bool,
    pub duration: Duration,
}

/// Cumulative counters across passes
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub passes_completed: u64,
    pub passes_skipped: u64,
    pub auth_failures: u64,
    pub network_failures: u64,
    /// Rejected or unreadable data; needs operator attention
    pub data_errors: u64,
    pub store_errors: u64,
    pub links_uploaded: u64,
    pub links_downloaded: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Push registration settings
pub struct PushRegistration {
    /// Registrations made under another app version are redone
    pub app_version: u32,
    pub source: Arc<dyn PushIdSource>,
}

type PassKey = (String, String);

/// Marks a pass as in flight until dropped
struct PassGuard<'a> {
    in_flight: &'a Mutex<HashSet<PassKey>>,
    key: PassKey,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

/// Runs sync passes against one store and one remote
pub struct SyncEngine {
    store: Arc<dyn LinkStore>,
    cursors: Arc<dyn CursorStore>,
    remote: Arc<dyn LinksRemote>,
    credentials: Arc<dyn CredentialProvider>,
    push: Option<PushRegistration>,
    scheduler: Option<Arc<dyn SyncScheduler>>,
    in_flight: Mutex<HashSet<PassKey>>,
    stats: RwLock<SyncStats>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn LinkStore>,
        cursors: Arc<dyn CursorStore>,
        remote: Arc<dyn LinksRemote>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            store,
            cursors,
            remote,
            credentials,
            push: None,
            scheduler: None,
            in_flight: Mutex::new(HashSet::new()),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Register for push wake-ups during passes
    pub fn with_push_registration(mut self, registration: PushRegistration) -> Self {
        self.push = Some(registration);
        self
    }

    /// Where overflow pushes send their full-pass request
    pub fn with_scheduler(mut self, scheduler: Arc<dyn SyncScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn store(&self) -> &Arc<dyn LinkStore> {
        &self.store
    }

    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Whether a pass for this account and authority is in flight
    pub fn is_running(&self, account: &str, authority: &str) -> bool {
        self.in_flight
            .lock()
            .contains(&(account.to_string(), authority.to_string()))
    }

    /// Forget the cursor so the next pass downloads a full snapshot
    pub fn reset_cursor(&self, account: &str) -> anyhow::Result<()> {
        info!("Resetting sync cursor for {}", account);
        self.cursors.clear_cursor(account)
    }

    /// Run one pass
    ///
    /// A request for an account and authority that already has a pass in
    /// flight is dropped with `SyncError::AlreadyRunning`.
    pub fn sync(&self, request: &SyncRequest) -> Result<SyncReport, SyncError> {
        let Some(_guard) = self.try_begin(request) else {
            debug!(
                "Sync for {} ({}) already running, dropping request",
                request.account, request.authority
            );
            self.stats.write().passes_skipped += 1;
            return Err(SyncError::AlreadyRunning {
                account: request.account.clone(),
                authority: request.authority.clone(),
            });
        };

        info!(
            "Starting {} sync for {}",
            if request.upload_only { "upload-only" } else { "full" },
            request.account
        );
        let result = self.run_pass(request);
        self.record_outcome(&result);

        match &result {
            Ok(report) => info!(
                "Sync for {} done in {:?}: {} uploaded, {} deleted remotely, {} downloaded, {} deleted locally",
                request.account,
                report.duration,
                report.uploaded,
                report.remote_deletes,
                report.downloaded,
                report.local_deletes
            ),
            Err(e) => warn!("Sync for {} failed: {}", request.account, e),
        }
        result
    }

    /// React to a push message
    ///
    /// A single change is applied right away, independent of the cursor. An
    /// overflow asks the scheduler for a full pass.
    pub fn handle_push(&self, account: &str, message: PushMessage) -> Result<PushOutcome, SyncError> {
        match message {
            PushMessage::Change(remote) => {
                debug!("Applying pushed change to {}", remote.sha);
                let outcome = apply_remote_link(self.store.as_ref(), &remote)?;
                Ok(PushOutcome::Applied(outcome))
            }
            PushMessage::Overflow => {
                info!("Push messages were dropped for {}, requesting full sync", account);
                match &self.scheduler {
                    Some(scheduler) => scheduler.request_sync(SyncRequest::full(account)),
                    None => warn!("No scheduler configured; full sync for {} not requested", account),
                }
                Ok(PushOutcome::FullSyncRequested)
            }
        }
    }

    fn try_begin(&self, request: &SyncRequest) -> Option<PassGuard<'_>> {
        let key = request.key();
        if self.in_flight.lock().insert(key.clone()) {
            Some(PassGuard {
                in_flight: &self.in_flight,
                key,
            })
        } else {
            None
        }
    }

    fn run_pass(&self, request: &SyncRequest) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        let token = self.credentials.token(&request.account)?;

        report.push_registered = self.ensure_push_registration(&token);
        let push_id = self.registered_push_id();

        let mut result = self.upload(&token, push_id.as_deref(), &mut report);
        if result.is_ok() && !request.upload_only {
            result = self.download(&request.account, &token, &mut report);
        }

        if let Err(SyncError::Unauthorized) = &result {
            self.credentials.invalidate(&request.account, &token);
        }
        result?;

        report.duration = start.elapsed();
        Ok(report)
    }

    fn upload(
        &self,
        token: &BearerToken,
        push_id: Option<&str>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let pending = self.store.list(LinkFilter::Dirty, LinkOrder::IdAscending)?;
        if pending.is_empty() {
            debug!("No local changes to upload");
            return Ok(());
        }
        info!("Uploading {} local changes", pending.len());

        for link in pending {
            if link.deleted {
                self.remote
                    .delete_link(token, &link.sha, push_id)
                    .inspect_err(|e| warn!("Remote delete of {} failed: {}", link.sha, e))?;
                self.store.delete_by_sha(&link.sha)?;
                report.remote_deletes += 1;
                debug!("Propagated deletion of {}", link.sha);
            } else {
                let ack = self
                    .remote
                    .add_link(token, &RemoteLink::from(&link), push_id)
                    .inspect_err(|e| warn!("Upload of {} failed: {}", link.sha, e))?;
                if self.store.clear_dirty(&link, ack.timestamp)? {
                    report.uploaded += 1;
                } else {
                    debug!("Link {} changed during upload, leaving it dirty", link.sha);
                    report.changed_during_upload += 1;
                }
            }
        }
        Ok(())
    }

    fn download(
        &self,
        account: &str,
        token: &BearerToken,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let cursor = self.cursors.load_cursor(account)?;
        let batch = match &cursor {
            Some(cursor) => {
                info!("Downloading changes after {}", cursor.latest_timestamp);
                self.remote
                    .list_links(token, true, Some(&cursor.latest_timestamp))?
            }
            None => {
                info!("No cursor for {}, downloading full snapshot", account);
                self.remote.list_links(token, false, None)?
            }
        };

        for remote in &batch.links {
            match apply_remote_link(self.store.as_ref(), remote)? {
                ApplyOutcome::Stored => report.downloaded += 1,
                ApplyOutcome::Removed => report.local_deletes += 1,
                ApplyOutcome::Absent => {}
                ApplyOutcome::Ignored => report.ignored += 1,
            }
        }

        let reported = batch.latest_timestamp.or_else(|| {
            batch
                .links
                .iter()
                .filter_map(|link| link.timestamp.clone())
                .max_by(|a, b| timestamp::compare(a, b))
        });
        let next = match (cursor, reported) {
            (Some(cursor), Some(reported)) => Some(cursor.advanced(&reported)),
            (None, Some(reported)) => Some(SyncCursor::new(account, reported)),
            (cursor, None) => cursor,
        };

        if let Some(next) = next {
            let kept = self.cursors.save_cursor(next)?;
            debug!("Cursor for {} now {}", account, kept.latest_timestamp);
            report.cursor = Some(kept.latest_timestamp);
        }
        Ok(())
    }

    /// Register for push if this app version has no registration yet
    ///
    /// Returns whether a registration happened. Never fails the pass.
    fn ensure_push_registration(&self, token: &BearerToken) -> bool {
        let Some(registration) = &self.push else {
            return false;
        };

        match self.cursors.load_device() {
            Ok(Some(device)) if device.is_valid_for(registration.app_version) => return false,
            Ok(_) => {}
            Err(e) => {
                warn!("Could not read push registration state: {:#}", e);
                return false;
            }
        }

        let push_id = match registration.source.push_id() {
            Ok(push_id) if !push_id.is_empty() => push_id,
            Ok(_) => {
                warn!("Push transport returned an empty registration id");
                return false;
            }
            Err(e) => {
                warn!("Could not obtain push registration id: {:#}", e);
                return false;
            }
        };

        if let Err(e) = self.remote.register_push(token, &push_id) {
            warn!("Push registration failed: {}", e);
            return false;
        }
        if let Err(e) = self
            .cursors
            .save_device(DeviceState::new(push_id, registration.app_version))
        {
            warn!("Could not persist push registration: {:#}", e);
        }

        info!(
            "Registered for push wake-ups (app version {})",
            registration.app_version
        );
        true
    }

    fn registered_push_id(&self) -> Option<String> {
        match self.cursors.load_device() {
            Ok(device) => device.map(|d| d.push_id).filter(|id| !id.is_empty()),
            Err(e) => {
                warn!("Could not read push registration state: {:#}", e);
                None
            }
        }
    }

    fn record_outcome(&self, result: &Result<SyncReport, SyncError>) {
        let mut stats = self.stats.write();
        match result {
            Ok(report) => {
                stats.passes_completed += 1;
                stats.links_uploaded += report.uploaded as u64;
                stats.links_downloaded += report.downloaded as u64;
                stats.last_success_at = Some(Utc::now());
                stats.last_error = None;
            }
            Err(e) => {
                match e.kind() {
                    SyncErrorKind::Skipped => {}
                    SyncErrorKind::Auth => stats.auth_failures += 1,
                    SyncErrorKind::TransientNetwork => stats.network_failures += 1,
                    SyncErrorKind::PermanentData => stats.data_errors += 1,
                    SyncErrorKind::Store => stats.store_errors += 1,
                }
                stats.last_error = Some(e.to_string());
            }
        }
    }
}
