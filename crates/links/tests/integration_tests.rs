//! Integration tests for the links crate
//!
//! These tests run complete sync passes between local stores and an
//! in-memory remote, including several devices sharing one account.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Result, bail};
use links::models::timestamp;
use links::storage::ChangeListener;
use links::{
    AddOutcome, BearerToken, ChannelScheduler, CredentialError, CredentialProvider,
    CursorStore, FileCursorStore, FixedPushId, InMemoryCursorStore, InMemoryLinkStore,
    InMemoryRemote, Link, LinkActions, LinkFilter, LinkId, LinkList, LinkOrder, LinkStore,
    LinksRemote, PushListener, PushMessage, PushOutcome, PushRegistration, RemoteError,
    RemoteLink, RemoteOp, SqliteLinkStore,
    StaticTokenProvider, SyncEngine, SyncError, SyncRequest, UpsertOutcome,
};
use tempfile::TempDir;

const ACCOUNT: &str = "me@example.com";

/// One device: its own store and cursor, sharing the remote
struct Device {
    store: Arc<dyn LinkStore>,
    cursors: Arc<dyn CursorStore>,
    engine: Arc<SyncEngine>,
}

impl Device {
    fn in_memory(remote: &Arc<InMemoryRemote>) -> Self {
        Self::with_store(remote, Arc::new(InMemoryLinkStore::new()))
    }

    fn with_store(remote: &Arc<InMemoryRemote>, store: Arc<dyn LinkStore>) -> Self {
        let cursors: Arc<dyn CursorStore> = Arc::new(InMemoryCursorStore::new());
        let engine = SyncEngine::new(
            store.clone(),
            cursors.clone(),
            remote.clone(),
            Arc::new(StaticTokenProvider::new("token")),
        );
        Self {
            store,
            cursors,
            engine: Arc::new(engine),
        }
    }

    fn actions(&self) -> LinkActions {
        LinkActions::new(self.store.clone(), ACCOUNT)
    }

    fn sync(&self) -> Result<links::SyncReport, SyncError> {
        self.engine.sync(&SyncRequest::full(ACCOUNT))
    }

    fn cursor(&self) -> Option<String> {
        self.cursors
            .load_cursor(ACCOUNT)
            .unwrap()
            .map(|c| c.latest_timestamp)
    }

    fn shas(&self) -> Vec<String> {
        let mut shas: Vec<String> = self
            .store
            .list(LinkFilter::All, LinkOrder::IdAscending)
            .unwrap()
            .into_iter()
            .map(|link| link.sha)
            .collect();
        shas.sort();
        shas
    }
}

/// Store that starts failing upserts after a number of successful ones
struct FlakyStore {
    inner: InMemoryLinkStore,
    upserts_left: AtomicUsize,
}

impl FlakyStore {
    fn failing_after(upserts: usize) -> Self {
        Self {
            inner: InMemoryLinkStore::new(),
            upserts_left: AtomicUsize::new(upserts),
        }
    }

    fn heal(&self) {
        self.upserts_left.store(usize::MAX, Ordering::SeqCst);
    }

    fn fail_after(&self, upserts: usize) {
        self.upserts_left.store(upserts, Ordering::SeqCst);
    }
}

impl LinkStore for FlakyStore {
    fn get(&self, id: LinkId) -> Result<Option<Link>> {
        self.inner.get(id)
    }

    fn get_by_sha(&self, sha: &str) -> Result<Option<Link>> {
        self.inner.get_by_sha(sha)
    }

    fn get_by_url(&self, url: &str) -> Result<Option<Link>> {
        self.inner.get_by_url(url)
    }

    fn list(&self, filter: LinkFilter, order: LinkOrder) -> Result<Vec<Link>> {
        self.inner.list(filter, order)
    }

    fn count(&self, filter: LinkFilter) -> Result<usize> {
        self.inner.count(filter)
    }

    fn insert(&self, link: Link) -> Result<UpsertOutcome> {
        self.inner.insert(link)
    }

    fn upsert(&self, link: Link) -> Result<UpsertOutcome> {
        let left = self.upserts_left.load(Ordering::SeqCst);
        if left == 0 {
            bail!("disk full");
        }
        self.upserts_left.store(left - 1, Ordering::SeqCst);
        self.inner.upsert(link)
    }

    fn clear_dirty(&self, uploaded: &Link, timestamp: Option<String>) -> Result<bool> {
        self.inner.clear_dirty(uploaded, timestamp)
    }

    fn delete_by_sha(&self, sha: &str) -> Result<bool> {
        self.inner.delete_by_sha(sha)
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.inner.subscribe(listener)
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }
}

/// Credentials that block one account until released
struct GatedCredentials {
    gated_account: String,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl CredentialProvider for GatedCredentials {
    fn token(&self, account: &str) -> Result<BearerToken, CredentialError> {
        if account == self.gated_account {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        Ok(BearerToken::new("token"))
    }
}

/// Remote that holds one list response until released
struct PausingRemote {
    inner: Arc<InMemoryRemote>,
    armed: AtomicBool,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl LinksRemote for PausingRemote {
    fn list_links(
        &self,
        token: &BearerToken,
        show_deleted: bool,
        timestamp_min: Option<&str>,
    ) -> Result<LinkList, RemoteError> {
        let list = self.inner.list_links(token, show_deleted, timestamp_min)?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        Ok(list)
    }

    fn get_link(&self, token: &BearerToken, sha: &str) -> Result<RemoteLink, RemoteError> {
        self.inner.get_link(token, sha)
    }

    fn add_link(
        &self,
        token: &BearerToken,
        link: &RemoteLink,
        push_id: Option<&str>,
    ) -> Result<RemoteLink, RemoteError> {
        self.inner.add_link(token, link, push_id)
    }

    fn delete_link(
        &self,
        token: &BearerToken,
        sha: &str,
        push_id: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.inner.delete_link(token, sha, push_id)
    }

    fn register_push(&self, token: &BearerToken, push_id: &str) -> Result<(), RemoteError> {
        self.inner.register_push(token, push_id)
    }
}

#[test]
fn test_reupload_after_lost_ack_is_idempotent() {
    let remote = Arc::new(InMemoryRemote::new());
    let device = Device::in_memory(&remote);
    device
        .actions()
        .add_link_with_sha("ab12cd34", "https://example.com")
        .unwrap();

    remote.lose_next_ack(RemoteOp::Add, RemoteError::Transient("timeout".into()));
    let err = device.sync().unwrap_err();
    assert!(err.is_retryable());

    // The remote has it, but the local copy is still pending
    assert!(remote.link("ab12cd34").is_some());
    assert!(device.store.get_by_sha("ab12cd34").unwrap().unwrap().dirty);

    let report = device.sync().unwrap();
    assert_eq!(report.uploaded, 1);

    let live = remote.live_links();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].url, "https://example.com");
    assert!(!device.store.get_by_sha("ab12cd34").unwrap().unwrap().dirty);
}

#[test]
fn test_tombstone_converges_across_devices() {
    let remote = Arc::new(InMemoryRemote::new());
    let phone = Device::in_memory(&remote);
    let laptop = Device::in_memory(&remote);

    phone
        .actions()
        .add_link_with_sha("ab12cd34", "https://example.com")
        .unwrap();
    phone.sync().unwrap();
    laptop.sync().unwrap();
    assert_eq!(laptop.shas(), vec!["ab12cd34"]);

    assert!(phone.actions().delete_link("ab12cd34").unwrap());
    let report = phone.sync().unwrap();
    assert_eq!(report.remote_deletes, 1);
    assert!(phone.shas().is_empty());

    let report = laptop.sync().unwrap();
    assert_eq!(report.local_deletes, 1);
    assert!(laptop.shas().is_empty());
    assert!(remote.link("ab12cd34").unwrap().deleted);
}

#[test]
fn test_cursor_never_moves_backwards() {
    let remote = Arc::new(InMemoryRemote::new());
    let device = Device::in_memory(&remote);
    let mut cursors = Vec::new();

    remote.insert_from_other_device("aaaa0001", "https://a.example");
    remote.insert_from_other_device("aaaa0002", "https://b.example");
    device.sync().unwrap();
    cursors.push(device.cursor().unwrap());

    remote.insert_from_other_device("aaaa0003", "https://c.example");
    device.sync().unwrap();
    cursors.push(device.cursor().unwrap());

    // Failed download leaves the cursor alone
    remote.insert_from_other_device("aaaa0004", "https://d.example");
    remote.fail_next(RemoteOp::List, RemoteError::Transient("reset".into()));
    assert!(device.sync().is_err());
    assert_eq!(device.cursor().as_ref(), cursors.last());

    device.sync().unwrap();
    cursors.push(device.cursor().unwrap());

    // Nothing new: the remote reports the epoch, the cursor stays put
    device.sync().unwrap();
    cursors.push(device.cursor().unwrap());
    assert_ne!(cursors.last().map(String::as_str), Some(timestamp::EPOCH));

    remote.delete_from_other_device("aaaa0001");
    device.sync().unwrap();
    cursors.push(device.cursor().unwrap());

    for pair in cursors.windows(2) {
        assert_ne!(
            timestamp::compare(&pair[0], &pair[1]),
            std::cmp::Ordering::Greater,
            "cursor moved back from {} to {}",
            pair[0],
            pair[1]
        );
    }
    assert_eq!(device.shas(), vec!["aaaa0002", "aaaa0003", "aaaa0004"]);
}

#[test]
fn test_partial_download_failure_recovers() {
    let remote = Arc::new(InMemoryRemote::new());
    for i in 0..5 {
        remote.insert_from_other_device(&format!("aaaa000{i}"), &format!("https://{i}.example"));
    }

    let store = Arc::new(FlakyStore::failing_after(2));
    let device = Device::with_store(&remote, store.clone());

    let err = device.sync().unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
    assert_eq!(store.count(LinkFilter::All).unwrap(), 2);
    assert!(device.cursor().is_none());

    store.heal();
    let report = device.sync().unwrap();
    assert_eq!(report.downloaded, 5);
    assert_eq!(store.count(LinkFilter::All).unwrap(), 5);
    assert_eq!(store.count(LinkFilter::Dirty).unwrap(), 0);
    assert!(device.cursor().is_some());
}

#[test]
fn test_partial_incremental_download_keeps_cursor() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.insert_from_other_device("aaaa0001", "https://first.example");

    let store = Arc::new(FlakyStore::failing_after(usize::MAX));
    let device = Device::with_store(&remote, store.clone());
    device.sync().unwrap();
    let before = device.cursor().unwrap();

    let shas: Vec<String> = (0..5).map(|i| format!("bbbb000{i}")).collect();
    for (i, sha) in shas.iter().enumerate() {
        remote.insert_from_other_device(sha, &format!("https://{i}.example"));
    }

    store.fail_after(2);
    let err = device.sync().unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
    assert_eq!(store.count(LinkFilter::All).unwrap(), 3);
    assert_eq!(device.cursor(), Some(before.clone()));

    store.heal();
    let report = device.sync().unwrap();
    assert_eq!(report.downloaded, 5);

    let mut expected = vec!["aaaa0001".to_string()];
    expected.extend(shas.iter().cloned());
    assert_eq!(device.shas(), expected);
    assert_eq!(store.count(LinkFilter::Dirty).unwrap(), 0);

    // Both incremental attempts started from the same cursor
    let requests = remote.list_requests();
    assert_eq!(
        requests[requests.len() - 2..],
        [(true, Some(before.clone())), (true, Some(before.clone()))]
    );
    let after = device.cursor().unwrap();
    assert_eq!(Some(after.clone()), remote.link("bbbb0004").unwrap().timestamp);
    assert!(timestamp::compare(&after, &before).is_gt());
}

#[test]
fn test_round_trip_through_second_device() {
    let remote = Arc::new(InMemoryRemote::new());
    let phone = Device::in_memory(&remote);
    let laptop = Device::in_memory(&remote);

    let AddOutcome::Added(added) = phone.actions().add_link("https://example.com/a").unwrap()
    else {
        panic!("link should be added");
    };
    phone.sync().unwrap();

    let report = laptop.sync().unwrap();
    assert_eq!(report.downloaded, 1);
    let copy = laptop.store.get_by_sha(&added.sha).unwrap().unwrap();
    assert_eq!(copy.url, "https://example.com/a");
    assert!(!copy.dirty);
    assert_eq!(
        copy.timestamp,
        phone.store.get_by_sha(&added.sha).unwrap().unwrap().timestamp
    );
}

#[test]
fn test_upload_then_pushed_tombstone() {
    let remote = Arc::new(InMemoryRemote::new());
    let device = Device::in_memory(&remote);
    device
        .actions()
        .add_link_with_sha("ab12cd34", "https://example.com")
        .unwrap();

    device
        .engine
        .sync(&SyncRequest::upload_only(ACCOUNT))
        .unwrap();
    assert!(!device.store.get_by_sha("ab12cd34").unwrap().unwrap().dirty);

    let payload: HashMap<String, String> = [
        ("sha", "ab12cd34"),
        ("url", "https://example.com"),
        ("deleted", "true"),
        ("timestamp", "2024-06-01 00:00:00.000001"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let message = PushMessage::from_payload(&payload).unwrap();

    let outcome = device.engine.handle_push(ACCOUNT, message).unwrap();
    assert_eq!(outcome, PushOutcome::Applied(links::ApplyOutcome::Removed));
    assert!(device.store.get_by_sha("ab12cd34").unwrap().is_none());
    // Push applies never touch the cursor
    assert!(device.cursor().is_none());
}

#[test]
fn test_first_pass_downloads_full_snapshot() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.insert_from_other_device("aaaa0001", "https://a.example");
    let latest = remote.insert_from_other_device("aaaa0002", "https://b.example");
    let device = Device::in_memory(&remote);

    let report = device.sync().unwrap();
    assert_eq!(report.downloaded, 2);
    assert_eq!(remote.list_requests(), vec![(false, None)]);
    assert_eq!(device.cursor(), latest.timestamp);

    device.sync().unwrap();
    assert_eq!(remote.list_requests()[1], (true, latest.timestamp.clone()));
}

#[test]
fn test_upload_order_and_fail_fast() {
    let remote = Arc::new(InMemoryRemote::new());
    let device = Device::in_memory(&remote);
    let actions = device.actions();
    for (sha, url) in [
        ("cccc0003", "https://c.example"),
        ("aaaa0001", "https://a.example"),
        ("bbbb0002", "https://b.example"),
    ] {
        actions.add_link_with_sha(sha, url).unwrap();
    }

    remote.fail_next(RemoteOp::Add, RemoteError::from_status(400, "bad link"));
    let err = device.sync().unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(remote.calls(RemoteOp::Add), 1);
    assert_eq!(device.store.count(LinkFilter::Dirty).unwrap(), 3);

    device.sync().unwrap();
    let stamps: Vec<String> = ["cccc0003", "aaaa0001", "bbbb0002"]
        .iter()
        .map(|sha| remote.link(sha).unwrap().timestamp.unwrap())
        .collect();
    assert!(stamps.windows(2).all(|w| timestamp::compare(&w[0], &w[1]).is_lt()));
}

#[test]
fn test_concurrent_pass_for_same_account_is_dropped() {
    let remote = Arc::new(InMemoryRemote::new());
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let credentials = Arc::new(GatedCredentials {
        gated_account: ACCOUNT.to_string(),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    let engine = Arc::new(SyncEngine::new(
        Arc::new(InMemoryLinkStore::new()),
        Arc::new(InMemoryCursorStore::new()),
        remote.clone(),
        credentials,
    ));

    let background = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.sync(&SyncRequest::full(ACCOUNT)))
    };
    entered_rx.recv().unwrap();

    assert!(engine.is_running(ACCOUNT, SyncRequest::DEFAULT_AUTHORITY));
    let err = engine.sync(&SyncRequest::upload_only(ACCOUNT)).unwrap_err();
    assert!(matches!(err, SyncError::AlreadyRunning { .. }));

    // Other accounts and authorities are not blocked
    engine.sync(&SyncRequest::full("other@example.com")).unwrap();

    release_tx.send(()).unwrap();
    background.join().unwrap().unwrap();
    assert!(!engine.is_running(ACCOUNT, SyncRequest::DEFAULT_AUTHORITY));
    assert_eq!(engine.stats().passes_skipped, 1);
}

#[test]
fn test_cursor_kept_when_authorities_finish_out_of_order() {
    let inner = Arc::new(InMemoryRemote::new());
    inner.insert_from_other_device("aaaa0001", "https://a.example");

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let remote = Arc::new(PausingRemote {
        inner: inner.clone(),
        armed: AtomicBool::new(true),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    let cursors = Arc::new(InMemoryCursorStore::new());
    let engine = Arc::new(SyncEngine::new(
        Arc::new(InMemoryLinkStore::new()),
        cursors.clone(),
        remote,
        Arc::new(StaticTokenProvider::new("token")),
    ));

    // The "a" pass holds an older listing while "b" sees a newer change
    let slow = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.sync(&SyncRequest::full(ACCOUNT).with_authority("a")))
    };
    entered_rx.recv().unwrap();

    inner.insert_from_other_device("aaaa0002", "https://b.example");
    let newest = inner.link("aaaa0002").unwrap().timestamp.unwrap();
    let fast = engine
        .sync(&SyncRequest::full(ACCOUNT).with_authority("b"))
        .unwrap();
    assert_eq!(fast.cursor.as_deref(), Some(newest.as_str()));

    release_tx.send(()).unwrap();
    let slow = slow.join().unwrap().unwrap();

    assert_eq!(slow.cursor.as_deref(), Some(newest.as_str()));
    let stored = cursors.load_cursor(ACCOUNT).unwrap().unwrap();
    assert_eq!(stored.latest_timestamp, newest);
}

#[test]
fn test_auth_failure_leaves_state_untouched() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.insert_from_other_device("aaaa0001", "https://a.example");
    let store = Arc::new(InMemoryLinkStore::new());
    let cursors = Arc::new(InMemoryCursorStore::new());
    let credentials = Arc::new(StaticTokenProvider::new("token"));
    credentials.set_failure(Some(CredentialError::Permanent("account removed".into())));

    store
        .insert(Link::new_local("bbbb0002", "https://b.example"))
        .unwrap();
    let engine = SyncEngine::new(store.clone(), cursors.clone(), remote.clone(), credentials);

    let err = engine.sync(&SyncRequest::full(ACCOUNT)).unwrap_err();
    assert!(!err.is_retryable());
    assert!(!err.needs_user_action());
    assert!(remote.list_requests().is_empty());
    assert_eq!(remote.calls(RemoteOp::Add), 0);
    assert_eq!(store.count(LinkFilter::Dirty).unwrap(), 1);
    assert!(cursors.load_cursor(ACCOUNT).unwrap().is_none());
}

#[test]
fn test_push_listener_applies_and_requests_full_pass() {
    let remote = Arc::new(InMemoryRemote::new());
    let store = Arc::new(InMemoryLinkStore::new());
    let (scheduler, requests) = ChannelScheduler::new();
    let engine = Arc::new(
        SyncEngine::new(
            store.clone(),
            Arc::new(InMemoryCursorStore::new()),
            remote.clone(),
            Arc::new(StaticTokenProvider::new("token")),
        )
        .with_scheduler(Arc::new(scheduler)),
    );

    let (push_tx, push_rx) = mpsc::channel();
    let listener = PushListener::spawn(Arc::clone(&engine), ACCOUNT, push_rx).unwrap();

    let change = remote.insert_from_other_device("ab12cd34", "https://example.com");
    push_tx.send(PushMessage::Change(change)).unwrap();
    push_tx.send(PushMessage::Overflow).unwrap();
    drop(push_tx);

    assert_eq!(listener.join().unwrap(), 2);
    assert!(!store.get_by_sha("ab12cd34").unwrap().unwrap().dirty);

    let request = requests.try_recv().unwrap();
    assert_eq!(request, SyncRequest::full(ACCOUNT));
    engine.sync(&request).unwrap();
}

#[test]
fn test_push_registration_per_app_version() {
    let remote = Arc::new(InMemoryRemote::new());
    let store: Arc<dyn LinkStore> = Arc::new(InMemoryLinkStore::new());
    let cursors: Arc<dyn CursorStore> = Arc::new(InMemoryCursorStore::new());
    let engine_for = |version: u32| {
        SyncEngine::new(
            store.clone(),
            cursors.clone(),
            remote.clone(),
            Arc::new(StaticTokenProvider::new("token")),
        )
        .with_push_registration(PushRegistration {
            app_version: version,
            source: Arc::new(FixedPushId::new(format!("device-v{version}"))),
        })
    };

    // Failure is logged and the pass still succeeds
    let v1 = engine_for(1);
    remote.fail_next(RemoteOp::RegisterPush, RemoteError::Transient("offline".into()));
    assert!(!v1.sync(&SyncRequest::full(ACCOUNT)).unwrap().push_registered);
    assert!(v1.sync(&SyncRequest::full(ACCOUNT)).unwrap().push_registered);
    assert!(!v1.sync(&SyncRequest::full(ACCOUNT)).unwrap().push_registered);

    let v2 = engine_for(2);
    assert!(v2.sync(&SyncRequest::full(ACCOUNT)).unwrap().push_registered);
    assert_eq!(remote.calls(RemoteOp::RegisterPush), 3);
    assert_eq!(
        remote.registered_push_ids(),
        vec!["device-v1".to_string(), "device-v2".to_string()]
    );

    // Uploads carry the registration id so the remote can skip this device
    LinkActions::new(store.clone(), ACCOUNT)
        .add_link_with_sha("ab12cd34", "https://example.com")
        .unwrap();
    v2.sync(&SyncRequest::upload_only(ACCOUNT)).unwrap();
    assert_eq!(remote.origin_of("ab12cd34").as_deref(), Some("device-v2"));
}

#[test]
fn test_download_with_duplicate_url_is_ignored() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.insert_from_other_device("aaaa0001", "https://example.com");
    let device = Device::in_memory(&remote);
    device
        .store
        .insert(Link::new_local("bbbb0002", "https://example.com"))
        .unwrap();

    // The remote keys by sha alone and now holds both; locally the url
    // stays with the record that had it first
    let report = device.sync().unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.ignored, 1);
    assert_eq!(device.shas(), vec!["bbbb0002"]);
}

#[test]
fn test_sqlite_device_survives_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("links.test.sqlite");
    let state_path = dir.path().join("sync-state.json");
    let remote = Arc::new(InMemoryRemote::new());
    remote.insert_from_other_device("aaaa0001", "https://a.example");

    let build = || {
        SyncEngine::new(
            Arc::new(SqliteLinkStore::new(&db_path).unwrap()),
            Arc::new(FileCursorStore::new(&state_path)),
            remote.clone(),
            Arc::new(StaticTokenProvider::new("token")),
        )
    };

    {
        let engine = build();
        engine.sync(&SyncRequest::full(ACCOUNT)).unwrap();
        LinkActions::new(engine.store().clone(), ACCOUNT)
            .add_link_with_sha("bbbb0002", "https://b.example")
            .unwrap();
    }

    let engine = build();
    assert_eq!(engine.store().count(LinkFilter::All).unwrap(), 2);
    assert_eq!(engine.store().count(LinkFilter::Dirty).unwrap(), 1);

    let report = engine.sync(&SyncRequest::full(ACCOUNT)).unwrap();
    assert_eq!(report.uploaded, 1);
    // The restored cursor makes this an incremental download
    assert!(remote.list_requests().last().unwrap().0);
    assert_eq!(remote.live_links().len(), 2);
}
