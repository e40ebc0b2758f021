//! Wiring of store, remote and sync engine for the command line

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use anyhow::Result;
use links::{
    AddOutcome, ChannelScheduler, CredentialProvider, CursorStore, FileCursorStore, FixedPushId,
    HttpLinksClient, Link, LinkActions, LinkFilter, LinkOrder, LinkStore, LinksSettings,
    OAuthTokenProvider, PushMessage, PushOutcome, PushRegistration, SqliteLinkStore,
    StaticTokenProvider, SyncEngine, SyncReport, SyncRequest, SyncScheduler,
};
use log::{debug, info, warn};

/// Environment variable holding a pre-provisioned bearer token
const TOKEN_ENV: &str = "LINKSYNC_TOKEN";

pub struct LinkSyncApp {
    account: String,
    settings: LinksSettings,
    store: Arc<dyn LinkStore>,
    cursors: Arc<FileCursorStore>,
    engine: Arc<SyncEngine>,
    actions: LinkActions,
    requests: Receiver<SyncRequest>,
    run_requested: bool,
}

impl LinkSyncApp {
    /// Open the local store and build the engine from settings
    ///
    /// With `run_requested`, passes requested by actions and pushes are run
    /// before the command returns.
    pub fn open(account: String, run_requested: bool) -> Result<Self> {
        let settings = LinksSettings::load()?;
        let store: Arc<dyn LinkStore> = Arc::new(SqliteLinkStore::new(settings.database_path()?)?);
        let cursors = Arc::new(FileCursorStore::in_config_dir()?);
        let remote = Arc::new(HttpLinksClient::new(
            settings.api_url.clone(),
            settings.request_timeout(),
        ));

        let (scheduler, requests) = ChannelScheduler::new();
        let scheduler: Arc<dyn SyncScheduler> = Arc::new(scheduler);

        let mut engine = SyncEngine::new(
            store.clone(),
            cursors.clone(),
            remote,
            credentials(&settings),
        )
        .with_scheduler(scheduler.clone());
        if let Some(push_id) = settings.push_id.clone().filter(|id| !id.is_empty()) {
            engine = engine.with_push_registration(PushRegistration {
                app_version: settings.app_version,
                source: Arc::new(FixedPushId::new(push_id)),
            });
        }

        let actions = LinkActions::new(store.clone(), account.clone()).with_scheduler(scheduler);

        Ok(Self {
            account,
            settings,
            store,
            cursors,
            engine: Arc::new(engine),
            actions,
            requests,
            run_requested,
        })
    }

    pub fn add(&self, url: &str) -> Result<()> {
        match self.actions.add_link(url)? {
            AddOutcome::Added(link) => println!("Added {} {}", link.sha, link.url),
            AddOutcome::DuplicateUrl { existing_sha } => {
                println!("Already saved as {existing_sha}")
            }
            AddOutcome::IdCollision { sha } => {
                println!("Generated id {sha} is taken, nothing saved; please retry")
            }
        }
        self.run_requested_passes();
        Ok(())
    }

    pub fn delete(&self, sha: &str) -> Result<()> {
        if self.actions.delete_link(sha)? {
            println!("Deleted {sha}");
            self.run_requested_passes();
        } else {
            println!("No link with sha {sha}");
        }
        Ok(())
    }

    pub fn list(&self, all: bool) -> Result<()> {
        let links = if all {
            self.store.list(LinkFilter::All, LinkOrder::IdDescending)?
        } else {
            self.actions.list_links()?
        };
        for link in &links {
            println!("{}", format_link(link));
        }
        if links.is_empty() {
            println!("No links saved");
        }
        Ok(())
    }

    pub fn sync(&self, upload_only: bool, reset: bool) -> Result<()> {
        if reset {
            self.engine.reset_cursor(&self.account)?;
        }
        let request = if upload_only {
            SyncRequest::upload_only(self.account.clone())
        } else {
            SyncRequest::full(self.account.clone())
        };

        let report = self.engine.sync(&request)?;
        println!("{}", format_report(&report));
        Ok(())
    }

    pub fn push(&self, payload: HashMap<String, String>) -> Result<()> {
        let message = PushMessage::from_payload(&payload)?;
        match self.engine.handle_push(&self.account, message)? {
            PushOutcome::Applied(outcome) => println!("Applied pushed change: {outcome:?}"),
            PushOutcome::FullSyncRequested => println!("Missed changes; full sync requested"),
        }
        self.run_requested_passes();
        Ok(())
    }

    pub fn status(&self) -> Result<()> {
        println!("Account:  {}", self.account);
        println!("Remote:   {}", self.settings.api_url);
        println!(
            "Links:    {} saved, {} pending upload",
            self.store.count(LinkFilter::Live)?,
            self.store.count(LinkFilter::Dirty)?
        );
        match self.cursors.load_cursor(&self.account)? {
            Some(cursor) => println!(
                "Cursor:   {} (moved {})",
                cursor.latest_timestamp,
                cursor.last_sync_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => println!("Cursor:   none, next sync downloads everything"),
        }
        match self.cursors.load_device()? {
            Some(device) if device.is_valid_for(self.settings.app_version) => {
                println!("Push:     registered as {}", device.push_id)
            }
            Some(device) => println!(
                "Push:     registered for app version {}, re-registers on next sync",
                device.app_version
            ),
            None => println!("Push:     not registered"),
        }
        Ok(())
    }

    pub fn login(&self, refresh_token: &str) -> Result<()> {
        let provider = OAuthTokenProvider::from_settings(&self.settings)?;
        provider.store_refresh_token(&self.account, refresh_token)?;
        match provider.token(&self.account) {
            Ok(_) => println!("Signed in as {}", self.account),
            Err(e) => println!("Stored credentials, but no token yet: {e}"),
        }
        Ok(())
    }

    /// Run the passes requested so far; failures leave changes pending
    fn run_requested_passes(&self) {
        let mut pending: Vec<SyncRequest> = self.requests.try_iter().collect();
        pending.dedup();
        if !self.run_requested {
            debug!("Offline, leaving {} requested passes", pending.len());
            return;
        }

        for request in pending {
            match self.engine.sync(&request) {
                Ok(report) => info!("{}", format_report(&report)),
                Err(e) if e.needs_user_action() => {
                    warn!("Sync needs sign-in ({}); run `linksync login`", e)
                }
                Err(e) => warn!("Sync failed, changes stay pending: {}", e),
            }
        }
    }
}

fn credentials(settings: &LinksSettings) -> Arc<dyn CredentialProvider> {
    if let Some(token) = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()) {
        debug!("Using bearer token from {}", TOKEN_ENV);
        return Arc::new(StaticTokenProvider::new(token));
    }
    match OAuthTokenProvider::from_settings(settings) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            debug!("OAuth not configured: {:#}", e);
            Arc::new(StaticTokenProvider::empty())
        }
    }
}

fn format_link(link: &Link) -> String {
    let mut flags = String::new();
    if link.dirty {
        flags.push('*');
    }
    if link.deleted {
        flags.push('x');
    }
    format!(
        "{:<8} {:<2} {:<26} {}",
        link.sha,
        flags,
        link.timestamp.as_deref().unwrap_or("-"),
        link.url
    )
}

fn format_report(report: &SyncReport) -> String {
    let mut line = format!(
        "Synced in {:.1?}: {} uploaded, {} deleted remotely, {} downloaded, {} deleted locally{}",
        report.duration,
        report.uploaded,
        report.remote_deletes,
        report.downloaded,
        report.local_deletes,
        if report.ignored > 0 {
            format!(", {} ignored (duplicate url)", report.ignored)
        } else {
            String::new()
        }
    );
    if report.changed_during_upload > 0 {
        line.push_str(&format!(
            ", {} edited during upload and still pending",
            report.changed_during_upload
        ));
    }
    line
}
