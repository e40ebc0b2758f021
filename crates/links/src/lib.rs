//! Links crate - local link collection kept in sync with a remote service
//!
//! This crate provides:
//! - Domain models (Link, SyncCursor, DeviceState)
//! - Identifier allocation for new links
//! - Record store trait with in-memory and SQLite implementations
//! - Cursor and device state persistence
//! - Remote service client and credential providers
//! - Sync engine (upload, incremental download, push wake-ups)
//! - Local actions (add/delete) that feed the sync engine
//!
//! The crate is synchronous and executor-agnostic; every remote call
//! blocks the calling thread until it completes or times out.

pub mod actions;
pub mod config;
pub mod ids;
pub mod models;
pub mod remote;
pub mod storage;
pub mod sync;

pub use actions::{AddOutcome, LinkActions};
pub use crate::config::LinksSettings;
pub use ids::generate_id;
pub use models::{DeviceState, Link, LinkId, SyncCursor};
pub use remote::{
    BearerToken, CredentialError, CredentialProvider, HttpLinksClient, InMemoryRemote,
    LinksRemote, OAuthTokenProvider, RemoteError, RemoteOp, StaticTokenProvider,
    api::{LinkList, RemoteLink},
};
pub use storage::{
    CursorStore, FileCursorStore, InMemoryCursorStore, InMemoryLinkStore, LinkFilter, LinkOrder,
    LinkStore, SqliteLinkStore, StoreChange, UpsertOutcome,
};
pub use sync::{
    ApplyOutcome, ChannelScheduler, FixedPushId, PushIdSource, PushListener, PushMessage,
    PushOutcome, PushRegistration, SyncEngine, SyncError, SyncErrorKind, SyncReport, SyncRequest,
    SyncScheduler, SyncStats, apply_remote_link,
};
