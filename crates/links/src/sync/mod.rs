//! Synchronization with the remote link service
//!
//! A pass uploads local changes, then downloads remote changes since the
//! cursor, then advances the cursor. Push messages apply single changes
//! between passes or ask the scheduler for a full pass.

mod apply;
mod engine;
mod error;
mod push;
mod scheduler;

pub use apply::{ApplyOutcome, apply_remote_link};
pub use engine::{PushRegistration, SyncEngine, SyncReport, SyncRequest, SyncStats};
pub use error::{SyncError, SyncErrorKind};
pub use push::{FixedPushId, PushIdSource, PushListener, PushMessage, PushOutcome};
pub use scheduler::{ChannelScheduler, SyncScheduler};
