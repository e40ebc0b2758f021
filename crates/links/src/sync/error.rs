//! Sync error classification

use crate::remote::{CredentialError, RemoteError};

/// Why a sync pass did not complete
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A pass for the same account and authority is already in flight
    #[error("sync for {account} ({authority}) already running")]
    AlreadyRunning { account: String, authority: String },

    /// No bearer token could be obtained
    #[error("authentication failed: {0}")]
    Auth(#[from] CredentialError),

    /// The remote rejected the token mid-pass
    #[error("remote rejected the credentials")]
    Unauthorized,

    /// The remote rejected a record or returned something unreadable
    #[error("data error: {0}")]
    PermanentData(RemoteError),

    /// Timeout, connection failure or server error
    #[error("network error: {0}")]
    TransientNetwork(RemoteError),

    /// The local store failed
    #[error("local store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Coarse class of a sync failure, as counted in stats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
    Skipped,
    Auth,
    PermanentData,
    TransientNetwork,
    Store,
}

impl From<RemoteError> for SyncError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Unauthorized => SyncError::Unauthorized,
            RemoteError::Transient(_) => SyncError::TransientNetwork(error),
            RemoteError::Permanent { .. } | RemoteError::Decode(_) => {
                SyncError::PermanentData(error)
            }
        }
    }
}

impl SyncError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::AlreadyRunning { .. } => SyncErrorKind::Skipped,
            SyncError::Auth(_) | SyncError::Unauthorized => SyncErrorKind::Auth,
            SyncError::PermanentData(_) => SyncErrorKind::PermanentData,
            SyncError::TransientNetwork(_) => SyncErrorKind::TransientNetwork,
            SyncError::Store(_) => SyncErrorKind::Store,
        }
    }

    /// Whether a scheduler should retry the pass with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Auth(e) => e.is_retryable(),
            SyncError::Unauthorized | SyncError::TransientNetwork(_) => true,
            SyncError::AlreadyRunning { .. }
            | SyncError::PermanentData(_)
            | SyncError::Store(_) => false,
        }
    }

    /// Whether the user must act (sign in) before sync can succeed
    pub fn needs_user_action(&self) -> bool {
        matches!(self, SyncError::Auth(e) if e.needs_user_action())
    }
}
