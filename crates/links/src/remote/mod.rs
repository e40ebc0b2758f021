//! Remote link service integration
//!
//! Provides the typed client trait for the link service, its HTTP and
//! in-memory implementations, and bearer credential providers.

mod auth;
mod client;
mod memory;

pub use auth::{BearerToken, CredentialError, CredentialProvider, OAuthTokenProvider, StaticTokenProvider};
pub use client::HttpLinksClient;
pub use memory::{InMemoryRemote, RemoteOp};

/// Wire types of the link service
pub mod api {
    use serde::{Deserialize, Serialize};

    use crate::models::Link;

    /// A link as the remote service reports it
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RemoteLink {
        pub url: String,
        pub sha: String,
        #[serde(default)]
        pub deleted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub timestamp: Option<String>,
    }

    impl From<&Link> for RemoteLink {
        fn from(link: &Link) -> Self {
            Self {
                url: link.url.clone(),
                sha: link.sha.clone(),
                deleted: link.deleted,
                timestamp: link.timestamp.clone(),
            }
        }
    }

    /// Response to a list request
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LinkList {
        /// Latest timestamp the server holds; the epoch when it holds nothing
        pub latest_timestamp: Option<String>,
        #[serde(default)]
        pub links: Vec<RemoteLink>,
    }

    /// Body of a push registration request
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PushRegistrationBody {
        pub regid: String,
    }
}

use api::{LinkList, RemoteLink};

/// Classified failure of a remote call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The bearer token was rejected
    #[error("remote rejected the credentials (HTTP 401)")]
    Unauthorized,
    /// The request itself was rejected; retrying it unchanged will not help
    #[error("remote rejected the request (HTTP {status}): {message}")]
    Permanent { status: u16, message: String },
    /// Timeout, connection failure, server error or other I/O trouble
    #[error("transient remote failure: {0}")]
    Transient(String),
    /// The response body could not be decoded
    #[error("failed to decode remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Classify an HTTP error status
    ///
    /// 401 is an auth failure, 400/404/415 are data errors, and anything
    /// else (5xx, 408, 429, ...) is worth retrying later.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 => RemoteError::Unauthorized,
            400 | 404 | 415 => RemoteError::Permanent {
                status,
                message: message.into(),
            },
            _ => RemoteError::Transient(format!("HTTP {status}: {}", message.into())),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_) | RemoteError::Unauthorized)
    }
}

/// Client for the remote link service
///
/// Every call blocks until the remote answers or the client's timeout
/// expires.
pub trait LinksRemote: Send + Sync {
    /// List links, optionally only those changed after `timestamp_min`
    fn list_links(
        &self,
        token: &BearerToken,
        show_deleted: bool,
        timestamp_min: Option<&str>,
    ) -> Result<LinkList, RemoteError>;

    /// Point lookup by sha
    fn get_link(&self, token: &BearerToken, sha: &str) -> Result<RemoteLink, RemoteError>;

    /// Create or replace the link with this sha
    ///
    /// `push_id` names the originating device so it is not woken by its own
    /// change.
    fn add_link(
        &self,
        token: &BearerToken,
        link: &RemoteLink,
        push_id: Option<&str>,
    ) -> Result<RemoteLink, RemoteError>;

    /// Delete the link with this sha; deleting an absent link succeeds
    fn delete_link(
        &self,
        token: &BearerToken,
        sha: &str,
        push_id: Option<&str>,
    ) -> Result<(), RemoteError>;

    /// Register this device for push wake-ups
    fn register_push(&self, token: &BearerToken, push_id: &str) -> Result<(), RemoteError>;
}
