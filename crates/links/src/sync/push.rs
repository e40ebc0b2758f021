//! Push wake-ups from the link service
//!
//! The push transport delivers string maps. A map either carries one
//! changed link or says that too many changes were missed, in which case a
//! full pass is the only way to catch up.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};

use super::apply::ApplyOutcome;
use super::engine::SyncEngine;
use crate::remote::api::RemoteLink;

/// A message delivered by the push transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// One link changed on the remote
    Change(RemoteLink),
    /// Too many messages were dropped; run a full pass
    Overflow,
}

impl PushMessage {
    /// `message_type` value announcing dropped messages
    pub const OVERFLOW_TYPE: &'static str = "deleted_messages";

    /// Parse a push payload
    ///
    /// Keys: `sha`, `url`, `timestamp`, `deleted` ("true"/"false"), and
    /// `message_type` for the overflow signal.
    pub fn from_payload(payload: &HashMap<String, String>) -> Result<Self> {
        if payload.get("message_type").map(String::as_str) == Some(Self::OVERFLOW_TYPE) {
            return Ok(PushMessage::Overflow);
        }

        let sha = payload
            .get("sha")
            .filter(|sha| !sha.is_empty())
            .context("push payload has no sha")?;
        let deleted = match payload.get("deleted").map(|v| v.trim().to_ascii_lowercase()) {
            None => false,
            Some(value) if value.is_empty() || value == "false" => false,
            Some(value) if value == "true" => true,
            Some(value) => bail!("push payload has invalid deleted flag {value:?}"),
        };
        let url = payload.get("url").cloned().unwrap_or_default();
        if url.is_empty() && !deleted {
            bail!("push payload for {sha} has no url");
        }

        Ok(PushMessage::Change(RemoteLink {
            url,
            sha: sha.clone(),
            deleted,
            timestamp: payload.get("timestamp").filter(|t| !t.is_empty()).cloned(),
        }))
    }
}

/// What the engine did with a push message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Applied(ApplyOutcome),
    FullSyncRequested,
}

/// Supplies this device's push registration id
pub trait PushIdSource: Send + Sync {
    fn push_id(&self) -> Result<String>;
}

/// A push id known up front
pub struct FixedPushId(String);

impl FixedPushId {
    pub fn new(push_id: impl Into<String>) -> Self {
        Self(push_id.into())
    }
}

impl PushIdSource for FixedPushId {
    fn push_id(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Worker thread feeding push messages to the engine
pub struct PushListener;

impl PushListener {
    /// Handle messages until every sender is dropped
    ///
    /// The thread returns the number of messages it handled.
    pub fn spawn(
        engine: Arc<SyncEngine>,
        account: impl Into<String>,
        messages: Receiver<PushMessage>,
    ) -> Result<JoinHandle<usize>> {
        let account = account.into();
        let handle = std::thread::Builder::new()
            .name("push-listener".to_string())
            .spawn(move || {
                info!("Push listener started for {}", account);
                let mut handled = 0;
                for message in messages {
                    match engine.handle_push(&account, message) {
                        Ok(outcome) => debug!("Push handled: {:?}", outcome),
                        Err(e) => warn!("Failed to handle push for {}: {}", account, e),
                    }
                    handled += 1;
                }
                info!("Push listener for {} stopped after {} messages", account, handled);
                handled
            })
            .context("Failed to spawn push listener thread")?;
        Ok(handle)
    }
}
