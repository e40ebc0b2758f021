//! Requests for sync passes
//!
//! The engine never runs a pass on its own initiative; it asks a scheduler,
//! which owns retry policy and backoff.

use std::sync::mpsc::{self, Receiver, Sender};

use log::{debug, warn};

use super::engine::SyncRequest;

/// Something that runs sync passes on request
pub trait SyncScheduler: Send + Sync {
    fn request_sync(&self, request: SyncRequest);
}

/// Delivers requests over a channel to whoever runs the passes
pub struct ChannelScheduler {
    sender: Sender<SyncRequest>,
}

impl ChannelScheduler {
    pub fn new() -> (Self, Receiver<SyncRequest>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl SyncScheduler for ChannelScheduler {
    fn request_sync(&self, request: SyncRequest) {
        debug!(
            "Requesting {} sync for {}",
            if request.upload_only { "upload-only" } else { "full" },
            request.account
        );
        if self.sender.send(request).is_err() {
            warn!("Sync request dropped: no one is receiving");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_arrive_in_order() {
        let (scheduler, receiver) = ChannelScheduler::new();
        scheduler.request_sync(SyncRequest::upload_only("me@example.com"));
        scheduler.request_sync(SyncRequest::full("me@example.com"));

        let received: Vec<_> = receiver.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert!(received[0].upload_only);
        assert!(!received[1].upload_only);
    }

    #[test]
    fn test_closed_receiver_does_not_panic() {
        let (scheduler, receiver) = ChannelScheduler::new();
        drop(receiver);
        scheduler.request_sync(SyncRequest::full("me@example.com"));
    }
}
