//! Subscription types for live record updates.

use crate::types::{RequestId, RequestRecord};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Weak;
use std::time::Duration;

use super::manager::SubscriptionManager;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// State of one request record as observed by a subscription.
///
/// `record` is `None` when the record does not exist (yet, or any more).
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub request_id: RequestId,
    /// Delivery position within the subscription, starting at 0 for the
    /// initial state.
    pub sequence: u64,
    pub record: Option<RequestRecord>,
}

impl Snapshot {
    pub fn is_absent(&self) -> bool {
        self.record.is_none()
    }
}

/// Handle to a live subscription. Also its disposer.
///
/// Once [`Subscription::dispose`] returns (or the handle is dropped) no
/// further snapshot can be observed through it.
pub struct Subscription {
    pub(super) id: SubscriptionId,
    pub(super) request_id: RequestId,
    pub(super) receiver: Option<Receiver<Snapshot>>,
    pub(super) registry: Weak<SubscriptionManager>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Whether the subscription has not been disposed yet.
    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Channel end for callers that multiplex with `select!`.
    pub fn receiver(&self) -> Option<&Receiver<Snapshot>> {
        self.receiver.as_ref()
    }

    /// Next pending snapshot, if any (non-blocking).
    pub fn try_recv(&self) -> Option<Snapshot> {
        self.receiver.as_ref()?.try_recv().ok()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Snapshot, RecvTimeoutError> {
        match &self.receiver {
            Some(receiver) => receiver.recv_timeout(timeout),
            None => Err(RecvTimeoutError::Disconnected),
        }
    }

    /// Tear down the subscription. Returns false if it was already disposed.
    pub fn dispose(&mut self) -> bool {
        let Some(receiver) = self.receiver.take() else {
            return false;
        };
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
        // Anything still queued was sent before unsubscribe and is discarded.
        drop(receiver);
        true
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("request_id", &self.request_id)
            .field("active", &self.is_active())
            .finish()
    }
}
