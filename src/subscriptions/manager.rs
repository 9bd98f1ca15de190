//! Subscription manager for broadcasting record snapshots.

use crate::types::{RequestId, RequestRecord};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::types::{Snapshot, Subscription, SubscriptionId};

/// Internal subscription state.
struct Entry {
    request_id: RequestId,
    sender: Sender<Snapshot>,
    /// Sequence number of the next snapshot to deliver.
    next_sequence: u64,
}

impl Entry {
    /// Try to send a snapshot. Returns false if the receiving end is gone.
    fn send(&mut self, record: Option<RequestRecord>) -> bool {
        let snapshot = Snapshot {
            request_id: self.request_id.clone(),
            sequence: self.next_sequence,
            record,
        };
        self.next_sequence += 1;
        self.sender.send(snapshot).is_ok()
    }
}

/// Manages per-request subscriptions and fans out snapshots.
///
/// Callers must serialize `subscribe` and `broadcast` for the same request
/// against writes to that request; the store does this by holding its record
/// lock across both.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Entry>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscription for one request and deliver its initial state.
    pub fn subscribe(
        self: &Arc<Self>,
        request_id: RequestId,
        initial: Option<RequestRecord>,
    ) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = unbounded();

        let mut entry = Entry {
            request_id: request_id.clone(),
            sender,
            next_sequence: 0,
        };
        // Receiver is held locally, so the initial send cannot fail.
        entry.send(initial);

        self.subscriptions.write().insert(id, entry);
        debug!(subscription = id.0, request = %request_id, "subscribed");

        Subscription {
            id,
            request_id,
            receiver: Some(receiver),
            registry: Arc::downgrade(self),
        }
    }

    /// Unsubscribe and clean up. Returns false for unknown ids.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscriptions.write().remove(&id).is_some();
        if removed {
            debug!(subscription = id.0, "unsubscribed");
        }
        removed
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Number of live subscriptions bound to one request.
    pub fn subscribers_for(&self, request_id: &RequestId) -> usize {
        self.subscriptions
            .read()
            .values()
            .filter(|entry| &entry.request_id == request_id)
            .count()
    }

    /// Deliver the new state of a request to every subscription bound to it.
    /// Drops subscriptions whose receiver has gone away.
    pub fn broadcast(&self, request_id: &RequestId, record: Option<&RequestRecord>) {
        let mut subs = self.subscriptions.write();
        let mut to_remove = Vec::new();

        for (id, entry) in subs.iter_mut() {
            if &entry.request_id == request_id && !entry.send(record.cloned()) {
                to_remove.push(*id);
            }
        }

        for id in to_remove {
            subs.remove(&id);
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::RequestKind;
    use crate::types::{Place, RequestStatus, Timestamp, UserId};
    use std::time::Duration;

    fn make_test_record(id: &str, status: RequestStatus) -> RequestRecord {
        RequestRecord {
            id: RequestId::new(id),
            kind: RequestKind::Ride,
            status,
            pickup: Place::new("A", 0.0, 0.0),
            destination: Place::new("B", 0.0, 1.0),
            stops: vec![],
            vehicle_or_mode: "sedan".into(),
            price: 9.0,
            user_id: UserId::new("u1"),
            user_name: "Sam".into(),
            driver_id: None,
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = Arc::new(SubscriptionManager::new());

        let mut handle = manager.subscribe(RequestId::new("r1"), None);
        assert_eq!(manager.subscription_count(), 1);

        assert!(handle.dispose());
        assert_eq!(manager.subscription_count(), 0);
        assert!(!handle.dispose());
    }

    #[test]
    fn test_initial_snapshot_delivered() {
        let manager = Arc::new(SubscriptionManager::new());
        let record = make_test_record("r1", RequestStatus::Pending);

        let handle = manager.subscribe(RequestId::new("r1"), Some(record.clone()));
        let snapshot = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(snapshot.sequence, 0);
        assert_eq!(snapshot.record, Some(record));
    }

    #[test]
    fn test_broadcast_to_matching() {
        let manager = Arc::new(SubscriptionManager::new());
        let r1 = manager.subscribe(RequestId::new("r1"), None);
        let r2 = manager.subscribe(RequestId::new("r2"), None);
        r1.try_recv().unwrap();
        r2.try_recv().unwrap();

        let record = make_test_record("r1", RequestStatus::Accepted);
        manager.broadcast(&record.id, Some(&record));

        let snapshot = r1.try_recv().unwrap();
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.record.unwrap().status, RequestStatus::Accepted);
        assert!(r2.try_recv().is_none());
    }

    #[test]
    fn test_no_delivery_after_dispose() {
        let manager = Arc::new(SubscriptionManager::new());
        let mut handle = manager.subscribe(RequestId::new("r1"), None);

        let record = make_test_record("r1", RequestStatus::Pending);
        manager.broadcast(&record.id, Some(&record));
        handle.dispose();
        manager.broadcast(&record.id, Some(&record));

        assert!(handle.try_recv().is_none());
        assert!(handle.recv_timeout(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_dropped_handle_unregisters() {
        let manager = Arc::new(SubscriptionManager::new());
        {
            let _handle = manager.subscribe(RequestId::new("r1"), None);
            assert_eq!(manager.subscribers_for(&RequestId::new("r1")), 1);
        }
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_dispose_after_manager_gone() {
        let manager = Arc::new(SubscriptionManager::new());
        let mut handle = manager.subscribe(RequestId::new("r1"), None);
        drop(manager);
        assert!(handle.dispose());
        assert!(!handle.is_active());
    }
}
