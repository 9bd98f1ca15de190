//! Unified request listener.
//!
//! Owns zero or one live subscription and reduces its snapshots to the
//! `{latest, is_loading, is_accepted}` view the UI reads. Changing the
//! target id replaces the single owned slot, which disposes the previous
//! subscription before the new one is opened.

use crate::store::RecordStore;
use crate::subscriptions::{Snapshot, Subscription};
use crate::types::{is_accepted, RequestId, RequestRecord};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use tracing::{debug, trace};

/// Point-in-time copy of the listener state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListenerView {
    pub latest: Option<RequestRecord>,
    pub is_loading: bool,
    pub is_accepted: bool,
}

/// The one live subscription plus what it has delivered so far.
struct Bound {
    subscription: Subscription,
    latest: Option<RequestRecord>,
    loaded: bool,
}

impl Bound {
    fn apply(&mut self, snapshot: Snapshot) {
        trace!(
            request = %snapshot.request_id,
            sequence = snapshot.sequence,
            absent = snapshot.is_absent(),
            "snapshot"
        );
        self.latest = snapshot.record;
        self.loaded = true;
    }
}

/// Follows at most one request record through a single owned subscription.
pub struct RequestListener<S: RecordStore + ?Sized> {
    store: Arc<S>,
    bound: Option<Bound>,
}

impl<S: RecordStore + ?Sized> RequestListener<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, bound: None }
    }

    /// Bind to `id`, or to nothing. Returns false if already bound to it.
    pub fn open(&mut self, id: Option<RequestId>) -> bool {
        if self.request_id() == id.as_ref() {
            return false;
        }

        self.close();
        self.bound = id.map(|id| {
            debug!(request = %id, "listener bound");
            Bound {
                subscription: self.store.subscribe(&id),
                latest: None,
                loaded: false,
            }
        });
        true
    }

    /// Dispose the current subscription. No-op when nothing is bound.
    pub fn close(&mut self) -> bool {
        match self.bound.take() {
            Some(mut bound) => {
                debug!(request = %bound.subscription.request_id(), "listener closed");
                bound.subscription.dispose()
            }
            None => false,
        }
    }

    /// Apply every snapshot already delivered, in order.
    pub fn poll(&mut self) -> usize {
        let Some(bound) = self.bound.as_mut() else {
            return 0;
        };

        let mut applied = 0;
        while let Some(snapshot) = bound.subscription.try_recv() {
            bound.apply(snapshot);
            applied += 1;
        }
        applied
    }

    /// Apply a snapshot received through [`RequestListener::receiver`].
    /// Snapshots for any other id are dropped.
    pub fn apply(&mut self, snapshot: Snapshot) -> bool {
        match self.bound.as_mut() {
            Some(bound) if bound.subscription.request_id() == &snapshot.request_id => {
                bound.apply(snapshot);
                true
            }
            _ => false,
        }
    }

    /// Channel of the bound subscription, for `select!`-style loops.
    pub fn receiver(&self) -> Option<&Receiver<Snapshot>> {
        self.bound.as_ref()?.subscription.receiver()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.bound
            .as_ref()
            .map(|bound| bound.subscription.request_id())
    }

    pub fn latest(&self) -> Option<&RequestRecord> {
        self.bound.as_ref()?.latest.as_ref()
    }

    /// Bound, but nothing delivered yet.
    pub fn is_loading(&self) -> bool {
        self.bound.as_ref().is_some_and(|bound| !bound.loaded)
    }

    /// Acceptance predicate over the latest snapshot only.
    pub fn is_accepted(&self) -> bool {
        is_accepted(self.latest())
    }

    pub fn view(&self) -> ListenerView {
        ListenerView {
            latest: self.latest().cloned(),
            is_loading: self.is_loading(),
            is_accepted: self.is_accepted(),
        }
    }
}

impl<S: RecordStore + ?Sized> Drop for RequestListener<S> {
    fn drop(&mut self) {
        self.close();
    }
}
