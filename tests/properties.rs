//! Property tests for acceptance, countdown and subscription invariants.

use proptest::prelude::*;
use request_sync::{
    is_accepted, Countdown, DispatchUpdate, LifecycleConfig, LifecycleController, Order, Phase,
    Place, RecordStore, RequestContext, RequestId, RequestInput, RequestKind, RequestListener,
    RequestRecord, RequestStatus, RequestStore, Subscription, Timestamp, UserId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn status_strategy() -> impl Strategy<Value = RequestStatus> {
    prop::sample::select(RequestStatus::ALL.to_vec())
}

fn order() -> Order {
    Order {
        pickup: Place::new("A", 0.0, 0.0),
        destination: Place::new("B", 0.0, 1.0),
        stops: vec![],
        vehicle_or_mode: "sedan".into(),
        price: 10.0,
        user_id: UserId::new("u1"),
        user_name: "Sam".into(),
        kind: RequestKind::Ride,
    }
}

fn record(status: RequestStatus, driver_id: Option<String>) -> RequestRecord {
    let mut record = order()
        .to_input()
        .unwrap()
        .into_record(request_sync::RequestId::new("r1"), Timestamp(0));
    record.status = status;
    record.driver_id = driver_id;
    record
}

/// Records how many subscriptions were still live each time a new one opened.
#[derive(Default)]
struct OpenOrderStore {
    inner: RequestStore,
    opened: AtomicUsize,
    opened_while_live: AtomicUsize,
}

impl RecordStore for OpenOrderStore {
    fn create(&self, input: RequestInput) -> request_sync::Result<RequestId> {
        self.inner.create(input)
    }

    fn subscribe(&self, id: &RequestId) -> Subscription {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.inner.subscription_count() != 0 {
            self.opened_while_live.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.subscribe(id)
    }

    fn update_status(&self, id: &RequestId, status: RequestStatus) -> request_sync::Result<()> {
        self.inner.update_status(id, status)
    }

    fn find_active_request(&self, user_id: &UserId) -> request_sync::Result<Option<RequestId>> {
        self.inner.find_active_request(user_id)
    }
}

proptest! {
    #[test]
    fn prop_no_driver_never_accepted(status in status_strategy()) {
        prop_assert!(!record(status, None).is_accepted());
    }

    #[test]
    fn prop_acceptance_is_conjunction(status in status_strategy(), driver in "[a-z0-9]{1,8}") {
        let accepted = record(status, Some(driver)).is_accepted();
        prop_assert_eq!(accepted, status == RequestStatus::Accepted);
    }

    #[test]
    fn prop_countdown_reaches_max_exactly_at_deadline(
        duration_ms in 100u64..5_000,
        tick_ms in 1u64..100,
        max in 1u32..1_000,
    ) {
        let duration = Duration::from_millis(duration_ms);
        let tick = Duration::from_millis(tick_ms);
        let mut countdown = Countdown::new(duration, max);

        let mut previous = 0;
        while !countdown.is_expired() {
            let progress = countdown.advance(tick);
            prop_assert!(progress >= previous);
            prop_assert!(progress <= max);
            previous = progress;
        }
        prop_assert!(countdown.elapsed() >= duration);
        prop_assert_eq!(countdown.progress(), max);
    }

    #[test]
    fn prop_controller_times_out_at_or_after_duration(
        duration_ms in 200u64..3_000,
        tick_ms in 10u64..200,
    ) {
        let store = Arc::new(RequestStore::in_memory());
        let context = Arc::new(RequestContext::new(order()).unwrap());
        let config = LifecycleConfig {
            scan_duration: Duration::from_millis(duration_ms),
            tick_interval: Duration::from_millis(tick_ms),
            max_progress: 100,
            accept_grace: Duration::from_millis(500),
        };
        let mut controller = LifecycleController::new(store, context, config).unwrap();
        controller.start().unwrap();

        let mut elapsed = 0;
        while controller.phase() == Phase::Scanning {
            prop_assert!(elapsed < duration_ms);
            controller.tick(Duration::from_millis(tick_ms));
            elapsed += tick_ms;
        }
        prop_assert_eq!(controller.phase(), Phase::TimedOut);
        prop_assert!(elapsed >= duration_ms);
        prop_assert_eq!(controller.progress(), 100);
    }

    #[test]
    fn prop_listener_holds_at_most_one_subscription(
        ops in prop::collection::vec((0usize..4, any::<bool>()), 1..40),
    ) {
        let store = Arc::new(RequestStore::in_memory());
        let ids: Vec<_> = (0..4)
            .map(|_| store.create(order().to_input().unwrap()).unwrap())
            .collect();
        let mut listener = RequestListener::new(Arc::clone(&store));

        for (index, close) in ops {
            if close {
                listener.open(None);
            } else {
                listener.open(Some(ids[index].clone()));
                store
                    .dispatch_update(&ids[index], DispatchUpdate::status(RequestStatus::Pending))
                    .unwrap();
            }
            listener.poll();

            prop_assert!(store.subscription_count() <= 1);
            if let Some(bound) = listener.request_id() {
                prop_assert_eq!(store.subscribers_for(bound), 1);
                if let Some(latest) = listener.latest() {
                    prop_assert_eq!(&latest.id, bound);
                }
            }
            prop_assert_eq!(listener.is_accepted(), is_accepted(listener.latest()));
        }
    }

    #[test]
    fn prop_previous_subscription_disposed_before_next_opens(
        targets in prop::collection::vec(prop::option::of(0usize..3), 1..30),
    ) {
        let store = Arc::new(OpenOrderStore::default());
        let ids: Vec<_> = (0..3)
            .map(|_| store.create(order().to_input().unwrap()).unwrap())
            .collect();
        let mut listener = RequestListener::new(Arc::clone(&store));

        let mut expected_opens = 0;
        let mut bound: Option<usize> = None;
        for target in targets {
            let changed = listener.open(target.map(|index| ids[index].clone()));
            prop_assert_eq!(changed, target != bound);
            if changed && target.is_some() {
                expected_opens += 1;
            }
            bound = target;
        }
        drop(listener);

        prop_assert_eq!(store.opened.load(Ordering::SeqCst), expected_opens);
        prop_assert_eq!(store.opened_while_live.load(Ordering::SeqCst), 0);
        prop_assert_eq!(store.inner.subscription_count(), 0);
    }
}
