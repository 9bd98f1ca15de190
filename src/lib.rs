//! # Request Sync
//!
//! Keeps a client's view of a remotely fulfilled request (a ride or a food
//! delivery) in step with the single shared record a driver or dispatcher
//! mutates.
//!
//! ## Core Concepts
//!
//! - **Records**: One record per request in a shared, type-tagged collection
//! - **Subscriptions**: Ordered per-record snapshot feeds with explicit disposal
//! - **Listener**: At most one live subscription, reduced to `{latest, is_loading, is_accepted}`
//! - **Lifecycle**: Scanning countdown, acceptance, timeout-to-retry and cancel
//!
//! ## Example
//!
//! ```ignore
//! use request_sync::{LifecycleConfig, LifecycleController, RequestContext, RequestStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(RequestStore::in_memory());
//! let context = Arc::new(RequestContext::new(order)?);
//!
//! let mut controller = LifecycleController::new(store, context, LifecycleConfig::default())?;
//! let id = controller.start()?;
//!
//! // Feed time and snapshots in, read notices out
//! controller.tick(Duration::from_millis(100));
//! for notice in controller.drain_notices() {
//!     println!("{:?}", notice);
//! }
//! ```

pub mod error;
pub mod kind;
pub mod lifecycle;
pub mod listener;
mod persist;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{Result, SyncError};
pub use kind::{DeliveryMode, FoodItem, KindView, Order, RequestContext, RequestKind};
pub use lifecycle::{
    run_session, CancelOutcome, Countdown, LifecycleConfig, LifecycleController, LifecycleNotice,
    Phase, RetryOutcome, UserAction,
};
pub use listener::{ListenerView, RequestListener};
pub use store::{RecordStore, RequestStore, StoreConfig};
pub use subscriptions::{Snapshot, Subscription, SubscriptionId, SubscriptionManager};
pub use types::*;
