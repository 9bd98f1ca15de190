//! Subscription system for live record updates.
//!
//! Each subscription is bound to exactly one request id. It receives the
//! record's state at subscribe time (possibly absent) and then every change
//! the store commits, in commit order.
//!
//! # Example
//!
//! ```ignore
//! let mut subscription = store.subscribe(&request_id);
//!
//! while let Ok(snapshot) = subscription.recv_timeout(Duration::from_secs(1)) {
//!     match snapshot.record {
//!         Some(record) if record.is_accepted() => break,
//!         Some(record) => println!("status: {}", record.status),
//!         None => println!("no record yet"),
//!     }
//! }
//!
//! subscription.dispose();
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{Snapshot, Subscription, SubscriptionId};
