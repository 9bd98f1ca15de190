//! Client-side request lifecycle.
//!
//! A [`LifecycleController`] tracks one request from the moment an id is
//! known until it is accepted, cancelled, or times out. It is driven by three
//! kinds of events only:
//! - snapshots from its [`RequestListener`](crate::listener::RequestListener)
//! - countdown ticks ([`LifecycleController::tick`])
//! - user actions ([`LifecycleController::retry`], [`LifecycleController::cancel`])
//!
//! [`run_session`] wires those into a single-threaded `select!` loop.

mod controller;
mod countdown;
mod session;

pub use controller::{CancelOutcome, LifecycleController, RetryOutcome};
pub use countdown::Countdown;
pub use session::{run_session, UserAction};

use crate::error::{Result, SyncError};
use crate::types::{RequestId, RequestRecord};
use std::time::Duration;

/// Lifecycle timing configuration.
#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    /// How long to scan for a driver before offering a retry.
    /// Default: 30s
    pub scan_duration: Duration,

    /// Countdown tick period used by [`run_session`].
    /// Default: 100ms
    pub tick_interval: Duration,

    /// Progress value reached when the scan ends.
    /// Default: 100
    pub max_progress: u32,

    /// Delay between observing acceptance and reporting it, so the accepted
    /// state can render first.
    /// Default: 500ms
    pub accept_grace: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(30),
            tick_interval: Duration::from_millis(100),
            max_progress: 100,
            accept_grace: Duration::from_millis(500),
        }
    }
}

impl LifecycleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scan_duration.is_zero() {
            return Err(SyncError::InvalidConfig("scan_duration must be positive".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(SyncError::InvalidConfig("tick_interval must be positive".into()));
        }
        if self.tick_interval > self.scan_duration {
            return Err(SyncError::InvalidConfig(format!(
                "tick_interval {:?} exceeds scan_duration {:?}",
                self.tick_interval, self.scan_duration
            )));
        }
        if self.max_progress == 0 {
            return Err(SyncError::InvalidConfig("max_progress must be positive".into()));
        }
        Ok(())
    }
}

/// Local lifecycle phase, independent of the record's remote status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Scanning,
    Accepted,
    TimedOut,
    Cancelled,
}

impl Phase {
    /// `Accepted` and `Cancelled` end a controller; a timeout can be retried.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Accepted | Phase::Cancelled)
    }
}

/// Transitions reported to the presentation layer.
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleNotice {
    /// Scanning started (first request or retry).
    Scanning { request_id: RequestId },
    /// A driver accepted; emitted after the grace period.
    Accepted { record: RequestRecord },
    /// No acceptance within the scan window; retry is available.
    TimedOut { request_id: RequestId },
    /// The user cancelled. `remote_confirmed` is false when the status write
    /// did not reach the store.
    Cancelled {
        request_id: RequestId,
        remote_confirmed: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LifecycleConfig::default();
        config.validate().unwrap();
        assert_eq!(config.accept_grace, Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_bad_config() {
        let zero_scan = LifecycleConfig {
            scan_duration: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(zero_scan.validate(), Err(SyncError::InvalidConfig(_))));

        let slow_tick = LifecycleConfig {
            scan_duration: Duration::from_secs(1),
            tick_interval: Duration::from_secs(2),
            ..Default::default()
        };
        assert!(slow_tick.validate().is_err());

        let no_progress = LifecycleConfig {
            max_progress: 0,
            ..Default::default()
        };
        assert!(no_progress.validate().is_err());
    }

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Accepted.is_terminal());
        assert!(Phase::Cancelled.is_terminal());
        assert!(!Phase::TimedOut.is_terminal());
        assert!(!Phase::Scanning.is_terminal());
        assert!(!Phase::Idle.is_terminal());
    }
}
