//! Request lifecycle state machine.

use crate::error::{Result, SyncError};
use crate::kind::RequestContext;
use crate::listener::{ListenerView, RequestListener};
use crate::store::RecordStore;
use crate::subscriptions::Snapshot;
use crate::types::{RequestId, RequestRecord, RequestStatus};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::countdown::Countdown;
use super::{LifecycleConfig, LifecycleNotice, Phase};

/// Result of a user retry.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryOutcome {
    /// Not timed out (or already retried); nothing was created.
    Ignored,
    /// A new request was created and the listener rebound to it.
    Rebound(RequestId),
}

/// Result of a user cancel.
#[derive(Clone, Debug, PartialEq)]
pub enum CancelOutcome {
    /// Already accepted or cancelled; nothing was written.
    Ignored,
    Cancelled {
        request_id: RequestId,
        remote_confirmed: bool,
    },
}

/// Accepted record waiting for the grace period before it is reported.
struct PendingAccept {
    remaining: Duration,
    record: RequestRecord,
}

/// Drives one request through `Idle -> Scanning -> {Accepted, TimedOut,
/// Cancelled}`.
///
/// All methods take `&mut self`, so at most one create or status write is
/// outstanding per controller.
pub struct LifecycleController<S: RecordStore + ?Sized> {
    store: Arc<S>,
    context: Arc<RequestContext>,
    config: LifecycleConfig,
    listener: RequestListener<S>,
    phase: Phase,
    countdown: Option<Countdown>,
    progress: u32,
    /// Last id this controller created or resumed.
    known_id: Option<RequestId>,
    pending_accept: Option<PendingAccept>,
    notices: Vec<LifecycleNotice>,
}

impl<S: RecordStore + ?Sized> LifecycleController<S> {
    pub fn new(store: Arc<S>, context: Arc<RequestContext>, config: LifecycleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            listener: RequestListener::new(Arc::clone(&store)),
            store,
            context,
            config,
            phase: Phase::Idle,
            countdown: None,
            progress: 0,
            known_id: None,
            pending_accept: None,
            notices: Vec::new(),
        })
    }

    // --- Entering Scanning ---

    /// Create the request from the context and start scanning.
    ///
    /// On a failed create the controller stays `Idle`.
    pub fn start(&mut self) -> Result<RequestId> {
        self.expect_idle("start")?;
        let id = self.store.create(self.context.input()?)?;
        self.begin_scan(id.clone());
        Ok(id)
    }

    /// Start scanning an already created request.
    ///
    /// A record that is already `completed` or `cancelled` is rejected with
    /// `InvalidOperation` and the controller stays `Idle`. An absent record
    /// is scanned like any other.
    pub fn resume(&mut self, id: RequestId) -> Result<()> {
        self.expect_idle("resume")?;

        self.listener.open(Some(id.clone()));
        self.listener.poll();
        if let Some(status) = self.listener.latest().map(|record| record.status) {
            if status.is_terminal() {
                self.listener.close();
                return Err(SyncError::InvalidOperation(format!(
                    "cannot resume request {} in status {}",
                    id, status
                )));
            }
        }

        self.begin_scan(id);
        Ok(())
    }

    /// Resume the user's most recent active request, if there is one.
    pub fn recover(&mut self) -> Result<Option<RequestId>> {
        self.expect_idle("recover")?;
        let found = self.store.find_active_request(self.context.user_id())?;
        if let Some(id) = &found {
            info!(request = %id, "recovered active request");
            self.begin_scan(id.clone());
        }
        Ok(found)
    }

    fn expect_idle(&self, operation: &str) -> Result<()> {
        if self.phase != Phase::Idle {
            return Err(SyncError::InvalidOperation(format!(
                "cannot {} in phase {:?}",
                operation, self.phase
            )));
        }
        Ok(())
    }

    fn begin_scan(&mut self, id: RequestId) {
        self.listener.open(Some(id.clone()));
        self.known_id = Some(id.clone());
        self.countdown = Some(Countdown::new(self.config.scan_duration, self.config.max_progress));
        self.progress = 0;
        self.phase = Phase::Scanning;
        info!(request = %id, "scanning for driver");
        self.notices.push(LifecycleNotice::Scanning { request_id: id });

        // The initial snapshot may already show acceptance, and it may have
        // been applied before the scan began.
        self.listener.poll();
        self.observe();
    }

    // --- Events ---

    /// Apply every snapshot the listener has received.
    pub fn pump(&mut self) {
        if self.listener.poll() > 0 {
            self.observe();
        }
    }

    /// Apply one snapshot taken from [`LifecycleController::snapshot_receiver`].
    pub fn on_snapshot(&mut self, snapshot: Snapshot) {
        if self.listener.apply(snapshot) {
            self.observe();
        }
    }

    /// Advance time. Pending snapshots are applied first, so an acceptance
    /// that arrived before this tick always wins over the timeout.
    pub fn tick(&mut self, elapsed: Duration) {
        self.pump();

        match self.phase {
            Phase::Scanning => {
                let Some(countdown) = self.countdown.as_mut() else {
                    return;
                };
                self.progress = countdown.advance(elapsed);
                if countdown.is_expired() {
                    self.time_out();
                }
            }
            Phase::Accepted => self.advance_grace(elapsed),
            Phase::Idle | Phase::TimedOut | Phase::Cancelled => {}
        }
    }

    fn observe(&mut self) {
        if self.phase != Phase::Scanning {
            return;
        }

        if self.listener.is_accepted() {
            let Some(record) = self.listener.latest().cloned() else {
                return;
            };
            // Preempt the countdown before any delay is introduced.
            self.countdown = None;
            self.progress = self.config.max_progress;
            self.phase = Phase::Accepted;
            info!(request = %record.id, driver = ?record.driver_id, "request accepted");

            self.pending_accept = Some(PendingAccept {
                remaining: self.config.accept_grace,
                record,
            });
            self.advance_grace(Duration::ZERO);
        } else if let Some(record) = self.listener.latest() {
            if record.status.is_terminal() {
                debug!(request = %record.id, status = %record.status, "remote terminal status while scanning");
            }
        }
    }

    fn advance_grace(&mut self, elapsed: Duration) {
        let Some(pending) = self.pending_accept.as_mut() else {
            return;
        };
        pending.remaining = pending.remaining.saturating_sub(elapsed);
        if !pending.remaining.is_zero() {
            return;
        }

        if let Some(pending) = self.pending_accept.take() {
            self.notices.push(LifecycleNotice::Accepted {
                record: pending.record,
            });
        }
        self.listener.close();
    }

    fn time_out(&mut self) {
        self.countdown = None;
        self.progress = self.config.max_progress;
        self.phase = Phase::TimedOut;

        let Some(id) = self.listener.request_id().cloned() else {
            return;
        };
        info!(request = %id, "scan timed out");
        self.notices.push(LifecycleNotice::TimedOut { request_id: id });
    }

    // --- User actions ---

    /// Re-request after a timeout with the same order.
    ///
    /// Ignored unless timed out, so a second retry issued after the first
    /// succeeded creates nothing. On a failed create the controller stays
    /// `TimedOut` and the error is returned.
    pub fn retry(&mut self) -> Result<RetryOutcome> {
        if self.phase != Phase::TimedOut {
            debug!(phase = ?self.phase, "retry ignored");
            return Ok(RetryOutcome::Ignored);
        }

        let input = self.context.input()?;
        let id = match self.store.create(input) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "retry create failed");
                return Err(e);
            }
        };

        // Rebinding disposes the timed-out request's subscription.
        self.begin_scan(id.clone());
        Ok(RetryOutcome::Rebound(id))
    }

    /// Cancel the request.
    ///
    /// Target precedence: bound id, then the last id this controller knew,
    /// then the store's active request for the user. The local phase becomes
    /// `Cancelled` even when the status write fails.
    pub fn cancel(&mut self) -> Result<CancelOutcome> {
        if self.phase.is_terminal() {
            debug!(phase = ?self.phase, "cancel ignored");
            return Ok(CancelOutcome::Ignored);
        }

        let Some(id) = self.resolve_cancel_target() else {
            warn!(user = %self.context.user_id(), "cancel aborted: no request id");
            return Err(SyncError::UnresolvedTarget);
        };

        let remote_confirmed = match self.store.update_status(&id, RequestStatus::Cancelled) {
            Ok(()) => true,
            Err(e) => {
                warn!(request = %id, error = %e, "cancel write failed");
                false
            }
        };

        self.countdown = None;
        self.pending_accept = None;
        self.listener.close();
        self.known_id = Some(id.clone());
        self.phase = Phase::Cancelled;
        info!(request = %id, remote_confirmed, "request cancelled");

        self.notices.push(LifecycleNotice::Cancelled {
            request_id: id.clone(),
            remote_confirmed,
        });
        Ok(CancelOutcome::Cancelled {
            request_id: id,
            remote_confirmed,
        })
    }

    fn resolve_cancel_target(&self) -> Option<RequestId> {
        if let Some(id) = self.listener.request_id() {
            return Some(id.clone());
        }
        if let Some(id) = &self.known_id {
            return Some(id.clone());
        }
        match self.store.find_active_request(self.context.user_id()) {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "active request lookup failed");
                None
            }
        }
    }

    // --- Observation ---

    /// Take the notices produced since the last call.
    pub fn drain_notices(&mut self) -> Vec<LifecycleNotice> {
        std::mem::take(&mut self.notices)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn max_progress(&self) -> u32 {
        self.config.max_progress
    }

    /// Whether the retry affordance should be shown.
    pub fn can_retry(&self) -> bool {
        self.phase == Phase::TimedOut
    }

    /// Terminal and nothing left to report.
    pub fn is_settled(&self) -> bool {
        self.phase.is_terminal() && self.pending_accept.is_none() && self.notices.is_empty()
    }

    /// Id the listener is bound to.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.listener.request_id()
    }

    pub fn known_request_id(&self) -> Option<&RequestId> {
        self.known_id.as_ref()
    }

    pub fn view(&self) -> ListenerView {
        self.listener.view()
    }

    pub fn snapshot_receiver(&self) -> Option<&Receiver<Snapshot>> {
        self.listener.receiver()
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }
}
