//! Single-threaded event loop around a controller.

use crate::store::RecordStore;
use crate::types::RequestId;
use crossbeam_channel::{never, select, tick, Receiver, Sender};
use std::time::Instant;
use tracing::{debug, warn};

use super::controller::LifecycleController;
use super::{LifecycleNotice, Phase};

/// User input forwarded from the presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserAction {
    Retry,
    Cancel,
    /// Stop the loop without touching the request.
    Shutdown,
}

/// Run `controller` until it settles, the user shuts it down, or the action
/// channel disconnects. Returns the final phase.
///
/// Snapshots, countdown ticks and user actions are handled one at a time on
/// the calling thread. The ticker is owned by this call and dropped on
/// return.
pub fn run_session<S: RecordStore + ?Sized>(
    controller: &mut LifecycleController<S>,
    actions: &Receiver<UserAction>,
    notices: &Sender<LifecycleNotice>,
) -> Phase {
    let ticker = tick(controller.config().tick_interval);
    let mut last_tick = Instant::now();
    // Subscription whose channel reported disconnect; skip it until rebound.
    let mut dead_feed: Option<RequestId> = None;

    loop {
        forward(controller, notices);
        if controller.is_settled() {
            return controller.phase();
        }

        let feed_is_dead = dead_feed.is_some() && dead_feed.as_ref() == controller.request_id();
        let snapshots = match controller.snapshot_receiver() {
            Some(receiver) if !feed_is_dead => receiver.clone(),
            _ => never(),
        };

        select! {
            recv(snapshots) -> snapshot => match snapshot {
                Ok(snapshot) => controller.on_snapshot(snapshot),
                Err(_) => {
                    debug!(request = ?controller.request_id(), "snapshot feed disconnected");
                    dead_feed = controller.request_id().cloned();
                }
            },
            recv(ticker) -> at => {
                let now = at.unwrap_or_else(|_| Instant::now());
                controller.tick(now.saturating_duration_since(last_tick));
                last_tick = now;
            },
            recv(actions) -> action => match action {
                Ok(UserAction::Retry) => {
                    if let Err(e) = controller.retry() {
                        warn!(error = %e, "retry failed");
                    }
                }
                Ok(UserAction::Cancel) => {
                    if let Err(e) = controller.cancel() {
                        warn!(error = %e, "cancel failed");
                    }
                }
                Ok(UserAction::Shutdown) | Err(_) => {
                    forward(controller, notices);
                    return controller.phase();
                }
            },
        }
    }
}

fn forward<S: RecordStore + ?Sized>(
    controller: &mut LifecycleController<S>,
    notices: &Sender<LifecycleNotice>,
) {
    for notice in controller.drain_notices() {
        // The UI may have stopped listening; the controller state is still
        // authoritative.
        let _ = notices.send(notice);
    }
}
