//! Cross-thread call arbitration for blocking automation calls.
//!
//! The XAE shell hosts a visible IDE window and can reject synchronous
//! calls from another apartment while it is busy repainting or loading a
//! solution. Without a filter those calls fail outright; with one, every
//! explicit "retry later" rejection is transparently retried while the
//! blocked thread keeps pumping its default message queue. Hard
//! rejections are never retried, so a dead server cannot hang the
//! workflow — and a retry budget bounds how long a server may keep
//! answering "retry later" before the pending call is cancelled.
//!
//! The active policy is process-wide state: [`register`] installs one,
//! replacing (not chaining) any previous policy, and hands back a
//! [`FilterGuard`] that revokes it on drop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, trace, warn};

/// Raw reject classification carried by a "retry later" rejection on the
/// wire.
const REJECT_RETRY_LATER: u32 = 2;

/// Retry hint returned for a retry-later rejection. The automation
/// contract treats hints in [0,100) as "retry now"; 99 keeps the retry
/// near-immediate without busy-spinning at 0.
const RETRY_HINT: u32 = 99;

// ---------------------------------------------------------------------------
// Call events and decisions
// ---------------------------------------------------------------------------

/// How the server classified a rejected cross-apartment call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    /// The server asked the caller to retry shortly.
    RetryLater,
    /// The call was rejected outright.
    Rejected,
}

impl RejectKind {
    /// Map a raw wire value onto the policy's taxonomy. Anything that is
    /// not an explicit retry-later signal counts as a hard rejection.
    pub fn from_raw(raw: u32) -> Self {
        if raw == REJECT_RETRY_LATER {
            Self::RetryLater
        } else {
            Self::Rejected
        }
    }
}

/// Decision for a call arriving from the server while our own outbound
/// call is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingDecision {
    /// Accept and dispatch the call.
    Handled,
}

/// Decision for one of our outbound calls the server rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given hint. Hints in [0,100) mean "immediately".
    RetryAfter(u32),
    /// Abandon the pending call.
    Cancel,
}

/// Decision while an outbound call is pending and messages queue up on
/// the blocked thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingDecision {
    /// Keep processing the default message queue; do not switch input
    /// focus or cancel.
    WaitDefProcess,
}

// ---------------------------------------------------------------------------
// CallFilter
// ---------------------------------------------------------------------------

/// The call-filtering policy for one automation session.
#[derive(Debug)]
pub struct CallFilter {
    retry_budget: Duration,
}

impl CallFilter {
    pub fn new(retry_budget: Duration) -> Self {
        Self { retry_budget }
    }

    /// Incoming calls from the server are always dispatched; this
    /// workflow never needs to reject the server calling back in.
    pub fn decide_incoming(&self) -> IncomingDecision {
        IncomingDecision::Handled
    }

    /// Retry-later rejections are retried near-immediately until the
    /// call's elapsed time exceeds the retry budget; every other reject
    /// kind cancels the pending call.
    pub fn decide_rejected(&self, elapsed: Duration, kind: RejectKind) -> RetryDecision {
        match kind {
            RejectKind::RetryLater if elapsed <= self.retry_budget => {
                trace!(?elapsed, "server busy; retrying rejected call");
                RetryDecision::RetryAfter(RETRY_HINT)
            }
            RejectKind::RetryLater => {
                warn!(
                    ?elapsed,
                    budget = ?self.retry_budget,
                    "retry budget exhausted; cancelling pending call"
                );
                RetryDecision::Cancel
            }
            RejectKind::Rejected => RetryDecision::Cancel,
        }
    }

    /// While blocked on an outbound call, keep default message
    /// processing running.
    pub fn decide_pending(&self, _elapsed: Duration) -> PendingDecision {
        PendingDecision::WaitDefProcess
    }
}

// ---------------------------------------------------------------------------
// Process-wide registration
// ---------------------------------------------------------------------------

static ACTIVE: Mutex<Option<Arc<CallFilter>>> = Mutex::new(None);

/// Install `filter` as the process-wide call policy, replacing any
/// previously installed one (the previous policy is discarded, not
/// chained).
///
/// On Windows this also registers the policy with the COM runtime for
/// the current apartment; a failure there is logged and tolerated — the
/// workflow proceeds without OS-level arbitration.
///
/// The returned guard revokes the policy when dropped, on every exit
/// path.
#[must_use = "dropping the guard revokes the filter"]
pub fn register(filter: CallFilter) -> FilterGuard {
    let filter = Arc::new(filter);
    let mut slot = ACTIVE.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        debug!("replacing previously installed call filter");
    }
    *slot = Some(Arc::clone(&filter));
    drop(slot);

    #[cfg(windows)]
    if let Err(err) = crate::com::install_message_filter(filter) {
        warn!(%err, "message filter installation failed; continuing without call arbitration");
    }

    FilterGuard { _priv: () }
}

/// Restore the "no filter" state. Idempotent: safe to call when nothing
/// is registered.
pub fn revoke() {
    let mut slot = ACTIVE.lock().unwrap_or_else(PoisonError::into_inner);
    *slot = None;
    drop(slot);

    #[cfg(windows)]
    crate::com::revoke_message_filter();
}

/// The currently installed policy, if any.
pub fn active() -> Option<Arc<CallFilter>> {
    ACTIVE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Scoped ownership of the registered policy.
pub struct FilterGuard {
    _priv: (),
}

impl Drop for FilterGuard {
    fn drop(&mut self) {
        revoke();
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

/// Serializes tests that touch the process-wide slot. Registration is
/// global state, so tests across modules must not interleave.
#[cfg(test)]
pub(crate) fn exclusive_registration() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> CallFilter {
        CallFilter::new(Duration::from_secs(300))
    }

    #[test]
    fn retry_later_yields_hint_below_one_hundred() {
        let decision = filter().decide_rejected(Duration::from_millis(10), RejectKind::RetryLater);
        let RetryDecision::RetryAfter(hint) = decision else {
            panic!("expected RetryAfter, got {decision:?}");
        };
        assert!(hint < 100);
    }

    #[test]
    fn hard_rejection_cancels() {
        let decision = filter().decide_rejected(Duration::from_millis(10), RejectKind::Rejected);
        assert_eq!(decision, RetryDecision::Cancel);
    }

    #[test]
    fn exhausted_budget_cancels_retry_later() {
        let policy = CallFilter::new(Duration::from_secs(1));
        let decision = policy.decide_rejected(Duration::from_secs(2), RejectKind::RetryLater);
        assert_eq!(decision, RetryDecision::Cancel);
    }

    #[test]
    fn incoming_calls_are_always_handled() {
        assert_eq!(filter().decide_incoming(), IncomingDecision::Handled);
    }

    #[test]
    fn pending_calls_wait_with_default_processing() {
        assert_eq!(
            filter().decide_pending(Duration::from_secs(30)),
            PendingDecision::WaitDefProcess
        );
    }

    #[test]
    fn unknown_reject_values_map_to_hard_rejection() {
        assert_eq!(RejectKind::from_raw(2), RejectKind::RetryLater);
        assert_eq!(RejectKind::from_raw(0), RejectKind::Rejected);
        assert_eq!(RejectKind::from_raw(1), RejectKind::Rejected);
        assert_eq!(RejectKind::from_raw(7), RejectKind::Rejected);
    }

    #[test]
    fn double_register_replaces_without_panic() {
        let _lock = exclusive_registration();

        let first = register(CallFilter::new(Duration::from_secs(1)));
        let installed_first = active().expect("first filter installed");
        let second = register(CallFilter::new(Duration::from_secs(2)));
        let installed_second = active().expect("second filter installed");
        assert!(!Arc::ptr_eq(&installed_first, &installed_second));

        drop(second);
        drop(first);
        assert!(active().is_none());
    }

    #[test]
    fn revoke_without_register_is_a_no_op() {
        let _lock = exclusive_registration();

        revoke();
        revoke();
        assert!(active().is_none());
    }

    #[test]
    fn guard_drop_clears_the_slot() {
        let _lock = exclusive_registration();

        let guard = register(filter());
        assert!(active().is_some());
        drop(guard);
        assert!(active().is_none());
    }
}
