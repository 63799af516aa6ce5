use std::ops::ControlFlow;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::Reason;

/// Advisory call budget reported by a remote server.
///
/// `remaining` is the number of calls the server last said we could make,
/// `reset_at` the wall-clock millisecond at which it will be replenished.
/// Neither is a guarantee: the server may still reject a request, and a
/// fresh rejection always wins over what is recorded here.
#[derive(Debug)]
pub struct Quota {
    remaining: AtomicI64,
    reset_at: AtomicU64,
}

/// Authoritative values taken from a successful response.
///
/// Absent fields leave the corresponding quota value untouched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QuotaHint {
    /// Calls left in the current window.
    pub remaining: Option<i64>,
    /// Epoch millisecond at which the window resets.
    pub reset_at_ms: Option<u64>,
}

impl QuotaHint {
    /// True when the response carried no usable hint at all.
    pub fn is_empty(&self) -> bool {
        self.remaining.is_none() && self.reset_at_ms.is_none()
    }
}

/// Point-in-time copy of a [`Quota`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    /// Calls left; negative after local failures.
    pub remaining: i64,
    /// Epoch millisecond of the next reset, or 0 if none was reported.
    pub reset_at_ms: u64,
}

impl Default for Quota {
    fn default() -> Self {
        Self::new()
    }
}

impl Quota {
    /// A quota with no server information yet. It never throttles until a
    /// hint with a future reset instant arrives.
    pub fn new() -> Self {
        Self {
            remaining: AtomicI64::new(0),
            reset_at: AtomicU64::new(0),
        }
    }

    /// Decide whether a request may be issued at `now_ms`.
    ///
    /// Breaks when the reset instant lies in the future and no budget is
    /// left. A negative counter (local failures after exhaustion) counts as
    /// no budget.
    pub fn check(&self, now_ms: u64) -> ControlFlow<Reason> {
        let reset_at = self.reset_at.load(Ordering::Acquire);
        let remaining = self.remaining.load(Ordering::Acquire);

        if reset_at > now_ms && remaining <= 0 {
            ControlFlow::Break(Reason::Exhausted {
                retry_after: Duration::from_millis(reset_at - now_ms),
            })
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Overwrite local state with whatever the server reported.
    pub fn observe(&self, hint: QuotaHint) {
        if let Some(reset_at) = hint.reset_at_ms {
            self.reset_at.store(reset_at, Ordering::Release);
        }
        if let Some(remaining) = hint.remaining {
            self.remaining.store(remaining, Ordering::Release);
        }
    }

    /// Charge one call for a failed attempt and return the new counter.
    pub fn consume_failure(&self) -> i64 {
        // fetch_update keeps the decrement saturating under contention.
        let previous = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |val| {
                Some(val.saturating_sub(1))
            })
            .unwrap_or_else(|val| val);
        previous.saturating_sub(1)
    }

    /// Read both fields. They are loaded separately, so a concurrent
    /// `observe` may be seen half applied.
    pub fn snapshot(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            remaining: self.remaining.load(Ordering::Acquire),
            reset_at_ms: self.reset_at.load(Ordering::Acquire),
        }
    }
}
