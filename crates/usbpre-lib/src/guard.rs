//! Single-flight guard — at most one initialization run per process.
//!
//! Arrivals that find a run in progress are dropped, not queued. Entry hands
//! out an [`InitPermit`]; dropping the permit is the only way to exit, so the
//! flag is cleared exactly once on every path, including unwinding.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Process-wide "initialization in progress" flag.
#[derive(Debug, Default)]
pub struct InitGuard {
    in_progress: AtomicBool,
    admitted: AtomicU64,
    released: AtomicU64,
    dropped: AtomicU64,
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardStats {
    /// `try_enter` calls that were granted.
    pub admitted: u64,
    /// Permits that have been released.
    pub released: u64,
    /// `try_enter` calls that were denied.
    pub dropped: u64,
}

impl InitGuard {
    pub const fn new() -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            admitted: AtomicU64::new(0),
            released: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Claim the guard if no run is active.
    ///
    /// Returns `None` when a run is already in progress; the caller must skip
    /// its event entirely.
    pub fn try_enter(&self) -> Option<InitPermit<'_>> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.admitted.fetch_add(1, Ordering::Relaxed);
        Some(InitPermit { guard: self })
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn exit(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
        self.in_progress.store(false, Ordering::Release);
    }
}

/// Proof of holding the guard. Releases it on drop.
#[derive(Debug)]
#[must_use = "dropping the permit immediately releases the guard"]
pub struct InitPermit<'a> {
    guard: &'a InitGuard,
}

impl Drop for InitPermit<'_> {
    fn drop(&mut self) {
        self.guard.exit();
    }
}
