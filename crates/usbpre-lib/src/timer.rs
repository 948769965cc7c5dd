//! Blocking delays behind a trait so sequencing can be tested without waiting.

use std::time::Duration;

/// Source of blocking delays.
///
/// Both the post-arrival settle delay and the mandated inter-command delay go
/// through this trait. Implementations must block for at least `duration`.
pub trait Timer {
    fn sleep(&self, duration: Duration);
}

/// Wall-clock timer backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadTimer;

impl Timer for ThreadTimer {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: Timer + ?Sized> Timer for &T {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn thread_timer_blocks_at_least_duration() {
        let start = Instant::now();
        ThreadTimer.sleep(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn reference_forwards_to_inner_timer() {
        fn takes_timer(t: impl Timer) {
            t.sleep(Duration::from_millis(1));
        }
        let timer = ThreadTimer;
        takes_timer(&timer);
    }
}
