use std::thread;
use std::time::{Duration, Instant};

/// Time source for the monitor's background threads.
///
/// The acquisition loop sleeps its tick period and connect backoff through
/// `sleep`; the alarm coordinator stamps trigger times with `now` to measure
/// silence windows; the button watcher times holds from its poll samples.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds since `epoch`, 0 for an epoch in the future.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Wall-time clock used by the `sensmon` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_clock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Virtual clock for driving silence windows, backoff and button holds
    /// in tests without waiting on them.
    ///
    /// `sleep(d)` moves the clock forward by `d` and yields, so an
    /// acquisition thread on this clock runs ticks back to back.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Move every clone of this clock forward by `d`.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        /// Jump to `d` after creation, backwards included.
        pub fn set_offset(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = d;
            }
        }

        /// Time elapsed on this clock since creation.
        pub fn elapsed(&self) -> Duration {
            self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
            thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_clock::TestClock;
    use super::*;

    #[test]
    fn test_clock_only_moves_when_advanced() {
        let clock = TestClock::new();
        let epoch = clock.now();
        assert_eq!(clock.ms_since(epoch), 0);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.ms_since(epoch), 250);
        clock.sleep(Duration::from_millis(750));
        assert_eq!(clock.ms_since(epoch), 1000);
    }

    #[test]
    fn ms_since_saturates_for_future_epoch() {
        let clock = TestClock::new();
        clock.set_offset(Duration::from_secs(5));
        let future = clock.now();
        clock.set_offset(Duration::ZERO);
        assert_eq!(clock.ms_since(future), 0);
    }

    #[test]
    fn clones_share_virtual_time() {
        let clock = TestClock::new();
        let worker_side = clock.clone();
        let epoch = clock.now();
        worker_side.sleep(Duration::from_secs(30 * 60));
        assert_eq!(clock.ms_since(epoch), 30 * 60 * 1000);
        assert_eq!(clock.elapsed(), Duration::from_secs(30 * 60));
    }
}
