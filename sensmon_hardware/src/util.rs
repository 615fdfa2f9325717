use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Sleep for up to `timeout`, waking early once `flag` is raised.
/// Sleeps in `poll_interval` slices to avoid CPU spinning.
///
/// Returns `true` when the flag was observed, `false` when the full timeout elapsed.
pub fn wait_for_flag_with_timeout(
    flag: &AtomicBool,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if flag.load(Ordering::Relaxed) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(poll_interval.min(deadline - now));
    }
}
