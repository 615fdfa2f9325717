use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use sensmon_hardware::util::wait_for_flag_with_timeout;

#[test]
fn wait_returns_early_when_flag_raised() {
    let flag = Arc::new(AtomicBool::new(false));
    let flag_bg = flag.clone();
    // Raise after a short delay
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        flag_bg.store(true, Ordering::Relaxed);
    });

    let start = Instant::now();
    let raised = wait_for_flag_with_timeout(
        &flag,
        Duration::from_millis(500),
        Duration::from_micros(200),
    );
    assert!(raised, "expected flag to be observed");
    assert!(start.elapsed() < Duration::from_millis(400));
}

#[test]
fn wait_times_out_without_flag() {
    let flag = AtomicBool::new(false);
    let start = Instant::now();
    let raised = wait_for_flag_with_timeout(
        &flag,
        Duration::from_millis(5),
        Duration::from_micros(200),
    );
    assert!(!raised);
    assert!(start.elapsed() >= Duration::from_millis(5));
}
