//! Background on/off pattern driver shared by the simulated and GPIO buzzers.
//!
//! A `PatternRunner` owns at most one thread toggling an output closure.
//! Starting a new pattern stops the previous one first.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::util::wait_for_flag_with_timeout;

const POLL: Duration = Duration::from_millis(5);

/// One beep pattern: `on`/`off` durations, `repeat == None` means until stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeepPattern {
    pub on: Duration,
    pub off: Duration,
    pub repeat: Option<u32>,
}

#[derive(Default)]
pub struct PatternRunner {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PatternRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start driving `output` with `pattern`. `output(true)` means sounding.
    pub fn start<F>(&mut self, pattern: BeepPattern, mut output: F)
    where
        F: FnMut(bool) + Send + 'static,
    {
        self.stop();
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        self.stop = stop.clone();
        self.running = running.clone();

        self.handle = Some(std::thread::spawn(move || {
            let mut cycles = 0u32;
            loop {
                if pattern.repeat.is_some_and(|n| cycles >= n) {
                    break;
                }
                output(true);
                if wait_for_flag_with_timeout(&stop, pattern.on, POLL) {
                    break;
                }
                output(false);
                if wait_for_flag_with_timeout(&stop, pattern.off, POLL) {
                    break;
                }
                cycles = cycles.saturating_add(1);
            }
            output(false);
            running.store(false, Ordering::Relaxed);
            tracing::trace!(cycles, "beep pattern finished");
        }));
    }

    /// Stop the pattern and wait for the output to be released.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("beep pattern thread panicked");
        }
        self.running.store(false, Ordering::Relaxed);
    }

    /// True while a pattern thread is still cycling.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Drop for PatternRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
