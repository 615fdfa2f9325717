//! Alarm button: pressing silences every alarm at once, keeping it held
//! then runs the buzzer test.
//!
//! `ButtonGesture` turns raw polled states into gestures; `ButtonWatcher`
//! polls a `Button` on its own thread and forwards gestures to the shared
//! alarm coordinator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use sensmon_traits::{Actuator, Button, Clock};

use crate::alarm::AlarmCoordinator;
use crate::config::ButtonCfg;
use crate::error::{MonitorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Debounced press-down.
    Press,
    /// Still pressed when the hold time elapsed, after the `Press` of the
    /// same press. Emitted once per press.
    Hold,
}

/// Debounced press/hold decoder fed with `(pressed, now)` samples.
#[derive(Debug, Clone)]
pub struct ButtonGesture {
    hold: Duration,
    debounce_n: u8,
    stable: bool,
    candidate: bool,
    count: u8,
    pressed_at: Option<Instant>,
    hold_fired: bool,
}

impl ButtonGesture {
    pub fn new(hold: Duration, debounce_n: u8) -> Self {
        Self {
            hold,
            debounce_n: debounce_n.max(1),
            stable: false,
            candidate: false,
            count: 0,
            pressed_at: None,
            hold_fired: false,
        }
    }

    /// Debounced state.
    pub fn is_pressed(&self) -> bool {
        self.stable
    }

    pub fn feed(&mut self, raw: bool, now: Instant) -> Option<Gesture> {
        if raw == self.stable {
            self.count = 0;
        } else {
            if raw == self.candidate && self.count > 0 {
                self.count = self.count.saturating_add(1);
            } else {
                self.candidate = raw;
                self.count = 1;
            }
            if self.count >= self.debounce_n {
                self.stable = raw;
                self.count = 0;
                self.hold_fired = false;
                if raw {
                    self.pressed_at = Some(now);
                    return Some(Gesture::Press);
                }
                self.pressed_at = None;
                return None;
            }
        }

        if self.stable
            && !self.hold_fired
            && let Some(t0) = self.pressed_at
            && now.saturating_duration_since(t0) >= self.hold
        {
            self.hold_fired = true;
            return Some(Gesture::Hold);
        }
        None
    }
}

impl From<&ButtonCfg> for ButtonGesture {
    fn from(cfg: &ButtonCfg) -> Self {
        Self::new(cfg.hold, cfg.debounce_n)
    }
}

/// Apply a gesture to the shared alarm coordinator.
pub fn dispatch<A: Actuator, C: Clock>(gesture: Gesture, alarm: &Mutex<AlarmCoordinator<A, C>>) {
    let mut guard = alarm.lock().unwrap_or_else(PoisonError::into_inner);
    match gesture {
        Gesture::Press => guard.silence_all(),
        Gesture::Hold => guard.test(),
    }
}

/// Thread polling the alarm button until stopped.
pub struct ButtonWatcher {
    stop: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl ButtonWatcher {
    pub fn spawn<B, A, AC, C>(
        mut button: B,
        alarm: Arc<Mutex<AlarmCoordinator<A, AC>>>,
        cfg: ButtonCfg,
        clock: C,
    ) -> Result<Self>
    where
        B: Button + Send + 'static,
        A: Actuator + Send + 'static,
        AC: Clock + Send + 'static,
        C: Clock + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_bg = stop.clone();
        let mut gesture = ButtonGesture::from(&cfg);
        let poll = cfg.poll;

        let join_handle = std::thread::Builder::new()
            .name("alarm-button".into())
            .spawn(move || {
                let mut failing = false;
                while !stop_bg.load(Ordering::Relaxed) {
                    match button.is_pressed() {
                        Ok(raw) => {
                            failing = false;
                            if let Some(g) = gesture.feed(raw, clock.now()) {
                                tracing::info!(gesture = ?g, "alarm button");
                                dispatch(g, &alarm);
                            }
                        }
                        Err(e) if failing => tracing::trace!(error = %e, "button read still failing"),
                        Err(e) => {
                            tracing::warn!(error = %e, "button read failed");
                            failing = true;
                        }
                    }
                    clock.sleep(poll);
                }
                tracing::trace!("button watcher exiting");
            })
            .map_err(|e| MonitorError::Io(e.to_string()))?;

        Ok(Self {
            stop,
            join_handle: Some(join_handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("button watcher thread panicked");
        }
    }
}

impl Drop for ButtonWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn run(g: &mut ButtonGesture, t0: Instant, samples: &[(bool, u64)]) -> Vec<Gesture> {
        samples
            .iter()
            .filter_map(|&(raw, at)| g.feed(raw, t0 + MS * u32::try_from(at).unwrap()))
            .collect()
    }

    #[test]
    fn press_is_reported_on_debounced_press_down() {
        let mut g = ButtonGesture::new(Duration::from_secs(3), 2);
        let t0 = Instant::now();
        assert_eq!(g.feed(true, t0), None);
        assert_eq!(g.feed(true, t0 + 20 * MS), Some(Gesture::Press));
        assert!(g.is_pressed());
        let out = run(&mut g, t0, &[(true, 40), (false, 60), (false, 80)]);
        assert!(out.is_empty());
        assert!(!g.is_pressed());
    }

    #[test]
    fn single_glitch_is_ignored() {
        let mut g = ButtonGesture::new(Duration::from_secs(3), 2);
        let t0 = Instant::now();
        let out = run(&mut g, t0, &[(true, 0), (false, 20), (true, 40), (false, 60)]);
        assert!(out.is_empty());
        assert!(!g.is_pressed());
    }

    #[test]
    fn hold_follows_press_once_and_release_is_silent() {
        let mut g = ButtonGesture::new(Duration::from_secs(3), 1);
        let t0 = Instant::now();
        let out = run(
            &mut g,
            t0,
            &[(true, 0), (true, 2_999), (true, 3_000), (true, 5_000), (false, 5_020)],
        );
        assert_eq!(out, [Gesture::Press, Gesture::Hold]);
    }

    #[test]
    fn second_press_can_hold_again() {
        let mut g = ButtonGesture::new(Duration::from_millis(100), 1);
        let t0 = Instant::now();
        let out = run(
            &mut g,
            t0,
            &[(true, 0), (true, 150), (false, 200), (true, 300), (true, 450)],
        );
        assert_eq!(
            out,
            [Gesture::Press, Gesture::Hold, Gesture::Press, Gesture::Hold]
        );
    }
}
