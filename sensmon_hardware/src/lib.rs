//! Device backends for the sensor monitor.
//!
//! Simulated implementations of every capability in `sensmon_traits` are
//! always available; each comes with a cloneable handle so a test or the CLI
//! can steer it while the device itself is owned by a background thread.
//! The `hardware` feature adds GPIO adapters for the buzzer and button.
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod pattern;
pub mod util;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sensmon_traits::{
    Actuator, AnalogChannelSource, BoxError, Button, TelemetrySource, TemperatureReading,
    TemperatureSource,
};

use crate::error::HwError;
use crate::pattern::{BeepPattern, PatternRunner};

/// Lock a simulation state mutex, recovering from poisoning.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// ── Telemetry ────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct TelemetryState {
    voltage: f64,
    current: f64,
    failing: bool,
    reads: usize,
}

/// Simulated battery monitor.
pub struct SimulatedTelemetry {
    state: Arc<Mutex<TelemetryState>>,
}

/// Steering handle for a `SimulatedTelemetry`.
#[derive(Clone)]
pub struct SimTelemetryHandle {
    state: Arc<Mutex<TelemetryState>>,
}

impl SimulatedTelemetry {
    pub fn new(voltage: f64, current: f64) -> Self {
        SimulatedTelemetry {
            state: Arc::new(Mutex::new(TelemetryState {
                voltage,
                current,
                failing: false,
                reads: 0,
            })),
        }
    }

    pub fn handle(&self) -> SimTelemetryHandle {
        SimTelemetryHandle {
            state: self.state.clone(),
        }
    }
}

impl SimTelemetryHandle {
    pub fn set(&self, voltage: f64, current: f64) {
        let mut s = lock(&self.state);
        s.voltage = voltage;
        s.current = current;
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    pub fn reads(&self) -> usize {
        lock(&self.state).reads
    }
}

impl TelemetrySource for SimulatedTelemetry {
    fn read(&mut self) -> Result<(f64, f64), BoxError> {
        let mut s = lock(&self.state);
        s.reads = s.reads.saturating_add(1);
        if s.failing {
            return Err(Box::new(HwError::Telemetry("battery service not found".into())));
        }
        Ok((s.voltage, s.current))
    }
}

// ── Analog bus ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BusState {
    connected: bool,
    voltages: BTreeMap<u8, f64>,
    /// Remaining connect attempts that fail; `u32::MAX` fails forever.
    failing_connects: u32,
    failing_inputs: BTreeSet<u8>,
    connect_attempts: u32,
    reads: usize,
}

/// Simulated multi-channel ADC on a shared bus.
///
/// A read on a failing input raises a bus fault and drops the connection,
/// mirroring how a wedged I2C transaction behaves.
pub struct SimulatedAnalogBus {
    state: Arc<Mutex<BusState>>,
}

/// Steering handle for a `SimulatedAnalogBus`.
#[derive(Clone)]
pub struct SimBusHandle {
    state: Arc<Mutex<BusState>>,
}

impl Default for SimulatedAnalogBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAnalogBus {
    pub fn new() -> Self {
        SimulatedAnalogBus {
            state: Arc::new(Mutex::new(BusState::default())),
        }
    }

    /// Bus whose inputs start at the given voltages.
    pub fn with_voltages(voltages: impl IntoIterator<Item = (u8, f64)>) -> Self {
        let bus = Self::new();
        lock(&bus.state).voltages.extend(voltages);
        bus
    }

    pub fn handle(&self) -> SimBusHandle {
        SimBusHandle {
            state: self.state.clone(),
        }
    }
}

impl SimBusHandle {
    pub fn set_voltage(&self, input: u8, volts: f64) {
        lock(&self.state).voltages.insert(input, volts);
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_connects(&self, n: u32) {
        lock(&self.state).failing_connects = n;
    }

    /// Make every connect attempt fail from now on.
    pub fn fail_connects_forever(&self) {
        lock(&self.state).failing_connects = u32::MAX;
    }

    pub fn set_input_failing(&self, input: u8, failing: bool) {
        let mut s = lock(&self.state);
        if failing {
            s.failing_inputs.insert(input);
        } else {
            s.failing_inputs.remove(&input);
        }
    }

    pub fn connect_attempts(&self) -> u32 {
        lock(&self.state).connect_attempts
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn reads(&self) -> usize {
        lock(&self.state).reads
    }
}

impl AnalogChannelSource for SimulatedAnalogBus {
    fn connect(&mut self) -> Result<(), BoxError> {
        let mut s = lock(&self.state);
        s.connect_attempts = s.connect_attempts.saturating_add(1);
        if s.failing_connects > 0 {
            if s.failing_connects != u32::MAX {
                s.failing_connects -= 1;
            }
            s.connected = false;
            return Err(Box::new(HwError::Bus("no ACK from ADC".into())));
        }
        s.connected = true;
        tracing::debug!("simulated analog bus connected");
        Ok(())
    }

    fn read_channel(&mut self, input: u8) -> Result<f64, BoxError> {
        let mut s = lock(&self.state);
        if !s.connected {
            return Err(Box::new(HwError::NotConnected));
        }
        s.reads = s.reads.saturating_add(1);
        if s.failing_inputs.contains(&input) {
            s.connected = false;
            return Err(Box::new(HwError::Bus(format!("read of input {input} failed"))));
        }
        Ok(s.voltages.get(&input).copied().unwrap_or(0.0))
    }
}

// ── Buzzer ───────────────────────────────────────────────────────────────────

/// Simulated buzzer; the "pin" level is an atomic flag.
pub struct SimulatedBuzzer {
    runner: PatternRunner,
    level: Arc<AtomicBool>,
    starts: Arc<AtomicUsize>,
    last_pattern: Arc<Mutex<Option<BeepPattern>>>,
}

/// Observation handle for a `SimulatedBuzzer`.
#[derive(Clone)]
pub struct SimBuzzerHandle {
    level: Arc<AtomicBool>,
    starts: Arc<AtomicUsize>,
    last_pattern: Arc<Mutex<Option<BeepPattern>>>,
}

impl Default for SimulatedBuzzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBuzzer {
    pub fn new() -> Self {
        SimulatedBuzzer {
            runner: PatternRunner::new(),
            level: Arc::new(AtomicBool::new(false)),
            starts: Arc::new(AtomicUsize::new(0)),
            last_pattern: Arc::new(Mutex::new(None)),
        }
    }

    pub fn handle(&self) -> SimBuzzerHandle {
        SimBuzzerHandle {
            level: self.level.clone(),
            starts: self.starts.clone(),
            last_pattern: self.last_pattern.clone(),
        }
    }
}

impl SimBuzzerHandle {
    pub fn is_sounding(&self) -> bool {
        self.level.load(Ordering::Relaxed)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::Relaxed)
    }

    pub fn last_pattern(&self) -> Option<BeepPattern> {
        *lock(&self.last_pattern)
    }
}

impl Actuator for SimulatedBuzzer {
    fn start_pattern(
        &mut self,
        on: Duration,
        off: Duration,
        repeat: Option<u32>,
    ) -> Result<(), BoxError> {
        let pattern = BeepPattern { on, off, repeat };
        self.starts.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_pattern) = Some(pattern);
        let level = self.level.clone();
        self.runner
            .start(pattern, move |on| level.store(on, Ordering::Relaxed));
        tracing::debug!(?pattern, "simulated buzzer started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.runner.stop();
        self.level.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.runner.is_running()
    }
}

// ── Button ───────────────────────────────────────────────────────────────────

/// Simulated push button.
#[derive(Clone, Default)]
pub struct SimulatedButton {
    pressed: Arc<AtomicBool>,
}

impl SimulatedButton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the physical state; clones share it.
    pub fn set_pressed(&self, pressed: bool) {
        self.pressed.store(pressed, Ordering::Relaxed);
    }
}

impl Button for SimulatedButton {
    fn is_pressed(&mut self) -> Result<bool, BoxError> {
        Ok(self.pressed.load(Ordering::Relaxed))
    }
}

// ── Temperatures ─────────────────────────────────────────────────────────────

/// Simulated set of temperature sensors; clones share the same readings.
#[derive(Clone, Default)]
pub struct SimulatedTemperatures {
    readings: Arc<Mutex<Vec<TemperatureReading>>>,
}

impl SimulatedTemperatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: &str, temperature_c: Option<f64>) {
        let mut r = lock(&self.readings);
        match r.iter_mut().find(|t| t.id == id) {
            Some(t) => t.temperature_c = temperature_c,
            None => r.push(TemperatureReading {
                id: id.to_string(),
                temperature_c,
                humidity_pct: None,
            }),
        }
    }

    pub fn remove(&self, id: &str) {
        lock(&self.readings).retain(|t| t.id != id);
    }
}

impl TemperatureSource for SimulatedTemperatures {
    fn read_temperatures(&mut self) -> Result<Vec<TemperatureReading>, BoxError> {
        Ok(lock(&self.readings).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_bus_requires_connect() {
        let mut bus = SimulatedAnalogBus::with_voltages([(1, 0.5)]);
        assert!(bus.read_channel(1).is_err());
        bus.connect().unwrap();
        assert_eq!(bus.read_channel(1).unwrap(), 0.5);
        // Unknown inputs read as 0 V
        assert_eq!(bus.read_channel(3).unwrap(), 0.0);
    }

    #[test]
    fn test_failing_input_drops_connection() {
        let mut bus = SimulatedAnalogBus::with_voltages([(1, 0.5), (2, 0.7)]);
        let h = bus.handle();
        bus.connect().unwrap();
        h.set_input_failing(2, true);
        assert!(bus.read_channel(2).is_err());
        assert!(!h.is_connected());
        assert!(bus.read_channel(1).is_err());
    }

    #[test]
    fn test_connect_failures_count_down() {
        let mut bus = SimulatedAnalogBus::new();
        let h = bus.handle();
        h.fail_connects(2);
        assert!(bus.connect().is_err());
        assert!(bus.connect().is_err());
        assert!(bus.connect().is_ok());
        assert_eq!(h.connect_attempts(), 3);
    }

    #[test]
    fn test_simulated_telemetry_failure() {
        let mut t = SimulatedTelemetry::new(12.8, -4.0);
        let h = t.handle();
        assert_eq!(t.read().unwrap(), (12.8, -4.0));
        h.set_failing(true);
        let err = t.read().unwrap_err();
        assert!(err.to_string().contains("telemetry"));
        assert_eq!(h.reads(), 2);
    }

    #[test]
    fn test_simulated_buzzer_start_stop() {
        let mut buzzer = SimulatedBuzzer::new();
        let h = buzzer.handle();
        buzzer
            .start_pattern(Duration::from_millis(250), Duration::from_millis(250), None)
            .unwrap();
        assert!(buzzer.is_active());
        assert_eq!(h.starts(), 1);
        buzzer.stop().unwrap();
        assert!(!buzzer.is_active());
        assert!(!h.is_sounding());
    }

    #[test]
    fn test_simulated_temperatures_update_in_place() {
        let mut temps = SimulatedTemperatures::new();
        temps.set("28-0001", Some(21.5));
        temps.set("28-0001", Some(22.0));
        temps.set("rpi", Some(48.2));
        let r = temps.read_temperatures().unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r[0].temperature_c, Some(22.0));
        temps.remove("rpi");
        assert_eq!(temps.read_temperatures().unwrap().len(), 1);
    }
}
