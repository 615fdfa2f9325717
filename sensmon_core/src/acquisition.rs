//! Background acquisition of the current-sensor channels.
//!
//! Spawns a thread that owns the telemetry source, the analog bus and the
//! record sink. Each tick it reads the battery reference, samples every
//! channel, and folds the calibrated readings into the per-channel
//! `SmoothedChannel`s. The channel map and bus state live behind one mutex
//! that the thread holds for the whole tick, hardware calls included;
//! readers take it only long enough to copy a snapshot.
//!
//! Each `AcquisitionLoop` owns exactly one thread, which is stopped and
//! joined by `stop()` or on drop.
use crossbeam_channel as xch;
use sensmon_traits::{AnalogChannelSource, Clock, MonotonicClock, TelemetrySource};
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use crate::config::{AcquisitionCfg, ChannelCfg};
use crate::error::{AcquisitionFault, BuildError, MonitorError, Result};
use crate::hw_error::map_hw_error;
use crate::record::{ChannelRecord, ERROR_VALUE, NullSink, RecordSink, SampleRecord};
use crate::smoothing::SmoothedChannel;
use crate::status::{BusState, BusStatus};

/// Longest uninterrupted sleep; bounds how long `stop()` waits on a pause.
const STOP_POLL: Duration = Duration::from_millis(10);

/// Reader-side copy of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSnapshot {
    /// Smoothed current, `None` while the quality gate is not met.
    pub value: Option<f64>,
    /// Mean quality in [0, 100].
    pub quality: f64,
    /// Per-channel share of the battery current at the last good sample.
    pub baseline: f64,
    pub reference_voltage: f64,
}

impl From<&SmoothedChannel> for ChannelSnapshot {
    fn from(ch: &SmoothedChannel) -> Self {
        Self {
            value: ch.value(),
            quality: ch.get_quality(),
            baseline: ch.baseline_current(),
            reference_voltage: ch.reference_voltage(),
        }
    }
}

/// Snapshot of all channels keyed by channel id.
pub type Snapshot = BTreeMap<String, ChannelSnapshot>;

/// State shared between the acquisition thread and readers.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) channels: BTreeMap<String, SmoothedChannel>,
    pub(crate) bus: BusStatus,
}

fn lock_shared(m: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// Channels were read (some reads may have failed).
    Sampled,
    /// Battery current too low; channels degraded without touching the bus.
    Idle,
    /// Connect failed; wait the backoff interval.
    Backoff,
    /// Retry limit reached; the loop must exit.
    GaveUp { attempts: u32 },
}

/// Everything the acquisition thread owns.
pub(crate) struct Worker {
    pub(crate) channels: Vec<ChannelCfg>,
    pub(crate) cfg: AcquisitionCfg,
    pub(crate) telemetry: Box<dyn TelemetrySource + Send>,
    pub(crate) analog: Box<dyn AnalogChannelSource + Send>,
    pub(crate) sink: Box<dyn RecordSink + Send>,
    last_voltage: f64,
    last_baseline: f64,
    telemetry_failing: bool,
}

impl Worker {
    pub(crate) fn new(
        channels: Vec<ChannelCfg>,
        cfg: AcquisitionCfg,
        telemetry: Box<dyn TelemetrySource + Send>,
        analog: Box<dyn AnalogChannelSource + Send>,
        sink: Box<dyn RecordSink + Send>,
    ) -> Self {
        Self {
            channels,
            cfg,
            telemetry,
            analog,
            sink,
            last_voltage: 0.0,
            last_baseline: 0.0,
            telemetry_failing: false,
        }
    }

    pub(crate) fn initial_shared(&self) -> Shared {
        Shared {
            channels: self
                .channels
                .iter()
                .map(|c| {
                    (
                        c.id.clone(),
                        SmoothedChannel::with_quality_gate(self.cfg.window, self.cfg.quality_gate_pct),
                    )
                })
                .collect(),
            bus: BusStatus::default(),
        }
    }

    fn degrade_all(&self, shared: &mut Shared) {
        for ch in shared.channels.values_mut() {
            ch.update(None);
        }
    }

    /// One sampling tick. The caller holds the shared lock for its duration.
    pub(crate) fn tick(&mut self, shared: &mut Shared) -> TickOutcome {
        if shared.bus.state == BusState::PermanentlyFailed {
            return TickOutcome::GaveUp {
                attempts: shared.bus.consecutive_failures,
            };
        }

        // Battery reference; on failure keep the previous context
        let telemetry = match self.telemetry.read() {
            Ok(reading) => {
                if self.telemetry_failing {
                    tracing::info!("battery telemetry recovered");
                    self.telemetry_failing = false;
                }
                Some(reading)
            }
            Err(e) => {
                if self.telemetry_failing {
                    tracing::debug!(error = %e, "battery telemetry still unavailable");
                } else {
                    tracing::warn!(error = %e, "battery telemetry read failed; keeping last baseline");
                    self.telemetry_failing = true;
                }
                None
            }
        };

        if let Some((voltage, current)) = telemetry {
            self.last_voltage = voltage;
            if self.cfg.low_current_cutoff_a > 0.0 && current.abs() < self.cfg.low_current_cutoff_a {
                tracing::trace!(current, "battery current below cutoff; skipping channel reads");
                self.degrade_all(shared);
                return TickOutcome::Idle;
            }
            self.last_baseline = current / self.channels.len().max(1) as f64;
        }

        if shared.bus.state != BusState::Connected {
            shared.bus.state = BusState::Connecting;
            match self.analog.connect() {
                Ok(()) => {
                    tracing::info!(
                        after_failures = shared.bus.consecutive_failures,
                        "analog bus connected"
                    );
                    shared.bus.state = BusState::Connected;
                    shared.bus.consecutive_failures = 0;
                }
                Err(e) => {
                    shared.bus.consecutive_failures = shared.bus.consecutive_failures.saturating_add(1);
                    let attempts = shared.bus.consecutive_failures;
                    self.degrade_all(shared);
                    if attempts >= self.cfg.retry_limit {
                        shared.bus.state = BusState::PermanentlyFailed;
                        tracing::error!(
                            attempts,
                            error = %map_hw_error(e.as_ref()),
                            "analog bus connect failed too many times; giving up"
                        );
                        return TickOutcome::GaveUp { attempts };
                    }
                    shared.bus.state = BusState::Disconnected;
                    tracing::warn!(
                        attempts,
                        limit = self.cfg.retry_limit,
                        error = %map_hw_error(e.as_ref()),
                        "analog bus connect failed"
                    );
                    return TickOutcome::Backoff;
                }
            }
        }

        let mut records: BTreeMap<String, ChannelRecord> = BTreeMap::new();
        let mut bus_fault = false;
        for cfg in &self.channels {
            let Some(smoothed) = shared.channels.get_mut(&cfg.id) else {
                continue;
            };
            if bus_fault {
                smoothed.update(None);
                continue;
            }
            match self.analog.read_channel(cfg.input) {
                Ok(volts) => {
                    let amps = cfg.calibration.to_amps(volts);
                    smoothed.update(Some(amps));
                    smoothed.update_context(self.last_baseline, self.last_voltage);
                    records.insert(
                        cfg.id.clone(),
                        ChannelRecord {
                            raw_voltage: volts,
                            raw_current: amps,
                            smoothed_current: ERROR_VALUE,
                        },
                    );
                }
                Err(e) => {
                    // Frequent on a noisy bus; keep at debug
                    tracing::debug!(
                        channel = %cfg.id,
                        input = cfg.input,
                        error = %map_hw_error(e.as_ref()),
                        "channel read failed; reconnecting next tick"
                    );
                    smoothed.update(None);
                    shared.bus.state = BusState::Disconnected;
                    bus_fault = true;
                }
            }
        }

        if let Some((voltage, current)) = telemetry {
            let channels = shared
                .channels
                .iter()
                .map(|(id, ch)| {
                    let mut rec = records.remove(id).unwrap_or_default();
                    rec.smoothed_current = ch.get(ERROR_VALUE);
                    (id.clone(), rec)
                })
                .collect();
            let rec = SampleRecord {
                timestamp: SystemTime::now(),
                reference_current: current,
                reference_voltage: voltage,
                channels,
            };
            if let Err(e) = self.sink.record(&rec) {
                tracing::warn!(error = %e, "record sink rejected sample");
            }
        }

        TickOutcome::Sampled
    }
}

/// Sleep `d` on `clock` in short slices, returning early once `stop` is set.
fn sleep_unless_stopped(clock: &dyn Clock, stop: &AtomicBool, d: Duration) {
    let deadline = clock.now() + d;
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let now = clock.now();
        if now >= deadline {
            return;
        }
        clock.sleep((deadline - now).min(STOP_POLL));
    }
}

pub struct AcquisitionLoop {
    shared: Arc<Mutex<Shared>>,
    faults: xch::Receiver<AcquisitionFault>,
    /// Stop flag checked at the top of every tick
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl AcquisitionLoop {
    /// Start building an acquisition loop.
    pub fn builder() -> AcquisitionBuilder<Missing, Missing> {
        AcquisitionBuilder::default()
    }

    /// Spawn with every collaborator given up front.
    pub fn spawn(
        channels: Vec<ChannelCfg>,
        cfg: AcquisitionCfg,
        telemetry: impl TelemetrySource + Send + 'static,
        analog: impl AnalogChannelSource + Send + 'static,
        sink: impl RecordSink + Send + 'static,
        clock: impl Clock + Send + Sync + 'static,
    ) -> Result<Self> {
        Self::builder()
            .with_channels(channels)
            .with_config(cfg)
            .with_telemetry(telemetry)
            .with_analog(analog)
            .with_sink(sink)
            .with_clock(clock)
            .spawn()
    }

    fn spawn_worker(
        worker: Worker,
        clock: Box<dyn Clock + Send + Sync>,
    ) -> Result<Self> {
        let mut worker = worker;
        let shared = Arc::new(Mutex::new(worker.initial_shared()));
        let shared_bg = shared.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_bg = stop.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_bg = running.clone();
        let (fault_tx, faults) = xch::bounded(1);
        let period = worker.cfg.period;
        let backoff = worker.cfg.backoff;

        let join_handle = std::thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || {
                loop {
                    if stop_bg.load(Ordering::Relaxed) {
                        tracing::debug!("acquisition thread received shutdown signal");
                        break;
                    }

                    let outcome = {
                        let mut guard = lock_shared(&shared_bg);
                        worker.tick(&mut guard)
                    };

                    match outcome {
                        TickOutcome::GaveUp { attempts } => {
                            // Receiver may already be gone; nothing else to tell
                            let _ = fault_tx.try_send(AcquisitionFault::PermanentBusFailure {
                                attempts,
                            });
                            break;
                        }
                        TickOutcome::Backoff => {
                            sleep_unless_stopped(clock.as_ref(), &stop_bg, backoff);
                        }
                        TickOutcome::Sampled | TickOutcome::Idle => {
                            sleep_unless_stopped(clock.as_ref(), &stop_bg, period);
                        }
                    }
                }
                if let Err(e) = worker.sink.flush() {
                    tracing::warn!(error = %e, "record sink flush failed");
                }
                running_bg.store(false, Ordering::Relaxed);
                tracing::trace!("acquisition thread exiting cleanly");
            })
            .map_err(|e| MonitorError::Io(e.to_string()))?;

        tracing::info!("acquisition loop started");
        Ok(Self {
            shared,
            faults,
            stop,
            running,
            join_handle: Some(join_handle),
        })
    }

    /// Copy of every channel's smoothed state. Never touches hardware.
    pub fn snapshot(&self) -> Snapshot {
        let guard = lock_shared(&self.shared);
        guard
            .channels
            .iter()
            .map(|(id, ch)| (id.clone(), ChannelSnapshot::from(ch)))
            .collect()
    }

    /// Copy of one channel's full smoothing state.
    pub fn channel(&self, id: &str) -> Option<SmoothedChannel> {
        lock_shared(&self.shared).channels.get(id).cloned()
    }

    /// Fill a channel's window with `value` (seed or hard reset).
    pub fn seed(&self, id: &str, value: f64) -> bool {
        match lock_shared(&self.shared).channels.get_mut(id) {
            Some(ch) => {
                ch.set(value);
                true
            }
            None => false,
        }
    }

    pub fn bus_status(&self) -> BusStatus {
        lock_shared(&self.shared).bus
    }

    /// Terminal fault, if the loop has reported one since the last call.
    pub fn fault(&self) -> Option<AcquisitionFault> {
        self.faults.try_recv().ok()
    }

    /// Channel on which the terminal fault is delivered (at most once).
    pub fn faults(&self) -> &xch::Receiver<AcquisitionFault> {
        &self.faults
    }

    /// False once the thread has exited (stopped or gave up).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop after the current tick, join the thread, and flush the sink.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::info!("acquisition loop stopped"),
                Err(e) => {
                    // Thread panicked; log but don't propagate
                    tracing::warn!(?e, "acquisition thread panicked during shutdown");
                }
            }
        }
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Type-state builder ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `AcquisitionLoop`. `spawn()` is available once a telemetry
/// source and an analog source are provided; `try_spawn()` always is.
pub struct AcquisitionBuilder<T, A> {
    telemetry: Option<Box<dyn TelemetrySource + Send>>,
    analog: Option<Box<dyn AnalogChannelSource + Send>>,
    sink: Option<Box<dyn RecordSink + Send>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    channels: Vec<ChannelCfg>,
    cfg: AcquisitionCfg,
    _t: PhantomData<T>,
    _a: PhantomData<A>,
}

impl Default for AcquisitionBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            telemetry: None,
            analog: None,
            sink: None,
            clock: None,
            channels: Vec::new(),
            cfg: AcquisitionCfg::default(),
            _t: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<T, A> AcquisitionBuilder<T, A> {
    pub fn with_config(mut self, cfg: AcquisitionCfg) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn with_channels(mut self, channels: impl IntoIterator<Item = ChannelCfg>) -> Self {
        self.channels.extend(channels);
        self
    }

    pub fn with_channel(mut self, channel: ChannelCfg) -> Self {
        self.channels.push(channel);
        self
    }

    /// Sink for per-tick sample records; defaults to `NullSink`.
    pub fn with_sink(mut self, sink: impl RecordSink + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Provide a custom clock implementation; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Validate and spawn without compile-time presence checks.
    pub fn try_spawn(self) -> Result<AcquisitionLoop> {
        let telemetry = self.telemetry.ok_or(BuildError::MissingTelemetry)?;
        let analog = self.analog.ok_or(BuildError::MissingAnalog)?;
        if self.channels.is_empty() {
            return Err(BuildError::NoChannels.into());
        }
        let mut ids = BTreeSet::new();
        if !self.channels.iter().all(|c| ids.insert(c.id.as_str())) {
            return Err(BuildError::InvalidConfig("duplicate channel id").into());
        }
        if self.cfg.period.is_zero() {
            return Err(BuildError::InvalidConfig("period must be > 0").into());
        }
        if self.cfg.retry_limit == 0 {
            return Err(BuildError::InvalidConfig("retry_limit must be >= 1").into());
        }
        if self.cfg.window == 0 {
            return Err(BuildError::InvalidConfig("window must be >= 1").into());
        }

        let worker = Worker::new(
            self.channels,
            self.cfg,
            telemetry,
            analog,
            self.sink.unwrap_or_else(|| Box::new(NullSink)),
        );
        let clock = self
            .clock
            .unwrap_or_else(|| Box::new(MonotonicClock::new()));
        AcquisitionLoop::spawn_worker(worker, clock)
    }
}

impl<A> AcquisitionBuilder<Missing, A> {
    pub fn with_telemetry(
        self,
        telemetry: impl TelemetrySource + Send + 'static,
    ) -> AcquisitionBuilder<Set, A> {
        AcquisitionBuilder {
            telemetry: Some(Box::new(telemetry)),
            analog: self.analog,
            sink: self.sink,
            clock: self.clock,
            channels: self.channels,
            cfg: self.cfg,
            _t: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<T> AcquisitionBuilder<T, Missing> {
    pub fn with_analog(
        self,
        analog: impl AnalogChannelSource + Send + 'static,
    ) -> AcquisitionBuilder<T, Set> {
        AcquisitionBuilder {
            telemetry: self.telemetry,
            analog: Some(Box::new(analog)),
            sink: self.sink,
            clock: self.clock,
            channels: self.channels,
            cfg: self.cfg,
            _t: PhantomData,
            _a: PhantomData,
        }
    }
}

impl AcquisitionBuilder<Set, Set> {
    /// Spawn the acquisition thread.
    pub fn spawn(self) -> Result<AcquisitionLoop> {
        self.try_spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Calibration;
    use crate::mocks::MemorySink;
    use sensmon_hardware::{SimulatedAnalogBus, SimulatedTelemetry};

    fn channels() -> Vec<ChannelCfg> {
        vec![
            ChannelCfg::new("1", 1, Calibration { amp_per_volt: 22.0, offset_a: 1.0 }),
            ChannelCfg::new("2", 2, Calibration { amp_per_volt: 22.0, offset_a: 0.0 }),
        ]
    }

    fn worker(
        telemetry: SimulatedTelemetry,
        bus: SimulatedAnalogBus,
        sink: MemorySink,
        cfg: AcquisitionCfg,
    ) -> Worker {
        Worker::new(
            channels(),
            AcquisitionCfg { window: 3, ..cfg },
            Box::new(telemetry),
            Box::new(bus),
            Box::new(sink),
        )
    }

    #[test]
    fn tick_applies_calibration_and_context() {
        let bus = SimulatedAnalogBus::with_voltages([(1, 0.5), (2, 0.25)]);
        let sink = MemorySink::new();
        let mut w = worker(
            SimulatedTelemetry::new(12.8, 20.0),
            bus,
            sink.clone(),
            AcquisitionCfg::default(),
        );
        let mut shared = w.initial_shared();

        assert_eq!(w.tick(&mut shared), TickOutcome::Sampled);
        assert_eq!(shared.bus.state, BusState::Connected);

        let ch1 = &shared.channels["1"];
        assert_eq!(ch1.readings().last(), Some(0.5 * 22.0 + 1.0));
        assert_eq!(ch1.baseline_current(), 10.0);
        assert_eq!(ch1.reference_voltage(), 12.8);

        let recs = sink.records();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].reference_current, 20.0);
        assert_eq!(recs[0].channels["2"].raw_voltage, 0.25);
        assert_eq!(recs[0].channels["2"].raw_current, 5.5);
        // One good slot out of three is below the gate
        assert_eq!(recs[0].channels["2"].smoothed_current, ERROR_VALUE);
    }

    #[test]
    fn low_battery_current_skips_bus() {
        let bus = SimulatedAnalogBus::with_voltages([(1, 0.5)]);
        let bus_h = bus.handle();
        let sink = MemorySink::new();
        let mut w = worker(
            SimulatedTelemetry::new(12.8, 0.4),
            bus,
            sink.clone(),
            AcquisitionCfg::default(),
        );
        let mut shared = w.initial_shared();
        assert_eq!(w.tick(&mut shared), TickOutcome::Idle);
        assert_eq!(bus_h.connect_attempts(), 0);
        assert!(sink.records().is_empty());
        let ch = &shared.channels["1"];
        assert!(ch.qualities().all(|q| q == 0));
        assert_eq!(ch.baseline_current(), 0.0);
        assert_eq!(ch.reference_voltage(), 0.0);
    }

    #[test]
    fn low_current_tick_keeps_last_context() {
        let telemetry = SimulatedTelemetry::new(13.0, 30.0);
        let th = telemetry.handle();
        let bus = SimulatedAnalogBus::with_voltages([(1, 0.1), (2, 0.1)]);
        let sink = MemorySink::new();
        let mut w = worker(telemetry, bus, sink.clone(), AcquisitionCfg::default());
        let mut shared = w.initial_shared();
        assert_eq!(w.tick(&mut shared), TickOutcome::Sampled);
        assert_eq!(shared.channels["1"].baseline_current(), 15.0);

        th.set(12.6, 0.2);
        assert_eq!(w.tick(&mut shared), TickOutcome::Idle);
        for ch in shared.channels.values() {
            assert_eq!(ch.baseline_current(), 15.0);
            assert_eq!(ch.reference_voltage(), 13.0);
            assert_eq!(ch.qualities().filter(|&q| q == 0).count(), 1);
        }
    }

    #[test]
    fn telemetry_failure_keeps_previous_context() {
        let telemetry = SimulatedTelemetry::new(13.0, 30.0);
        let th = telemetry.handle();
        let bus = SimulatedAnalogBus::with_voltages([(1, 0.1), (2, 0.1)]);
        let sink = MemorySink::new();
        let mut w = worker(telemetry, bus, sink.clone(), AcquisitionCfg::default());
        let mut shared = w.initial_shared();
        w.tick(&mut shared);

        th.set_failing(true);
        assert_eq!(w.tick(&mut shared), TickOutcome::Sampled);
        let ch = &shared.channels["2"];
        assert_eq!(ch.baseline_current(), 15.0);
        assert_eq!(ch.reference_voltage(), 13.0);
        assert_eq!(ch.qualities().filter(|&q| q == 100).count(), 2);
        // No record without a reference reading
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn read_failure_degrades_remaining_channels_and_reconnects() {
        let bus = SimulatedAnalogBus::with_voltages([(1, 0.1), (2, 0.1)]);
        let bh = bus.handle();
        let mut w = worker(
            SimulatedTelemetry::new(13.0, 30.0),
            bus,
            MemorySink::new(),
            AcquisitionCfg::default(),
        );
        let mut shared = w.initial_shared();
        w.tick(&mut shared);

        bh.set_input_failing(1, true);
        w.tick(&mut shared);
        assert_eq!(shared.bus.state, BusState::Disconnected);
        // Channel 2 is skipped once channel 1 faulted the bus
        assert_eq!(bh.reads(), 3);
        assert_eq!(shared.channels["2"].qualities().last(), Some(0));

        bh.set_input_failing(1, false);
        w.tick(&mut shared);
        assert_eq!(shared.bus.state, BusState::Connected);
        assert_eq!(bh.connect_attempts(), 2);
    }

    #[test]
    fn gives_up_exactly_at_retry_limit() {
        let bus = SimulatedAnalogBus::new();
        let bh = bus.handle();
        bh.fail_connects_forever();
        let mut w = worker(
            SimulatedTelemetry::new(13.0, 30.0),
            bus,
            MemorySink::new(),
            AcquisitionCfg {
                retry_limit: 4,
                ..AcquisitionCfg::default()
            },
        );
        let mut shared = w.initial_shared();
        for attempt in 1..4 {
            assert_eq!(w.tick(&mut shared), TickOutcome::Backoff);
            assert_eq!(shared.bus.consecutive_failures, attempt);
        }
        assert_eq!(w.tick(&mut shared), TickOutcome::GaveUp { attempts: 4 });
        assert_eq!(shared.bus.state, BusState::PermanentlyFailed);
        // Terminal: no further attempts
        assert_eq!(w.tick(&mut shared), TickOutcome::GaveUp { attempts: 4 });
        assert_eq!(bh.connect_attempts(), 4);
    }

    #[test]
    fn successful_connect_resets_failure_counter() {
        let bus = SimulatedAnalogBus::new();
        let bh = bus.handle();
        bh.fail_connects(3);
        let mut w = worker(
            SimulatedTelemetry::new(13.0, 30.0),
            bus,
            MemorySink::new(),
            AcquisitionCfg::default(),
        );
        let mut shared = w.initial_shared();
        for _ in 0..3 {
            w.tick(&mut shared);
        }
        assert_eq!(shared.bus.consecutive_failures, 3);
        assert_eq!(w.tick(&mut shared), TickOutcome::Sampled);
        assert_eq!(shared.bus.consecutive_failures, 0);
    }

    #[test]
    fn builder_rejects_missing_parts() {
        let err = AcquisitionLoop::builder()
            .with_channels(channels())
            .try_spawn()
            .err()
            .expect("missing telemetry");
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingTelemetry)
        ));

        let err = AcquisitionLoop::builder()
            .with_telemetry(SimulatedTelemetry::new(12.0, 5.0))
            .with_analog(SimulatedAnalogBus::new())
            .spawn()
            .err()
            .expect("no channels");
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::NoChannels)
        ));
    }
}
