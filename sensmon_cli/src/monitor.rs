//! Backend assembly and the run/snapshot/self-check/health commands.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use serde_json::json;

use sensmon_config::Config;
use sensmon_core::acquisition::{AcquisitionLoop, Snapshot};
use sensmon_core::config::{AcquisitionCfg, AlarmCfg, AnomalyCfg, ButtonCfg, ChannelCfg, ThresholdCfg};
use sensmon_core::error::{MonitorError, Result};
use sensmon_core::hw_error::map_hw_error;
use sensmon_core::{AlarmCoordinator, BusState, ButtonWatcher, ControlTick, TracingSink};
use sensmon_hardware::util::wait_for_flag_with_timeout;
use sensmon_hardware::{
    SimulatedAnalogBus, SimulatedBuzzer, SimulatedButton, SimulatedTelemetry, SimulatedTemperatures,
};
use sensmon_traits::{
    Actuator, AnalogChannelSource, Button, MonotonicClock, TelemetrySource, TemperatureSource,
};

/// Battery current (A) of the simulated telemetry.
pub const ENV_SIM_CURRENT: &str = "SENSMON_SIM_CURRENT";
/// Failing connects of the simulated bus: a count, or `always`.
pub const ENV_SIM_FAIL_CONNECT: &str = "SENSMON_SIM_FAIL_CONNECT";

const SIM_VOLTAGE: f64 = 12.8;
const SIM_CURRENT: f64 = 12.0;

/// Everything the monitor talks to, chosen at startup.
pub struct Backends {
    pub telemetry: Box<dyn TelemetrySource + Send>,
    pub analog: Box<dyn AnalogChannelSource + Send>,
    pub buzzer: Box<dyn Actuator + Send>,
    pub button: Option<Box<dyn Button + Send>>,
    pub temperatures: Box<dyn TemperatureSource + Send>,
}

fn env_f64(key: &str) -> Result<Option<f64>> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| MonitorError::Config(format!("{key}='{v}' is not a number")).into()),
        Err(_) => Ok(None),
    }
}

impl Backends {
    /// Simulated telemetry and bus steered by the `SENSMON_SIM_*` variables.
    /// Every channel reads an equal share of the battery current.
    pub fn simulated(cfg: &Config) -> Result<Self> {
        let current = env_f64(ENV_SIM_CURRENT)?.unwrap_or(SIM_CURRENT);
        let share = current / cfg.channels.len().max(1) as f64;
        let bus = SimulatedAnalogBus::with_voltages(
            cfg.channels
                .iter()
                .map(|c| (c.analog_input, (share - c.offset_a) / c.amp_per_volt)),
        );
        match std::env::var(ENV_SIM_FAIL_CONNECT).as_deref() {
            Ok("always") => bus.handle().fail_connects_forever(),
            Ok(n) => {
                let n = n.trim().parse::<u32>().map_err(|_| {
                    MonitorError::Config(format!("{ENV_SIM_FAIL_CONNECT}='{n}' is not a count"))
                })?;
                bus.handle().fail_connects(n);
            }
            Err(_) => {}
        }
        tracing::debug!(current, share, "using simulated telemetry and analog bus");

        Ok(Self {
            telemetry: Box::new(SimulatedTelemetry::new(SIM_VOLTAGE, current)),
            analog: Box::new(bus),
            buzzer: Box::new(SimulatedBuzzer::new()),
            button: Some(Box::new(SimulatedButton::new())),
            temperatures: Box::new(SimulatedTemperatures::new()),
        })
    }

    /// Simulated backends, with the GPIO buzzer and button when built with
    /// the `hardware` feature. A GPIO that fails to open falls back to the
    /// simulated device.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        #[allow(unused_mut)]
        let mut b = Self::simulated(cfg)?;
        #[cfg(all(feature = "hardware", target_os = "linux"))]
        {
            match sensmon_hardware::gpio::GpioBuzzer::new(cfg.pins.buzzer) {
                Ok(buzzer) => b.buzzer = Box::new(buzzer),
                Err(e) => tracing::warn!(pin = cfg.pins.buzzer, error = %e, "buzzer unavailable; using simulated buzzer"),
            }
            match sensmon_hardware::gpio::GpioButton::new(cfg.pins.button) {
                Ok(button) => b.button = Some(Box::new(button)),
                Err(e) => {
                    tracing::warn!(pin = cfg.pins.button, error = %e, "alarm button unavailable");
                    b.button = None;
                }
            }
        }
        Ok(b)
    }
}

fn channels(cfg: &Config) -> Vec<ChannelCfg> {
    cfg.channels.iter().map(ChannelCfg::from).collect()
}

fn spawn_acquisition(
    cfg: &Config,
    telemetry: Box<dyn TelemetrySource + Send>,
    analog: Box<dyn AnalogChannelSource + Send>,
) -> Result<AcquisitionLoop> {
    AcquisitionLoop::builder()
        .with_channels(channels(cfg))
        .with_config(AcquisitionCfg::from(&cfg.acquisition))
        .with_telemetry(telemetry)
        .with_analog(analog)
        .with_sink(TracingSink)
        .spawn()
}

/// Sleep `d` unless the acquisition loop reports its terminal fault first.
fn wait_or_fault(acq: &AcquisitionLoop, d: Duration) -> Result<()> {
    match acq.faults().recv_timeout(d) {
        Ok(fault) => Err(fault.into()),
        Err(_) => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub alarms_raised: u64,
}

/// Monitor until `shutdown` is raised, `duration` elapses or the bus is
/// permanently lost (returned as an `AcquisitionFault`).
pub fn run(cfg: &Config, duration: Option<Duration>, shutdown: &AtomicBool) -> Result<RunSummary> {
    let Backends {
        telemetry,
        analog,
        buzzer,
        button,
        mut temperatures,
    } = Backends::from_config(cfg)?;

    let acq = spawn_acquisition(cfg, telemetry, analog)?;
    let alarm = Arc::new(Mutex::new(AlarmCoordinator::new(buzzer, AlarmCfg::from(&cfg.alarm))));
    let mut control = ControlTick::new(alarm.clone(), AnomalyCfg::from(&cfg.anomaly), ThresholdCfg::from(cfg));
    let watcher = button
        .map(|b| ButtonWatcher::spawn(b, alarm, ButtonCfg::from(&cfg.button), MonotonicClock::new()))
        .transpose()?;

    let tick = Duration::from_millis(cfg.control.tick_ms);
    let started = Instant::now();
    let mut summary = RunSummary {
        ticks: 0,
        alarms_raised: 0,
    };
    tracing::info!(
        channels = cfg.channels.len(),
        tick_ms = cfg.control.tick_ms,
        "monitor running"
    );

    let outcome = loop {
        if let Some(fault) = acq.fault() {
            break Err(fault.into());
        }
        if wait_for_flag_with_timeout(shutdown, tick, Duration::from_millis(10)) {
            tracing::info!("shutdown requested");
            break Ok(());
        }
        if let Some(d) = duration
            && started.elapsed() >= d
        {
            break Ok(());
        }

        let checks = control.tick_currents(&acq.snapshot());
        if summary.ticks % u64::from(cfg.control.temperature_every_n) == 0 {
            control.poll_temperatures(temperatures.as_mut());
        }
        summary.ticks += 1;
        summary.alarms_raised += checks
            .iter()
            .filter(|(_, c)| *c == sensmon_core::AlarmCheck::Armed)
            .count() as u64;
    };

    if let Some(w) = watcher {
        w.stop();
    }
    acq.stop();
    outcome.map(|()| summary)
}

pub fn print_run_summary(s: &RunSummary, json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            json!({ "ticks": s.ticks, "alarms_raised": s.alarms_raised })
        );
    } else {
        println!("monitor stopped after {} ticks ({} alarms raised)", s.ticks, s.alarms_raised);
    }
}

/// Sample for `wait` and return the snapshot.
pub fn snapshot(cfg: &Config, wait: Duration) -> Result<Snapshot> {
    let b = Backends::simulated(cfg)?;
    let acq = spawn_acquisition(cfg, b.telemetry, b.analog)?;
    let res = wait_or_fault(&acq, wait).map(|()| acq.snapshot());
    acq.stop();
    res
}

pub fn print_snapshot(snap: &Snapshot, json_mode: bool) {
    if json_mode {
        let channels: serde_json::Map<String, serde_json::Value> = snap
            .iter()
            .map(|(id, c)| {
                (
                    id.clone(),
                    json!({
                        "value": c.value,
                        "quality": c.quality,
                        "baseline": c.baseline,
                        "reference_voltage": c.reference_voltage,
                    }),
                )
            })
            .collect();
        println!("{}", json!({ "channels": channels }));
        return;
    }
    for (id, c) in snap {
        let value = c
            .value
            .map_or_else(|| "n/a".to_string(), |v| format!("{v:.2} A"));
        println!(
            "channel {id}: {value} (quality {:.0}%, baseline {:.2} A, {:.2} V)",
            c.quality, c.baseline, c.reference_voltage
        );
    }
}

/// Connect the analog bus once and read the reference battery.
pub fn self_check(cfg: &Config) -> Result<()> {
    let mut b = Backends::from_config(cfg)?;
    b.analog
        .connect()
        .map_err(|e| map_hw_error(e.as_ref()))
        .wrap_err("analog bus connect failed")?;
    let (v, i) = b
        .telemetry
        .read()
        .map_err(|e| map_hw_error(e.as_ref()))
        .wrap_err("battery telemetry read failed")?;
    tracing::info!(voltage = v, current = i, "self-check passed");
    if crate::cli::json_mode() {
        println!(
            "{}",
            json!({ "ok": true, "channels": cfg.channels.len(), "reference_voltage": v, "reference_current": i })
        );
    } else {
        println!("OK: {} channels, battery {v:.2} V / {i:.2} A", cfg.channels.len());
    }
    Ok(())
}

/// Run acquisition for `wait` and report the bus state. A permanently failed
/// bus is an error.
pub fn health(cfg: &Config, wait: Duration) -> Result<()> {
    let b = Backends::simulated(cfg)?;
    let acq = spawn_acquisition(cfg, b.telemetry, b.analog)?;
    let res = wait_or_fault(&acq, wait);
    let status = acq.bus_status();
    acq.stop();
    res?;
    if crate::cli::json_mode() {
        println!(
            "{}",
            json!({
                "bus": status.state.as_str(),
                "consecutive_failures": status.consecutive_failures,
                "healthy": status.state == BusState::Connected,
            })
        );
    } else {
        println!(
            "bus: {} ({} consecutive failures)",
            status.state.as_str(),
            status.consecutive_failures
        );
    }
    Ok(())
}
