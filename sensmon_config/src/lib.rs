#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]
//! Config schema and calibration parsing for the sensor monitor.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//!   Every section is optional; an empty file yields the stock three-channel
//!   setup used on the boat.
//! - Calibration CSV loader enforces headers and fits `amps = a*volts + b`
//!   per channel, with one robust refit to reduce outlier influence.
use serde::Deserialize;
use std::collections::BTreeMap;

/// Calibration CSV schema.
///
/// Expected headers:
/// channel,volts,amps
///
/// Example:
/// channel,volts,amps
/// 1,0.10,3.6
/// 1,0.50,12.4
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationRow {
    pub channel: String,
    pub volts: f64,
    pub amps: f64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChannelCfg {
    /// Identifier used in snapshots, alarms and logs.
    pub id: String,
    /// ADC input the current sensor is wired to.
    pub analog_input: u8,
    /// Sensor gain. 150 A / 5 V is 30 A/V on paper; 22 A/V matches the shunt in practice.
    #[serde(default = "default_amp_per_volt")]
    pub amp_per_volt: f64,
    /// Additive zero offset in amps.
    #[serde(default)]
    pub offset_a: f64,
    /// Deviation from baseline (percent) that raises the alarm; 0 disables it.
    #[serde(default = "default_diff_alarm_pct")]
    pub diff_alarm_pct: f64,
}

fn default_amp_per_volt() -> f64 {
    22.0
}

fn default_diff_alarm_pct() -> f64 {
    50.0
}

/// Three sensors on ADC inputs 1..=3 (input 0 is not wired).
pub fn default_channels() -> Vec<ChannelCfg> {
    [(1u8, 1.453), (2, -0.847), (3, 0.008)]
        .into_iter()
        .map(|(input, offset_a)| ChannelCfg {
            id: input.to_string(),
            analog_input: input,
            amp_per_volt: default_amp_per_volt(),
            offset_a,
            diff_alarm_pct: default_diff_alarm_pct(),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Acquisition {
    /// Pause between sampling ticks (ms).
    pub period_ms: u64,
    /// Samples per smoothing window.
    pub window: usize,
    /// Consecutive failed bus connects before giving up for good.
    pub retry_limit: u32,
    /// Pause after a failed connect (ms).
    pub backoff_ms: u64,
    /// Below this battery current (A) the channels are not sampled; 0 disables.
    pub low_current_cutoff_a: f64,
    /// Mean quality (percent) required before a smoothed value is exposed.
    pub quality_gate_pct: f64,
}

impl Default for Acquisition {
    fn default() -> Self {
        Self {
            period_ms: 100,
            window: 10,
            retry_limit: 10,
            backoff_ms: 1000,
            low_current_cutoff_a: 1.0,
            quality_gate_pct: 50.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Anomaly {
    /// Mean |current| (A) across channels below which deviations are ignored.
    pub low_activity_cutoff_a: f64,
    /// Single-channel |current| (A) that still alarms while activity is low.
    pub high_magnitude_cutoff_a: f64,
}

impl Default for Anomaly {
    fn default() -> Self {
        Self {
            low_activity_cutoff_a: 2.0,
            high_magnitude_cutoff_a: 3.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Alarm {
    /// Seconds a source stays silent after being armed or silenced.
    pub silence_secs: u64,
    /// Alarm beep pattern.
    pub on_ms: u64,
    pub off_ms: u64,
    /// Default high-temperature threshold (°C) for temperature sources.
    pub high_temp_c: f64,
    /// Per-source overrides of `high_temp_c`, keyed by sensor id.
    pub high_temp_overrides: BTreeMap<String, f64>,
}

impl Default for Alarm {
    fn default() -> Self {
        Self {
            silence_secs: 30 * 60,
            on_ms: 250,
            off_ms: 250,
            high_temp_c: 70.0,
            high_temp_overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ButtonCfg {
    /// Holding this long (ms) runs the buzzer test instead of silencing.
    pub hold_ms: u64,
    /// Button polling interval (ms).
    pub poll_ms: u64,
    /// Consecutive equal polls required to accept a level change.
    pub debounce_n: u8,
}

impl Default for ButtonCfg {
    fn default() -> Self {
        Self {
            hold_ms: 3000,
            poll_ms: 20,
            debounce_n: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pins {
    pub buzzer: u8,
    pub button: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            buzzer: 20,
            button: 16,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Control {
    /// Control tick period (ms): snapshot, evaluate, check alarms.
    pub tick_ms: u64,
    /// Temperatures are polled every n-th control tick.
    pub temperature_every_n: u32,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            temperature_every_n: 5,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub channels: Vec<ChannelCfg>,
    pub acquisition: Acquisition,
    pub anomaly: Anomaly,
    pub alarm: Alarm,
    pub button: ButtonCfg,
    pub pins: Pins,
    pub control: Control,
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            acquisition: Acquisition::default(),
            anomaly: Anomaly::default(),
            alarm: Alarm::default(),
            button: ButtonCfg::default(),
            pins: Pins::default(),
            control: Control::default(),
            logging: Logging::default(),
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Fitted linear sensor model: `amps = volts * amp_per_volt + offset_a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCalibration {
    pub amp_per_volt: f64,
    pub offset_a: f64,
}

/// Calibrations keyed by channel id.
pub type CalibrationSet = BTreeMap<String, ChannelCalibration>;

impl ChannelCalibration {
    /// Fit a channel's sensor model with ordinary least squares on all points,
    /// then refit once without points whose residual exceeds 2x RMS.
    pub fn from_points(pts: &[(f64, f64)]) -> eyre::Result<Self> {
        if pts.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", pts.len());
        }
        if let Some(i) = pts.iter().position(|(x, y)| !x.is_finite() || !y.is_finite()) {
            eyre::bail!("calibration row at index {i} is not finite");
        }

        // Strictly monotonic volts (increasing or decreasing), no duplicates
        let mut dir: i8 = 0;
        for i in 1..pts.len() {
            let d = pts[i].0 - pts[i - 1].0;
            if d == 0.0 {
                eyre::bail!(
                    "calibration rows have duplicate volts at index {} and {}",
                    i - 1,
                    i
                );
            }
            let step_dir = if d > 0.0 { 1 } else { -1 };
            if dir == 0 {
                dir = step_dir;
            } else if dir != step_dir {
                eyre::bail!(
                    "calibration volts must be monotonic (strictly increasing or strictly decreasing)"
                );
            }
        }

        let (a0, b0) = fit(pts)?;
        let sumsq: f64 = pts
            .iter()
            .map(|(x, y)| {
                let r = y - (a0 * x + b0);
                r * r
            })
            .sum();
        let rms = (sumsq / pts.len() as f64).sqrt();

        let (a, b) = robust_refit(pts, a0, b0, rms, 2.0).unwrap_or((a0, b0));
        Ok(ChannelCalibration {
            amp_per_volt: a,
            offset_a: b,
        })
    }
}

fn fit(pts: &[(f64, f64)]) -> eyre::Result<(f64, f64)> {
    let n = pts.len() as f64;
    let mean_x = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for (px, py) in pts {
        let x = px - mean_x;
        let y = py - mean_y;
        sxx += x * x;
        sxy += x * y;
    }
    if !sxx.is_finite() || sxx == 0.0 {
        eyre::bail!("calibration cannot determine slope (degenerate volts variance)");
    }
    let a = sxy / sxx;
    if !a.is_finite() {
        eyre::bail!("calibration produced non-finite slope");
    }
    if a == 0.0 {
        eyre::bail!("calibration produced zero slope (sensor not responding)");
    }
    let b = mean_y - a * mean_x;
    if !b.is_finite() {
        eyre::bail!("calibration produced non-finite offset");
    }
    Ok((a, b))
}

/// Single-step robust refit rejecting points with |residual| > k * rms around
/// y = a0*x + b0, using an online (Welford/Chan) covariance over the inliers.
/// Returns None when a refit does not apply (zero rms, <2 inliers, nothing
/// rejected, or degenerate variance); the caller keeps (a0, b0).
fn robust_refit(pts: &[(f64, f64)], a0: f64, b0: f64, rms: f64, k: f64) -> Option<(f64, f64)> {
    if !(rms.is_finite() && rms > 0.0 && k.is_finite() && k > 0.0) {
        return None;
    }
    let thr = k * rms;
    let mut n_in: usize = 0;
    let mut mean_x = 0.0f64;
    let mut mean_y = 0.0f64;
    let mut cxx = 0.0f64;
    let mut cxy = 0.0f64;

    for &(x, y) in pts {
        if (y - (a0 * x + b0)).abs() <= thr {
            n_in += 1;
            let n_new = n_in as f64;
            let dx = x - mean_x;
            let dy = y - mean_y;
            let mean_x_new = mean_x + dx / n_new;
            let mean_y_new = mean_y + dy / n_new;
            cxx += dx * (x - mean_x_new);
            cxy += dx * (y - mean_y_new);
            mean_x = mean_x_new;
            mean_y = mean_y_new;
        }
    }

    if n_in < 2 || n_in == pts.len() || !cxx.is_finite() || cxx == 0.0 {
        return None;
    }
    let a = cxy / cxx;
    let b = mean_y - a * mean_x;
    if !a.is_finite() || a == 0.0 || !b.is_finite() {
        return None;
    }
    Some((a, b))
}

/// Group calibration rows by channel (file order kept) and fit each group.
pub fn fit_rows(rows: &[CalibrationRow]) -> eyre::Result<CalibrationSet> {
    let mut grouped: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();
    for r in rows {
        grouped
            .entry(r.channel.as_str())
            .or_default()
            .push((r.volts, r.amps));
    }
    let mut out = CalibrationSet::new();
    for (channel, pts) in grouped {
        let cal = ChannelCalibration::from_points(&pts)
            .map_err(|e| eyre::eyre!("channel {channel}: {e}"))?;
        out.insert(channel.to_string(), cal);
    }
    Ok(out)
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<CalibrationSet> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["channel", "volts", "amps"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'channel,volts,amps', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    if rows.is_empty() {
        eyre::bail!("calibration CSV {:?} has no rows", path);
    }

    fit_rows(&rows)
}

#[inline]
fn non_negative(x: f64) -> bool {
    x.is_finite() && x >= 0.0
}

impl Config {
    /// Replace channel gain/offset with fitted values. Every calibrated
    /// channel must exist in the config.
    pub fn apply_calibration(&mut self, cal: &CalibrationSet) -> eyre::Result<()> {
        for (id, c) in cal {
            let Some(ch) = self.channels.iter_mut().find(|ch| &ch.id == id) else {
                eyre::bail!("calibration references unknown channel '{id}'");
            };
            ch.amp_per_volt = c.amp_per_volt;
            ch.offset_a = c.offset_a;
        }
        Ok(())
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Channels
        if self.channels.is_empty() {
            eyre::bail!("at least one [[channels]] entry is required");
        }
        let mut ids = std::collections::BTreeSet::new();
        let mut inputs = std::collections::BTreeSet::new();
        for ch in &self.channels {
            if ch.id.trim().is_empty() {
                eyre::bail!("channels.id must not be empty");
            }
            if !ids.insert(ch.id.as_str()) {
                eyre::bail!("duplicate channel id '{}'", ch.id);
            }
            if !inputs.insert(ch.analog_input) {
                eyre::bail!("analog_input {} is used by more than one channel", ch.analog_input);
            }
            if !ch.amp_per_volt.is_finite() || ch.amp_per_volt == 0.0 {
                eyre::bail!("channel '{}': amp_per_volt must be finite and non-zero", ch.id);
            }
            if !ch.offset_a.is_finite() {
                eyre::bail!("channel '{}': offset_a must be finite", ch.id);
            }
            if !(0.0..=1000.0).contains(&ch.diff_alarm_pct) {
                eyre::bail!("channel '{}': diff_alarm_pct must be in [0, 1000]", ch.id);
            }
        }

        // Acquisition
        if self.acquisition.period_ms == 0 {
            eyre::bail!("acquisition.period_ms must be >= 1");
        }
        if self.acquisition.window == 0 {
            eyre::bail!("acquisition.window must be >= 1");
        }
        if self.acquisition.window > 10_000 {
            eyre::bail!("acquisition.window is unreasonably large (>10000)");
        }
        if self.acquisition.retry_limit == 0 {
            eyre::bail!("acquisition.retry_limit must be >= 1");
        }
        if self.acquisition.backoff_ms > 60 * 1000 {
            eyre::bail!("acquisition.backoff_ms is unreasonably large (>60s)");
        }
        if !non_negative(self.acquisition.low_current_cutoff_a) {
            eyre::bail!("acquisition.low_current_cutoff_a must be >= 0");
        }
        if !(0.0..=100.0).contains(&self.acquisition.quality_gate_pct) {
            eyre::bail!("acquisition.quality_gate_pct must be in [0, 100]");
        }

        // Anomaly
        if !non_negative(self.anomaly.low_activity_cutoff_a) {
            eyre::bail!("anomaly.low_activity_cutoff_a must be >= 0");
        }
        if !non_negative(self.anomaly.high_magnitude_cutoff_a) {
            eyre::bail!("anomaly.high_magnitude_cutoff_a must be >= 0");
        }

        // Alarm
        if self.alarm.silence_secs > 24 * 60 * 60 {
            eyre::bail!("alarm.silence_secs is unreasonably large (>24h)");
        }
        if self.alarm.on_ms == 0 || self.alarm.off_ms == 0 {
            eyre::bail!("alarm.on_ms and alarm.off_ms must be >= 1");
        }
        if !self.alarm.high_temp_c.is_finite() {
            eyre::bail!("alarm.high_temp_c must be finite");
        }

        // Button
        if self.button.poll_ms == 0 {
            eyre::bail!("button.poll_ms must be >= 1");
        }
        if self.button.debounce_n == 0 {
            eyre::bail!("button.debounce_n must be >= 1");
        }
        if self.button.hold_ms <= self.button.poll_ms {
            eyre::bail!("button.hold_ms must be greater than button.poll_ms");
        }

        // Control
        if self.control.tick_ms == 0 {
            eyre::bail!("control.tick_ms must be >= 1");
        }
        if self.control.temperature_every_n == 0 {
            eyre::bail!("control.temperature_every_n must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_stock_setup() {
        let cfg = load_toml("").expect("parse");
        assert_eq!(cfg.channels.len(), 3);
        assert_eq!(cfg.channels[0].offset_a, 1.453);
        assert_eq!(cfg.acquisition.retry_limit, 10);
        assert_eq!(cfg.alarm.silence_secs, 1800);
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn exact_line_fits_without_refit() {
        let pts = [(0.0, 1.0), (1.0, 23.0), (2.0, 45.0)];
        let c = ChannelCalibration::from_points(&pts).unwrap();
        assert!((c.amp_per_volt - 22.0).abs() < 1e-9);
        assert!((c.offset_a - 1.0).abs() < 1e-9);
    }

    #[test]
    fn robust_refit_ignores_outlier() {
        let mut pts: Vec<(f64, f64)> = (0..10).map(|i| (i as f64 * 0.1, i as f64 * 2.2)).collect();
        pts[5].1 += 40.0;
        let c = ChannelCalibration::from_points(&pts).unwrap();
        assert!((c.amp_per_volt - 22.0).abs() < 1e-6, "slope {}", c.amp_per_volt);
        assert!(c.offset_a.abs() < 1e-6);
    }

    #[test]
    fn apply_calibration_rejects_unknown_channel() {
        let mut cfg = Config::default();
        let mut set = CalibrationSet::new();
        set.insert(
            "9".into(),
            ChannelCalibration {
                amp_per_volt: 30.0,
                offset_a: 0.0,
            },
        );
        assert!(cfg.apply_calibration(&set).is_err());
    }
}
