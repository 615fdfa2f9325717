//! Runtime configuration types for the monitoring core.
//!
//! These are the structs used by the acquisition loop, evaluator and alarm
//! coordinator. They are separate from the TOML-deserialized config in
//! `sensmon_config`; see `conversions` for the mapping.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::calibration::Calibration;
use crate::smoothing::DEFAULT_QUALITY_GATE;

/// Deviation (percent) that alarms a channel without its own threshold.
pub const DEFAULT_DIFF_ALARM_PCT: f64 = 50.0;
/// High-temperature threshold (°C) for sources without an override.
pub const DEFAULT_HIGH_TEMP_C: f64 = 70.0;

/// One current-sensor channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCfg {
    pub id: String,
    /// ADC input number handed to `AnalogChannelSource::read_channel`.
    pub input: u8,
    pub calibration: Calibration,
}

impl ChannelCfg {
    pub fn new(id: impl Into<String>, input: u8, calibration: Calibration) -> Self {
        Self {
            id: id.into(),
            input,
            calibration,
        }
    }
}

/// Acquisition loop cadence, smoothing and reconnect policy.
#[derive(Debug, Clone)]
pub struct AcquisitionCfg {
    /// Pause between sampling ticks.
    pub period: Duration,
    /// Samples per smoothing window.
    pub window: usize,
    /// Consecutive failed connects before the loop gives up.
    pub retry_limit: u32,
    /// Pause after a failed connect.
    pub backoff: Duration,
    /// Battery current (A) below which channels are not sampled. 0.0 disables.
    pub low_current_cutoff_a: f64,
    /// Mean quality (percent) required to expose a smoothed value.
    pub quality_gate_pct: f64,
}

impl Default for AcquisitionCfg {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            window: 10,
            retry_limit: 10,
            backoff: Duration::from_secs(1),
            low_current_cutoff_a: 1.0,
            quality_gate_pct: DEFAULT_QUALITY_GATE,
        }
    }
}

/// Skip rules for the deviation evaluator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyCfg {
    /// Mean |value| across channels below which deviations are not trusted.
    pub low_activity_cutoff: f64,
    /// A single |value| above this still alarms (forced 100%) while activity is low.
    pub high_magnitude_cutoff: f64,
}

impl Default for AnomalyCfg {
    fn default() -> Self {
        Self {
            low_activity_cutoff: 2.0,
            high_magnitude_cutoff: 3.0,
        }
    }
}

/// Alarm coordinator timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmCfg {
    /// Re-trigger suppression after a source is armed or silenced.
    pub silence: Duration,
    pub beep_on: Duration,
    pub beep_off: Duration,
}

impl Default for AlarmCfg {
    fn default() -> Self {
        Self {
            silence: Duration::from_secs(30 * 60),
            beep_on: Duration::from_millis(250),
            beep_off: Duration::from_millis(250),
        }
    }
}

/// Thresholds used by the control tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdCfg {
    /// Deviation (percent) per channel id; 0 disables the channel's alarm.
    pub diff_alarm_pct: BTreeMap<String, f64>,
    /// High-temperature threshold for sources without an override.
    pub high_temp_c: f64,
    pub high_temp_overrides: BTreeMap<String, f64>,
}

impl Default for ThresholdCfg {
    fn default() -> Self {
        Self {
            diff_alarm_pct: BTreeMap::new(),
            high_temp_c: DEFAULT_HIGH_TEMP_C,
            high_temp_overrides: BTreeMap::new(),
        }
    }
}

impl ThresholdCfg {
    /// Diff threshold for a channel; unknown channels use `DEFAULT_DIFF_ALARM_PCT`.
    pub fn diff_threshold(&self, id: &str) -> f64 {
        self.diff_alarm_pct
            .get(id)
            .copied()
            .unwrap_or(DEFAULT_DIFF_ALARM_PCT)
    }

    pub fn high_temp_threshold(&self, id: &str) -> f64 {
        self.high_temp_overrides
            .get(id)
            .copied()
            .unwrap_or(self.high_temp_c)
    }
}

/// Alarm button gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonCfg {
    pub hold: Duration,
    pub poll: Duration,
    pub debounce_n: u8,
}

impl Default for ButtonCfg {
    fn default() -> Self {
        Self {
            hold: Duration::from_secs(3),
            poll: Duration::from_millis(20),
            debounce_n: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_fall_back_to_stock_values() {
        let mut t = ThresholdCfg::default();
        t.diff_alarm_pct.insert("2".into(), 0.0);
        t.high_temp_overrides.insert("cpu".into(), 85.0);
        assert_eq!(t.diff_threshold("1"), DEFAULT_DIFF_ALARM_PCT);
        assert_eq!(t.diff_threshold("2"), 0.0);
        assert_eq!(t.high_temp_threshold("28-0001"), DEFAULT_HIGH_TEMP_C);
        assert_eq!(t.high_temp_threshold("cpu"), 85.0);
    }

    #[test]
    fn stock_thresholds_match_config_file_defaults() {
        let file = sensmon_config::Config::default();
        assert!(
            file.channels
                .iter()
                .all(|c| c.diff_alarm_pct == DEFAULT_DIFF_ALARM_PCT)
        );
        assert_eq!(file.alarm.high_temp_c, DEFAULT_HIGH_TEMP_C);
        assert_eq!(AcquisitionCfg::default().quality_gate_pct, DEFAULT_QUALITY_GATE);
    }
}
