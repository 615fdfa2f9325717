//! `From` implementations bridging `sensmon_config` types to `sensmon_core` types.

use std::time::Duration;

use crate::calibration::Calibration;
use crate::config::{AcquisitionCfg, AlarmCfg, AnomalyCfg, ButtonCfg, ChannelCfg, ThresholdCfg};

// ── Channels ─────────────────────────────────────────────────────────────────

impl From<&sensmon_config::ChannelCfg> for ChannelCfg {
    fn from(c: &sensmon_config::ChannelCfg) -> Self {
        Self {
            id: c.id.clone(),
            input: c.analog_input,
            calibration: Calibration {
                amp_per_volt: c.amp_per_volt,
                offset_a: c.offset_a,
            },
        }
    }
}

impl From<&sensmon_config::ChannelCalibration> for Calibration {
    fn from(c: &sensmon_config::ChannelCalibration) -> Self {
        Self {
            amp_per_volt: c.amp_per_volt,
            offset_a: c.offset_a,
        }
    }
}

// ── AcquisitionCfg ───────────────────────────────────────────────────────────

impl From<&sensmon_config::Acquisition> for AcquisitionCfg {
    fn from(c: &sensmon_config::Acquisition) -> Self {
        Self {
            period: Duration::from_millis(c.period_ms),
            window: c.window,
            retry_limit: c.retry_limit,
            backoff: Duration::from_millis(c.backoff_ms),
            low_current_cutoff_a: c.low_current_cutoff_a,
            quality_gate_pct: c.quality_gate_pct,
        }
    }
}

// ── AnomalyCfg ───────────────────────────────────────────────────────────────

impl From<&sensmon_config::Anomaly> for AnomalyCfg {
    fn from(c: &sensmon_config::Anomaly) -> Self {
        Self {
            low_activity_cutoff: c.low_activity_cutoff_a,
            high_magnitude_cutoff: c.high_magnitude_cutoff_a,
        }
    }
}

// ── AlarmCfg ─────────────────────────────────────────────────────────────────

impl From<&sensmon_config::Alarm> for AlarmCfg {
    fn from(c: &sensmon_config::Alarm) -> Self {
        Self {
            silence: Duration::from_secs(c.silence_secs),
            beep_on: Duration::from_millis(c.on_ms),
            beep_off: Duration::from_millis(c.off_ms),
        }
    }
}

// ── ThresholdCfg ─────────────────────────────────────────────────────────────

impl From<&sensmon_config::Config> for ThresholdCfg {
    fn from(c: &sensmon_config::Config) -> Self {
        Self {
            diff_alarm_pct: c
                .channels
                .iter()
                .map(|ch| (ch.id.clone(), ch.diff_alarm_pct))
                .collect(),
            high_temp_c: c.alarm.high_temp_c,
            high_temp_overrides: c.alarm.high_temp_overrides.clone(),
        }
    }
}

// ── ButtonCfg ────────────────────────────────────────────────────────────────

impl From<&sensmon_config::ButtonCfg> for ButtonCfg {
    fn from(c: &sensmon_config::ButtonCfg) -> Self {
        Self {
            hold: Duration::from_millis(c.hold_ms),
            poll: Duration::from_millis(c.poll_ms),
            debounce_n: c.debounce_n,
        }
    }
}
