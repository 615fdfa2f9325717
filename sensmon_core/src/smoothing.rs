//! Quality-gated moving average for one sensor channel.
//!
//! Two aligned rings of the same fixed length: calibrated readings and a
//! 0/100 quality score per slot. A failed read only pushes a 0 quality;
//! the stale reading stays in the value ring, so confidence fades over the
//! window instead of the value dropping abruptly to zero.

use std::collections::VecDeque;

/// Quality score of a slot holding a fresh reading.
pub const QUALITY_GOOD: u8 = 100;
/// Quality score pushed for a failed read.
pub const QUALITY_NONE: u8 = 0;
/// Default mean quality (percent) required to expose the average.
pub const DEFAULT_QUALITY_GATE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedChannel {
    buffer: VecDeque<f64>,
    quality: VecDeque<u8>,
    quality_gate: f64,
    baseline_current: f64,
    reference_voltage: f64,
}

impl SmoothedChannel {
    /// New channel with all slots at 0.0 and quality 0. `window_size` is
    /// clamped to at least 1.
    pub fn new(window_size: usize) -> Self {
        Self::with_quality_gate(window_size, DEFAULT_QUALITY_GATE)
    }

    pub fn with_quality_gate(window_size: usize, quality_gate: f64) -> Self {
        let n = window_size.max(1);
        Self {
            buffer: VecDeque::from(vec![0.0; n]),
            quality: VecDeque::from(vec![QUALITY_NONE; n]),
            quality_gate,
            baseline_current: 0.0,
            reference_voltage: 0.0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.buffer.len()
    }

    /// Push a reading (quality 100), or only a quality 0 when `value` is None.
    pub fn update(&mut self, value: Option<f64>) {
        self.quality.pop_front();
        match value {
            Some(v) => {
                self.quality.push_back(QUALITY_GOOD);
                self.buffer.pop_front();
                self.buffer.push_back(v);
            }
            None => self.quality.push_back(QUALITY_NONE),
        }
    }

    /// Fill the whole value ring with `value`; quality is left alone.
    pub fn set(&mut self, value: f64) {
        self.buffer.iter_mut().for_each(|slot| *slot = value);
    }

    /// Mean of the window, or `default` while mean quality is below the gate.
    pub fn get(&self, default: f64) -> f64 {
        self.value().unwrap_or(default)
    }

    /// Mean of the window when it passes the quality gate.
    pub fn value(&self) -> Option<f64> {
        if self.buffer.is_empty() || self.get_quality() < self.quality_gate {
            return None;
        }
        Some(self.buffer.iter().sum::<f64>() / self.buffer.len() as f64)
    }

    /// Mean quality in [0, 100].
    pub fn get_quality(&self) -> f64 {
        if self.quality.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.quality.iter().map(|&q| u32::from(q)).sum();
        f64::from(sum) / self.quality.len() as f64
    }

    /// Record the aggregate context of the latest successful sample.
    pub fn update_context(&mut self, baseline_current: f64, reference_voltage: f64) {
        self.baseline_current = baseline_current;
        self.reference_voltage = reference_voltage;
    }

    pub fn baseline_current(&self) -> f64 {
        self.baseline_current
    }

    pub fn reference_voltage(&self) -> f64 {
        self.reference_voltage
    }

    /// Raw rings, oldest first.
    pub fn readings(&self) -> impl Iterator<Item = f64> + '_ {
        self.buffer.iter().copied()
    }

    pub fn qualities(&self) -> impl Iterator<Item = u8> + '_ {
        self.quality.iter().copied()
    }
}
