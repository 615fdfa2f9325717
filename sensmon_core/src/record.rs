//! Per-tick sample records for an external logging collaborator.
//!
//! The core only produces `SampleRecord`s; where and how they are persisted
//! is up to the `RecordSink` implementation.

use std::collections::BTreeMap;
use std::time::SystemTime;

/// Placeholder for values that could not be read this tick.
pub const ERROR_VALUE: f64 = -999.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelRecord {
    /// Voltage at the ADC input.
    pub raw_voltage: f64,
    /// Calibrated current of this tick.
    pub raw_current: f64,
    /// Gated moving average after this tick.
    pub smoothed_current: f64,
}

impl Default for ChannelRecord {
    fn default() -> Self {
        Self {
            raw_voltage: ERROR_VALUE,
            raw_current: ERROR_VALUE,
            smoothed_current: ERROR_VALUE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub timestamp: SystemTime,
    pub reference_current: f64,
    pub reference_voltage: f64,
    pub channels: BTreeMap<String, ChannelRecord>,
}

/// Append-only consumer of sample records.
pub trait RecordSink {
    fn record(&mut self, rec: &SampleRecord) -> std::io::Result<()>;
    /// Push out anything buffered. Called once when the loop stops.
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn record(&mut self, _rec: &SampleRecord) -> std::io::Result<()> {
        Ok(())
    }
}

/// Emits every record as a `tracing` event at TRACE level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn record(&mut self, rec: &SampleRecord) -> std::io::Result<()> {
        for (id, ch) in &rec.channels {
            tracing::trace!(
                target: "sensmon::samples",
                channel = %id,
                reference_current = rec.reference_current,
                reference_voltage = rec.reference_voltage,
                raw_voltage = ch.raw_voltage,
                raw_current = ch.raw_current,
                smoothed_current = ch.smoothed_current,
                "sample"
            );
        }
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn record(&mut self, rec: &SampleRecord) -> std::io::Result<()> {
        (**self).record(rec)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        (**self).flush()
    }
}
