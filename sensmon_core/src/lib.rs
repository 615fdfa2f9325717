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
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core monitoring logic (hardware-agnostic).
//!
//! All hardware interactions go through the capability traits in
//! `sensmon_traits`.
//!
//! ## Architecture
//!
//! - **Smoothing**: quality-gated moving average per channel (`smoothing`)
//! - **Acquisition**: background sampling thread with bus reconnect policy (`acquisition`)
//! - **Anomaly**: baseline-relative deviation with low-activity skip rules (`anomaly`)
//! - **Alarm**: per-source alarm state with silence windows (`alarm`)
//! - **Control**: the periodic evaluate-and-alarm cycle and source registry (`control`, `registry`)
//! - **Button**: press/hold decoding for the alarm button (`button`)
//!
//! ## Data flow
//!
//! The acquisition thread runs on its own. A control tick takes a
//! `snapshot()`, passes it through `anomaly::evaluate` and calls
//! `AlarmCoordinator::check_value` per channel.

pub mod acquisition;
pub mod alarm;
pub mod anomaly;
pub mod button;
pub mod calibration;
pub mod config;
pub mod control;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod record;
pub mod registry;
pub mod smoothing;
pub mod status;

pub use acquisition::{AcquisitionLoop, ChannelSnapshot, Snapshot};
pub use alarm::{AlarmCheck, AlarmCoordinator, AlarmInput};
pub use anomaly::{Evaluation, deviation_percent, evaluate};
pub use button::{ButtonGesture, ButtonWatcher, Gesture};
pub use calibration::Calibration;
pub use control::ControlTick;
pub use error::{AcquisitionFault, AlarmInputError, BuildError, MonitorError, Report, Result};
pub use record::{ERROR_VALUE, NullSink, RecordSink, SampleRecord, TracingSink};
pub use registry::{MonitoredSource, Registry, SourceKind};
pub use smoothing::SmoothedChannel;
pub use status::{BusState, BusStatus};
