//! Capability traits for the sensor monitor.
//!
//! Everything the core touches on the outside world goes through one of
//! these traits, so simulated implementations can stand in for the analog
//! bus, battery telemetry, buzzer and alarm button.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Error type used at every capability boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Battery telemetry (e.g. a battery monitor published on the device bus).
pub trait TelemetrySource {
    /// Returns `(voltage_v, current_a)` of the reference battery.
    fn read(&mut self) -> Result<(f64, f64), BoxError>;
}

/// Multi-channel analog input (an ADC on a shared bus).
pub trait AnalogChannelSource {
    /// (Re)establish the bus connection. Called while disconnected.
    fn connect(&mut self) -> Result<(), BoxError>;
    /// Read the voltage currently present on analog input `input`.
    fn read_channel(&mut self, input: u8) -> Result<f64, BoxError>;
}

/// Buzzer-like actuator.
pub trait Actuator {
    /// Start beeping `on`/`off`; `repeat == None` keeps going until `stop()`.
    fn start_pattern(
        &mut self,
        on: std::time::Duration,
        off: std::time::Duration,
        repeat: Option<u32>,
    ) -> Result<(), BoxError>;
    fn stop(&mut self) -> Result<(), BoxError>;
    fn is_active(&self) -> bool;
}

/// Momentary push button used to silence and test alarms.
pub trait Button {
    fn is_pressed(&mut self) -> Result<bool, BoxError>;
}

/// One decoded temperature reading handed over by a BLE, 1-wire or CPU source.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureReading {
    pub id: String,
    /// `None` when the sensor is present but produced no usable value.
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
}

/// Source of already-decoded temperature readings.
pub trait TemperatureSource {
    fn read_temperatures(&mut self) -> Result<Vec<TemperatureReading>, BoxError>;
}

// Boxed capabilities, so backends can be picked at runtime.

impl<T: TelemetrySource + ?Sized> TelemetrySource for Box<T> {
    fn read(&mut self) -> Result<(f64, f64), BoxError> {
        (**self).read()
    }
}

impl<T: AnalogChannelSource + ?Sized> AnalogChannelSource for Box<T> {
    fn connect(&mut self) -> Result<(), BoxError> {
        (**self).connect()
    }
    fn read_channel(&mut self, input: u8) -> Result<f64, BoxError> {
        (**self).read_channel(input)
    }
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn start_pattern(
        &mut self,
        on: std::time::Duration,
        off: std::time::Duration,
        repeat: Option<u32>,
    ) -> Result<(), BoxError> {
        (**self).start_pattern(on, off, repeat)
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        (**self).stop()
    }
    fn is_active(&self) -> bool {
        (**self).is_active()
    }
}

impl<T: Button + ?Sized> Button for Box<T> {
    fn is_pressed(&mut self) -> Result<bool, BoxError> {
        (**self).is_pressed()
    }
}

impl<T: TemperatureSource + ?Sized> TemperatureSource for Box<T> {
    fn read_temperatures(&mut self) -> Result<Vec<TemperatureReading>, BoxError> {
        (**self).read_temperatures()
    }
}
