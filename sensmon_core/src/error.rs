use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum MonitorError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("analog bus disconnected")]
    BusDisconnected,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing telemetry source")]
    MissingTelemetry,
    #[error("missing analog channel source")]
    MissingAnalog,
    #[error("no channels configured")]
    NoChannels,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Terminal condition reported by the acquisition loop to its owner.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionFault {
    #[error("analog bus unavailable after {attempts} consecutive connect attempts")]
    PermanentBusFailure { attempts: u32 },
}

/// Why an alarm check was ignored.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlarmInputError {
    #[error("{0} is missing or empty")]
    Missing(&'static str),
    #[error("{field} '{raw}' is not a number")]
    NotANumber { field: &'static str, raw: String },
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
