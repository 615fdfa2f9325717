use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("analog bus error: {0}")]
    Bus(String),
    #[error("analog bus not connected")]
    NotConnected,
    #[error("telemetry unavailable: {0}")]
    Telemetry(String),
    #[error("sensor read timeout")]
    Timeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
