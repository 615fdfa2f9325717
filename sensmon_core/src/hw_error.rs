//! Maps `Box<dyn Error>` from trait boundaries to typed `MonitorError`.
//!
//! The traits in `sensmon_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `sensmon_hardware::HwError` downcasting.

use crate::error::MonitorError;

/// Map a trait-boundary error to a typed `MonitorError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> MonitorError {
    #[cfg(feature = "hardware-errors")]
    {
        use sensmon_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => MonitorError::Timeout,
                HwError::NotConnected | HwError::Bus(_) => MonitorError::BusDisconnected,
                HwError::Io(io) => MonitorError::Io(io.to_string()),
                other => MonitorError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        MonitorError::Timeout
    } else {
        MonitorError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_fallback_detects_timeouts() {
        let e = std::io::Error::other("i2c transfer timed out");
        assert!(matches!(map_hw_error(&e), MonitorError::Timeout));
        let e = std::io::Error::other("remote I/O error");
        assert!(matches!(map_hw_error(&e), MonitorError::Hardware(_)));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_errors_are_downcast() {
        use sensmon_hardware::error::HwError;
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(HwError::Bus("nack".into()));
        assert!(matches!(
            map_hw_error(boxed.as_ref()),
            MonitorError::BusDisconnected
        ));
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(HwError::Gpio("busy".into()));
        assert!(matches!(
            map_hw_error(boxed.as_ref()),
            MonitorError::HardwareFault(_)
        ));
    }
}
