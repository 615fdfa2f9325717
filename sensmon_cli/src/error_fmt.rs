//! Human-readable error descriptions and structured JSON error formatting.

/// Exit code for a permanently lost analog bus.
pub const EXIT_BUS_FAILURE: i32 = 3;
/// Exit code for invalid configuration or calibration.
pub const EXIT_CONFIG: i32 = 2;
/// Exit code for a monitor that could not be assembled.
pub const EXIT_BUILD: i32 = 4;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use sensmon_core::error::{AcquisitionFault, BuildError, MonitorError};

    // Typed matches first
    if let Some(AcquisitionFault::PermanentBusFailure { attempts }) = err.downcast_ref::<AcquisitionFault>() {
        return format!(
            "What happened: The analog bus could not be reached after {attempts} connect attempts; monitoring stopped.\nLikely causes: ADC not powered, loose I2C wiring, or a wrong bus address.\nHow to fix: Check the sensor board wiring and power, then restart. Raise acquisition.retry_limit if the bus is slow to come up."
        );
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingTelemetry => {
                "What happened: No battery telemetry source was provided to the monitor.\nLikely causes: The battery monitor backend failed to initialize.\nHow to fix: Ensure a telemetry source is created and passed via with_telemetry(...).".to_string()
            }
            BuildError::MissingAnalog => {
                "What happened: No analog channel source was provided to the monitor.\nLikely causes: The ADC backend failed to initialize.\nHow to fix: Ensure the analog source is created and passed via with_analog(...).".to_string()
            }
            BuildError::NoChannels => {
                "What happened: No channels are configured.\nLikely causes: The config has no [[channels]] entries.\nHow to fix: Add at least one [[channels]] table to the config.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(me) = err.downcast_ref::<MonitorError>() {
        return match me {
            MonitorError::Config(msg) => format!(
                "What happened: Configuration is invalid: {msg}.\nHow to fix: Edit the TOML config or calibration CSV and try again."
            ),
            MonitorError::BusDisconnected => format!(
                "What happened: {me}.\nLikely causes: ADC not responding on the bus.\nHow to fix: Check wiring and power of the sensor board."
            ),
            MonitorError::Timeout => {
                "What happened: A sensor read timed out.\nLikely causes: Device busy or not powered.\nHow to fix: Check the device and retry.".to_string()
            }
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from config loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'channel,volts,amps'.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: bus failure 3, config 2, build 4, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use sensmon_core::error::{AcquisitionFault, BuildError, MonitorError};
    if err.downcast_ref::<AcquisitionFault>().is_some() {
        return EXIT_BUS_FAILURE;
    }
    if let Some(MonitorError::Config(_)) = err.downcast_ref::<MonitorError>() {
        return EXIT_CONFIG;
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return EXIT_BUILD;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    use sensmon_core::error::{AcquisitionFault, BuildError, MonitorError};
    if err.downcast_ref::<AcquisitionFault>().is_some() {
        "PermanentBusFailure"
    } else if err.downcast_ref::<BuildError>().is_some() {
        "Build"
    } else if let Some(MonitorError::Config(_)) = err.downcast_ref::<MonitorError>() {
        "Config"
    } else {
        "Error"
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use sensmon_core::error::AcquisitionFault;
    use serde_json::json;

    let msg = humanize(err);
    if let Some(AcquisitionFault::PermanentBusFailure { attempts }) = err.downcast_ref::<AcquisitionFault>() {
        return json!({
            "reason": reason_name(err),
            "details": { "attempts": attempts },
            "message": msg,
        })
        .to_string();
    }
    json!({ "reason": reason_name(err), "message": msg }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensmon_core::error::{AcquisitionFault, MonitorError};

    #[test]
    fn bus_failure_maps_to_exit_3() {
        let err = eyre::Report::from(AcquisitionFault::PermanentBusFailure { attempts: 10 });
        assert_eq!(exit_code_for_error(&err), 3);
        assert!(humanize(&err).contains("after 10 connect attempts"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "PermanentBusFailure");
        assert_eq!(v["details"]["attempts"], 10);
    }

    #[test]
    fn wrapped_config_error_keeps_its_code() {
        use eyre::WrapErr;
        let err = Err::<(), _>(MonitorError::Config("bad".into()))
            .wrap_err("loading config")
            .unwrap_err();
        assert_eq!(exit_code_for_error(&err), 2);
        assert!(humanize(&err).contains("Configuration is invalid: bad"));
    }

    #[test]
    fn unknown_errors_fall_back() {
        let err = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).contains("Original: boom"));
    }
}
