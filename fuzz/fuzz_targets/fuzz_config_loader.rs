#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are both fine; panics are not.
    if let Ok(mut cfg) = sensmon_config::load_toml(data) {
        let _ = cfg.validate();
        // Calibrating with an empty set must leave a valid config valid
        let _ = cfg.apply_calibration(&sensmon_config::CalibrationSet::default());
    }
});
