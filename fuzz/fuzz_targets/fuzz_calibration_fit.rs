#![no_main]
use libfuzzer_sys::fuzz_target;
use sensmon_config::ChannelCalibration;

fuzz_target!(|pts: Vec<(f64, f64)>| {
    // Degenerate, non-finite or unsorted points must be rejected, never panic
    if let Ok(cal) = ChannelCalibration::from_points(&pts) {
        assert!(cal.amp_per_volt.is_finite());
        assert!(cal.offset_a.is_finite());
    }
});
