use rstest::rstest;
use sensmon_config::load_toml;

const BASE: &str = r#"
[[channels]]
id = "port"
analog_input = 1
amp_per_volt = 22.0
offset_a = 1.453

[[channels]]
id = "starboard"
analog_input = 2
offset_a = -0.847
diff_alarm_pct = 0

[acquisition]
period_ms = 100
window = 10
retry_limit = 10
backoff_ms = 1000

[anomaly]
low_activity_cutoff_a = 2.0
high_magnitude_cutoff_a = 3.0

[alarm]
silence_secs = 1800
high_temp_c = 70.0

[alarm.high_temp_overrides]
rpi = 80.0
"#;

#[test]
fn accepts_full_config() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.channels.len(), 2);
    assert_eq!(cfg.channels[1].amp_per_volt, 22.0);
    assert_eq!(cfg.channels[1].diff_alarm_pct, 0.0);
    assert_eq!(cfg.alarm.high_temp_overrides.get("rpi"), Some(&80.0));
    // Untouched sections fall back to defaults
    assert_eq!(cfg.button.hold_ms, 3000);
    assert_eq!(cfg.pins.buzzer, 20);
}

#[rstest]
#[case("[acquisition]\nperiod_ms = 0", "period_ms must be >= 1")]
#[case("[acquisition]\nwindow = 0", "window must be >= 1")]
#[case("[acquisition]\nretry_limit = 0", "retry_limit must be >= 1")]
#[case("[acquisition]\nquality_gate_pct = 120.0", "quality_gate_pct must be in [0, 100]")]
#[case("[anomaly]\nlow_activity_cutoff_a = -1.0", "low_activity_cutoff_a must be >= 0")]
#[case("[alarm]\non_ms = 0", "on_ms and alarm.off_ms must be >= 1")]
#[case("[button]\nhold_ms = 10\npoll_ms = 20", "hold_ms must be greater")]
#[case("[control]\ntick_ms = 0", "tick_ms must be >= 1")]
#[case("[logging]\nrotation = \"weekly\"", "rotation must be one of")]
#[case("channels = []", "at least one [[channels]]")]
fn rejects_out_of_range(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[test]
fn rejects_duplicate_channel_ids_and_inputs() {
    let dup_id = r#"
[[channels]]
id = "a"
analog_input = 1
[[channels]]
id = "a"
analog_input = 2
"#;
    let err = load_toml(dup_id).unwrap().validate().unwrap_err();
    assert!(format!("{err}").contains("duplicate channel id"));

    let dup_input = r#"
[[channels]]
id = "a"
analog_input = 1
[[channels]]
id = "b"
analog_input = 1
"#;
    let err = load_toml(dup_input).unwrap().validate().unwrap_err();
    assert!(format!("{err}").contains("used by more than one channel"));
}

#[test]
fn rejects_zero_gain() {
    let toml = r#"
[[channels]]
id = "a"
analog_input = 1
amp_per_volt = 0.0
"#;
    let err = load_toml(toml).unwrap().validate().unwrap_err();
    assert!(format!("{err}").contains("amp_per_volt"));
}
