use std::sync::{Arc, Mutex};

use sensmon_core::acquisition::{ChannelSnapshot, Snapshot};
use sensmon_core::alarm::{AlarmCheck, AlarmCoordinator};
use sensmon_core::config::{AlarmCfg, AnomalyCfg, ThresholdCfg};
use sensmon_core::control::ControlTick;
use sensmon_core::mocks::SpyActuator;
use sensmon_hardware::SimulatedTemperatures;
use sensmon_traits::clock::test_clock::TestClock;
use sensmon_traits::{Actuator, TemperatureReading, TemperatureSource};

type Tick = ControlTick<SpyActuator, TestClock>;

fn control(thresholds: ThresholdCfg) -> Tick {
    let alarm = AlarmCoordinator::with_clock(SpyActuator::new(), AlarmCfg::default(), TestClock::new());
    ControlTick::new(Arc::new(Mutex::new(alarm)), AnomalyCfg::default(), thresholds)
}

fn snap(entries: &[(&str, Option<f64>)], baseline: f64) -> Snapshot {
    entries
        .iter()
        .map(|&(id, value)| {
            (
                id.to_string(),
                ChannelSnapshot {
                    value,
                    quality: if value.is_some() { 100.0 } else { 0.0 },
                    baseline,
                    reference_voltage: 13.0,
                },
            )
        })
        .collect()
}

fn reading(id: &str, t: Option<f64>) -> TemperatureReading {
    TemperatureReading {
        id: id.to_string(),
        temperature_c: t,
        humidity_pct: None,
    }
}

#[test]
fn deviating_channel_raises_alarm() {
    let mut c = control(ThresholdCfg::default());
    let checks = c.tick_currents(&snap(&[("1", Some(8.0)), ("2", Some(4.0)), ("3", Some(4.5))], 4.0));
    let armed: Vec<_> = checks
        .iter()
        .filter(|(_, chk)| *chk == AlarmCheck::Armed)
        .map(|(ev, _)| ev.channel_id.as_str())
        .collect();
    assert_eq!(armed, ["1"]);
    let alarm = c.alarm_handle();
    assert!(alarm.lock().unwrap().actuator().is_active());
}

#[test]
fn disabled_channel_is_never_checked() {
    let thresholds = ThresholdCfg {
        diff_alarm_pct: [("1".to_string(), 0.0)].into_iter().collect(),
        ..ThresholdCfg::default()
    };
    let mut c = control(thresholds);
    let checks = c.tick_currents(&snap(&[("1", Some(20.0)), ("2", Some(4.0))], 4.0));
    assert!(checks.iter().all(|(ev, _)| ev.channel_id != "1"));
    assert!(c.alarm_handle().lock().unwrap().active_sources().is_empty());
}

#[test]
fn registry_tracks_current_sources() {
    let mut c = control(ThresholdCfg::default());
    c.tick_currents(&snap(&[("1", Some(4.0)), ("2", Some(5.0))], 4.5));
    c.tick_currents(&snap(&[("1", Some(6.0)), ("2", None)], 4.5));
    let one = c.currents().get("1").unwrap();
    assert!(one.connected);
    assert_eq!(one.max_value, 6.0);
    let two = c.currents().get("2").unwrap();
    assert!(!two.connected);
    assert_eq!(two.max_value, 5.0);
}

#[test]
fn hot_sensor_alarms_and_missing_sensor_disconnects() {
    let thresholds = ThresholdCfg {
        high_temp_overrides: [("rpi".to_string(), 80.0)].into_iter().collect(),
        ..ThresholdCfg::default()
    };
    let mut c = control(thresholds);
    let checks = c.tick_temperatures(&[
        reading("28-0001", Some(72.0)),
        reading("rpi", Some(75.0)),
        reading("ble-a4c1", None),
    ]);
    assert_eq!(
        checks,
        [
            ("28-0001".to_string(), AlarmCheck::Armed),
            ("rpi".to_string(), AlarmCheck::Normal),
            ("ble-a4c1".to_string(), AlarmCheck::Ignored),
        ]
    );

    c.tick_temperatures(&[reading("rpi", Some(50.0))]);
    assert!(!c.temperatures().get("28-0001").unwrap().connected);
    assert!(c.temperatures().get("rpi").unwrap().connected);
    assert_eq!(c.temperatures().len(), 3);
}

#[test]
fn polls_a_temperature_source() {
    let mut c = control(ThresholdCfg::default());
    let mut temps = SimulatedTemperatures::new();
    temps.set("28-0001", Some(21.0));
    let checks = c.poll_temperatures(&mut temps as &mut dyn TemperatureSource);
    assert_eq!(checks, [("28-0001".to_string(), AlarmCheck::Normal)]);
}
