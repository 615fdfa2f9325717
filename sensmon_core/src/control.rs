//! The periodic control cycle: evaluate the latest snapshot and temperature
//! readings and feed the results to the alarm coordinator.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sensmon_traits::{Actuator, Clock, MonotonicClock, TemperatureReading, TemperatureSource};

use crate::acquisition::Snapshot;
use crate::alarm::{AlarmCheck, AlarmCoordinator};
use crate::anomaly::{Evaluation, evaluate};
use crate::config::{AnomalyCfg, ThresholdCfg};
use crate::registry::{MonitoredSource, Registry, SourceKind};

pub struct ControlTick<A: Actuator, C: Clock = MonotonicClock> {
    alarm: Arc<Mutex<AlarmCoordinator<A, C>>>,
    anomaly: AnomalyCfg,
    thresholds: ThresholdCfg,
    currents: Registry<MonitoredSource>,
    temperatures: Registry<MonitoredSource>,
}

impl<A: Actuator, C: Clock> ControlTick<A, C> {
    pub fn new(
        alarm: Arc<Mutex<AlarmCoordinator<A, C>>>,
        anomaly: AnomalyCfg,
        thresholds: ThresholdCfg,
    ) -> Self {
        Self {
            alarm,
            anomaly,
            thresholds,
            currents: Registry::new(),
            temperatures: Registry::new(),
        }
    }

    fn alarm(&self) -> MutexGuard<'_, AlarmCoordinator<A, C>> {
        self.alarm.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shared handle to the coordinator (e.g. for the button watcher).
    pub fn alarm_handle(&self) -> Arc<Mutex<AlarmCoordinator<A, C>>> {
        self.alarm.clone()
    }

    /// Update the current-source registry from `snapshot` and check every
    /// evaluated channel against its diff threshold.
    pub fn tick_currents(&mut self, snapshot: &Snapshot) -> Vec<(Evaluation, AlarmCheck)> {
        for (id, ch) in snapshot {
            let src = self
                .currents
                .get_or_insert_with(id, || MonitoredSource::new(SourceKind::DcSource));
            match ch.value {
                Some(v) => src.update(id, Some(v)),
                None => src.disconnect(id),
            }
        }
        self.currents
            .prune_absent(snapshot.keys().map(String::as_str), |id, s| s.disconnect(id));

        let evaluations = evaluate(snapshot, &self.thresholds, &self.anomaly);
        let mut alarm = self.alarm();
        evaluations
            .into_iter()
            .map(|ev| {
                tracing::debug!(
                    channel = %ev.channel_id,
                    deviation = ev.deviation_percent,
                    threshold = ev.threshold,
                    forced = ev.forced,
                    "channel deviation"
                );
                let check = alarm.check_value(ev.deviation_percent, ev.threshold, &ev.channel_id);
                (ev, check)
            })
            .collect()
    }

    /// Update the temperature registry and check each reading against its
    /// high-temperature threshold. Sources missing from `readings` are
    /// marked disconnected.
    pub fn tick_temperatures(&mut self, readings: &[TemperatureReading]) -> Vec<(String, AlarmCheck)> {
        let mut alarm = self.alarm.lock().unwrap_or_else(PoisonError::into_inner);
        let mut checks = Vec::with_capacity(readings.len());
        for r in readings {
            self.temperatures
                .get_or_insert_with(&r.id, || MonitoredSource::new(SourceKind::Temperature))
                .update(&r.id, r.temperature_c);
            let threshold = self.thresholds.high_temp_threshold(&r.id);
            checks.push((r.id.clone(), alarm.check_value(r.temperature_c, threshold, &r.id)));
        }
        drop(alarm);
        self.temperatures
            .prune_absent(readings.iter().map(|r| r.id.as_str()), |id, s| s.disconnect(id));
        checks
    }

    /// Read `source` and run `tick_temperatures`. A failed read is logged and
    /// leaves every source untouched.
    pub fn poll_temperatures(&mut self, source: &mut dyn TemperatureSource) -> Vec<(String, AlarmCheck)> {
        match source.read_temperatures() {
            Ok(readings) => self.tick_temperatures(&readings),
            Err(e) => {
                tracing::warn!(error = %e, "temperature read failed");
                Vec::new()
            }
        }
    }

    pub fn currents(&self) -> &Registry<MonitoredSource> {
        &self.currents
    }

    pub fn temperatures(&self) -> &Registry<MonitoredSource> {
        &self.temperatures
    }
}
