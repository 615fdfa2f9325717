//! Per-source alarm state driving a buzzer-like actuator.
//!
//! A source is either normal (no record) or activated with the instant it
//! was last armed or silenced. Re-arming a source inside its silence window
//! is a no-op, so a value hovering around its threshold does not restart
//! the buzzer every tick after the operator acknowledged it.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use sensmon_traits::{Actuator, BoxError, Clock, MonotonicClock};

use crate::config::AlarmCfg;
use crate::error::AlarmInputError;

/// Acknowledgment beep after silencing: one cycle of 1 s on, 1 s off.
pub const ACK_BEEP: Duration = Duration::from_secs(1);

/// Loosely typed alarm input as handed over by sensor sources.
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmInput {
    Number(f64),
    Text(String),
    Missing,
}

impl AlarmInput {
    /// Numeric value of this input; `field` names it in the error.
    pub fn parse(&self, field: &'static str) -> Result<f64, AlarmInputError> {
        let v = match self {
            Self::Missing => return Err(AlarmInputError::Missing(field)),
            Self::Number(v) => *v,
            Self::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return Err(AlarmInputError::Missing(field));
                }
                t.parse::<f64>().map_err(|_| AlarmInputError::NotANumber {
                    field,
                    raw: s.clone(),
                })?
            }
        };
        if v.is_nan() {
            return Err(AlarmInputError::NotANumber {
                field,
                raw: v.to_string(),
            });
        }
        Ok(v)
    }
}

impl From<f64> for AlarmInput {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for AlarmInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AlarmInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<AlarmInput>> From<Option<T>> for AlarmInput {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Missing, Into::into)
    }
}

impl fmt::Display for AlarmInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Missing => f.write_str("<missing>"),
        }
    }
}

/// What a `check_value` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmCheck {
    /// Input rejected; nothing changed.
    Ignored,
    /// Source (re)armed.
    Armed,
    /// Over threshold but inside the silence window.
    Suppressed,
    /// Source was active and returned to normal.
    Cleared,
    /// Under threshold and not active.
    Normal,
}

pub struct AlarmCoordinator<A: Actuator, C: Clock = MonotonicClock> {
    actuator: A,
    clock: C,
    cfg: AlarmCfg,
    records: BTreeMap<String, Instant>,
}

impl<A: Actuator> AlarmCoordinator<A, MonotonicClock> {
    pub fn new(actuator: A, cfg: AlarmCfg) -> Self {
        Self::with_clock(actuator, cfg, MonotonicClock::new())
    }
}

impl<A: Actuator, C: Clock> AlarmCoordinator<A, C> {
    pub fn with_clock(actuator: A, cfg: AlarmCfg, clock: C) -> Self {
        Self {
            actuator,
            clock,
            cfg,
            records: BTreeMap::new(),
        }
    }

    /// Compare `value` with `threshold` for `source_id` and drive the actuator.
    ///
    /// Missing or unparsable inputs are logged and ignored.
    pub fn check_value(
        &mut self,
        value: impl Into<AlarmInput>,
        threshold: impl Into<AlarmInput>,
        source_id: &str,
    ) -> AlarmCheck {
        let (value, threshold) = match Self::parse_inputs(value.into(), threshold.into(), source_id) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(source = source_id, error = %e, "alarm check ignored");
                return AlarmCheck::Ignored;
            }
        };
        tracing::trace!(source = source_id, value, threshold, "checking alarm value");

        let now = self.clock.now();
        if value > threshold {
            if let Some(&since) = self.records.get(source_id)
                && now.saturating_duration_since(since) < self.cfg.silence
            {
                return AlarmCheck::Suppressed;
            }
            self.records.insert(source_id.to_string(), now);
            tracing::info!(source = source_id, value, threshold, "alarm activated");
            if self.actuator.is_active() {
                tracing::debug!("buzzer already active");
            } else {
                self.start_continuous();
            }
            return AlarmCheck::Armed;
        }

        if self.records.remove(source_id).is_none() {
            return AlarmCheck::Normal;
        }
        tracing::info!(source = source_id, value, threshold, "alarm returned to normal");
        if self.records.is_empty() {
            log_actuator_error("stop", self.actuator.stop());
            tracing::info!("buzzer off; no active alarms");
        }
        AlarmCheck::Cleared
    }

    fn parse_inputs(
        value: AlarmInput,
        threshold: AlarmInput,
        source_id: &str,
    ) -> Result<(f64, f64), AlarmInputError> {
        if source_id.trim().is_empty() {
            return Err(AlarmInputError::Missing("source id"));
        }
        Ok((value.parse("value")?, threshold.parse("threshold")?))
    }

    /// Acknowledge every active alarm: restart each silence window now,
    /// stop the buzzer and give a single confirmation beep.
    pub fn silence_all(&mut self) {
        let now = self.clock.now();
        tracing::info!(
            sources = self.records.len(),
            silence_secs = self.cfg.silence.as_secs(),
            "silencing all active alarms"
        );
        for t in self.records.values_mut() {
            *t = now;
        }
        log_actuator_error("stop", self.actuator.stop());
        log_actuator_error(
            "acknowledge",
            self.actuator.start_pattern(ACK_BEEP, ACK_BEEP, Some(1)),
        );
    }

    /// Sound the alarm pattern to check the buzzer, unless it is already busy.
    pub fn test(&mut self) {
        if self.actuator.is_active() {
            tracing::info!("buzzer already active; test skipped");
            return;
        }
        tracing::info!("buzzer test");
        self.start_continuous();
    }

    fn start_continuous(&mut self) {
        log_actuator_error(
            "start",
            self.actuator
                .start_pattern(self.cfg.beep_on, self.cfg.beep_off, None),
        );
    }

    /// Sources currently armed or inside their silence window, in id order.
    pub fn active_sources(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn is_active(&self, source_id: &str) -> bool {
        self.records.contains_key(source_id)
    }

    /// Instant the source was last armed or silenced.
    pub fn last_trigger(&self, source_id: &str) -> Option<Instant> {
        self.records.get(source_id).copied()
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }
}

fn log_actuator_error(action: &'static str, r: Result<(), BoxError>) {
    if let Err(e) = r {
        tracing::warn!(action, error = %e, "buzzer command failed");
    }
}
