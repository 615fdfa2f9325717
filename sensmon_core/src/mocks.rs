//! Test and helper mocks for sensmon_core

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sensmon_traits::{Actuator, BoxError, Button};

use crate::record::{RecordSink, SampleRecord};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Command received by a `SpyActuator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    Start {
        on: Duration,
        off: Duration,
        repeat: Option<u32>,
    },
    Stop,
}

/// Actuator that only records what it was asked to do.
///
/// A started pattern stays active until `stop()` or `finish()`, so finite
/// patterns behave as if they were still sounding.
#[derive(Debug, Default)]
pub struct SpyActuator {
    calls: Vec<ActuatorCall>,
    active: bool,
    fail: bool,
}

impl SpyActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command fails (and changes nothing) from now on.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> &[ActuatorCall] {
        &self.calls
    }

    pub fn starts(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, ActuatorCall::Start { .. }))
            .count()
    }

    pub fn last_start(&self) -> Option<ActuatorCall> {
        self.calls
            .iter()
            .rev()
            .find(|c| matches!(c, ActuatorCall::Start { .. }))
            .copied()
    }

    /// Pretend the current pattern ran out.
    pub fn finish(&mut self) {
        self.active = false;
    }
}

impl Actuator for SpyActuator {
    fn start_pattern(&mut self, on: Duration, off: Duration, repeat: Option<u32>) -> Result<(), BoxError> {
        self.calls.push(ActuatorCall::Start { on, off, repeat });
        if self.fail {
            return Err("spy actuator failure".into());
        }
        // Finite patterns count as already played out
        self.active = repeat.is_none();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.calls.push(ActuatorCall::Stop);
        if self.fail {
            return Err("spy actuator failure".into());
        }
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Sink that keeps every record in memory; clones share the storage.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<SampleRecord>>>,
    flushes: Arc<Mutex<usize>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SampleRecord> {
        lock(&self.records).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }

    pub fn flushes(&self) -> usize {
        *lock(&self.flushes)
    }
}

impl RecordSink for MemorySink {
    fn record(&mut self, rec: &SampleRecord) -> std::io::Result<()> {
        lock(&self.records).push(rec.clone());
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        *lock(&self.flushes) += 1;
        Ok(())
    }
}

/// Button that replays a fixed sequence of states, then stays released.
#[derive(Debug, Clone)]
pub struct ScriptedButton {
    states: std::collections::VecDeque<bool>,
}

impl ScriptedButton {
    pub fn new(states: impl IntoIterator<Item = bool>) -> Self {
        Self {
            states: states.into_iter().collect(),
        }
    }
}

impl Button for ScriptedButton {
    fn is_pressed(&mut self) -> Result<bool, BoxError> {
        Ok(self.states.pop_front().unwrap_or(false))
    }
}
