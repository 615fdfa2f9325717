//! Sources seen by the control tick.
//!
//! Entries are created the first time a source reports and are never
//! removed; a source that stops reporting is marked disconnected and
//! reconnects on its next value.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Temperature,
    DcSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredSource {
    pub kind: SourceKind,
    pub connected: bool,
    pub last_value: Option<f64>,
    /// Highest value seen since start; never below 0.
    pub max_value: f64,
}

impl MonitoredSource {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            connected: true,
            last_value: None,
            max_value: 0.0,
        }
    }

    pub fn update(&mut self, id: &str, value: Option<f64>) {
        if !self.connected {
            tracing::info!(source = id, kind = ?self.kind, "source reconnected");
            self.connected = true;
        }
        self.last_value = value;
        if let Some(v) = value
            && v > self.max_value
        {
            self.max_value = v;
        }
    }

    pub fn disconnect(&mut self, id: &str) {
        if self.connected {
            tracing::info!(source = id, kind = ?self.kind, "source disconnected");
        }
        self.connected = false;
        self.last_value = None;
    }
}

/// Id-keyed map with create-if-absent semantics.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: BTreeMap<String, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with(&mut self, id: &str, create: impl FnOnce() -> T) -> &mut T {
        if !self.entries.contains_key(id) {
            tracing::debug!(source = id, "registering source");
        }
        self.entries.entry(id.to_string()).or_insert_with(create)
    }

    /// Call `on_absent` for every entry whose id is not in `present`.
    /// Returns how many entries were absent.
    pub fn prune_absent<'a>(
        &mut self,
        present: impl IntoIterator<Item = &'a str>,
        mut on_absent: impl FnMut(&str, &mut T),
    ) -> usize {
        let present: std::collections::BTreeSet<&str> = present.into_iter().collect();
        let mut n = 0;
        for (id, entry) in &mut self.entries {
            if !present.contains(id.as_str()) {
                on_absent(id, entry);
                n += 1;
            }
        }
        n
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
