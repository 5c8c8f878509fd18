//! Central registry of named one-shot timers.
//!
//! Timers are plain deadlines keyed by name. Arming an existing name replaces
//! its deadline, so every producer can re-arm idempotently. The host ticker
//! drains due timers and hands their names to the engine.

use chrono::{DateTime, Local};
use log::debug;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct TimerRegistry {
    deadlines: BTreeMap<String, DateTime<Local>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `name` to fire at `at`, replacing any pending deadline.
    pub fn arm(&mut self, name: impl Into<String>, at: DateTime<Local>) {
        let name = name.into();
        debug!("Arming timer {name} for {at}");
        self.deadlines.insert(name, at);
    }

    /// Returns true if a pending timer was removed.
    pub fn cancel(&mut self, name: &str) -> bool {
        self.deadlines.remove(name).is_some()
    }

    /// Cancel every timer whose name starts with `prefix`. Returns how many were removed.
    pub fn cancel_prefix(&mut self, prefix: &str) -> usize {
        let before = self.deadlines.len();
        self.deadlines.retain(|name, _| !name.starts_with(prefix));
        before - self.deadlines.len()
    }

    pub fn deadline(&self, name: &str) -> Option<DateTime<Local>> {
        self.deadlines.get(name).copied()
    }

    /// Remove and return every timer due at or before `now`, earliest first.
    pub fn take_due(&mut self, now: DateTime<Local>) -> Vec<String> {
        let mut due: Vec<(DateTime<Local>, String)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(name, at)| (*at, name.clone()))
            .collect();
        due.sort();

        for (_, name) in &due {
            self.deadlines.remove(name);
        }
        due.into_iter().map(|(_, name)| name).collect()
    }
}
