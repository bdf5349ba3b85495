use crate::error::{DisstatError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Invocation counts per command name, sent with the next aggregated report
#[derive(Default)]
pub struct CommandCounter {
    counts: Mutex<HashMap<String, u64>>,
}

impl CommandCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one invocation and return the new total for the command
    pub fn increment(&self, name: &str) -> Result<u64> {
        if name.trim().is_empty() {
            return Err(DisstatError::validation("command_name cannot be empty"));
        }
        let mut counts = self.counts.lock();
        let count = counts.entry(name.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    pub fn count(&self, name: &str) -> u64 {
        self.counts.lock().get(name).copied().unwrap_or(0)
    }

    /// Take all counts, resetting the counter
    pub fn drain(&self) -> HashMap<String, u64> {
        std::mem::take(&mut *self.counts.lock())
    }

    /// Add previously drained counts back
    pub fn restore(&self, drained: HashMap<String, u64>) {
        let mut counts = self.counts.lock();
        for (name, count) in drained {
            *counts.entry(name).or_insert(0) += count;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.lock().is_empty()
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counts.lock().clone()
    }
}
