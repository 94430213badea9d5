//! Per-command burst history.
//!
//! Every distinct command string seen during a run gets one entry, created
//! on first sighting and kept until the run ends. An entry keeps the plain
//! mean of every observed burst plus a rolling window of the most recent
//! [`MAX_HISTORY`] observations, which backs the windowed estimate used by
//! shortest-job-first.

use average::{Estimate, Mean};
use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};
use std::collections::VecDeque;

use super::state::Millis;

pub const MAX_HISTORY: usize = 50;
pub const DEFAULT_ESTIMATE_MS: f64 = 1000.0;

new_key_type! {
    pub struct CommandId;
}

#[derive(Debug, Clone)]
pub struct BurstStats {
    total: Mean,
    recent: VecDeque<f64>,
}

impl BurstStats {
    fn new() -> Self {
        Self {
            total: Mean::new(),
            recent: VecDeque::with_capacity(MAX_HISTORY),
        }
    }

    fn record(&mut self, burst: f64) {
        self.total.add(burst);
        if self.recent.len() == MAX_HISTORY {
            self.recent.pop_front();
        }
        self.recent.push_back(burst);
    }

    pub fn count(&self) -> u64 {
        self.total.len()
    }

    pub fn average(&self) -> Option<f64> {
        if self.total.is_empty() {
            None
        } else {
            Some(self.total.mean())
        }
    }

    /// Mean of the last `k` observations (capped at the window size).
    pub fn windowed(&self, k: usize) -> Option<f64> {
        if k == 0 || self.recent.is_empty() {
            return None;
        }
        let window: Mean = self.recent.iter().rev().take(k).copied().collect();
        Some(window.mean())
    }
}

#[derive(Debug)]
pub struct CommandHistory {
    ids: FxHashMap<String, CommandId>,
    entries: SlotMap<CommandId, BurstStats>,
    default_estimate: f64,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::with_default_estimate(DEFAULT_ESTIMATE_MS)
    }

    pub fn with_default_estimate(default_estimate: f64) -> Self {
        Self {
            ids: FxHashMap::default(),
            entries: SlotMap::with_key(),
            default_estimate,
        }
    }

    pub fn intern(&mut self, command: &str) -> CommandId {
        if let Some(&id) = self.ids.get(command) {
            return id;
        }
        let id = self.entries.insert(BurstStats::new());
        self.ids.insert(command.to_owned(), id);
        id
    }

    pub fn lookup(&self, command: &str) -> Option<CommandId> {
        self.ids.get(command).copied()
    }

    pub fn stats(&self, id: CommandId) -> Option<&BurstStats> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn default_estimate(&self) -> f64 {
        self.default_estimate
    }

    pub fn record_burst(&mut self, command: &str, burst: Millis) {
        let id = self.intern(command);
        self.record_burst_for(id, burst);
    }

    pub fn record_burst_for(&mut self, id: CommandId, burst: Millis) {
        if let Some(stats) = self.entries.get_mut(id) {
            stats.record(burst as f64);
        }
    }

    pub fn average(&self, command: &str) -> Option<f64> {
        self.lookup(command).and_then(|id| self.average_of(id))
    }

    pub fn average_of(&self, id: CommandId) -> Option<f64> {
        self.entries.get(id).and_then(BurstStats::average)
    }

    /// Windowed estimate over the last `k` bursts, or the default estimate
    /// when the command has never completed.
    pub fn estimate(&self, command: &str, k: usize) -> f64 {
        match self.lookup(command) {
            Some(id) => self.estimate_of(id, k),
            None => self.default_estimate,
        }
    }

    pub fn estimate_of(&self, id: CommandId, k: usize) -> f64 {
        self.entries
            .get(id)
            .and_then(|stats| stats.windowed(k))
            .unwrap_or(self.default_estimate)
    }
}
