//! Sequencer and device statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Orchestrator statistics
pub struct SequencerStats {
    pub runs_started: AtomicU64,
    pub runs_completed: AtomicU64,
    pub runs_rolled_back: AtomicU64,
    pub runs_aborted: AtomicU64,
    pub steps_dispatched: AtomicU64,
    pub steps_failed: AtomicU64,
    pub rollback_actions_failed: AtomicU64,
    pub rejected_requests: AtomicU64,
}

impl SequencerStats {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            runs_rolled_back: AtomicU64::new(0),
            runs_aborted: AtomicU64::new(0),
            steps_dispatched: AtomicU64::new(0),
            steps_failed: AtomicU64::new(0),
            rollback_actions_failed: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> SequencerStatsSnapshot {
        SequencerStatsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_rolled_back: self.runs_rolled_back.load(Ordering::Relaxed),
            runs_aborted: self.runs_aborted.load(Ordering::Relaxed),
            steps_dispatched: self.steps_dispatched.load(Ordering::Relaxed),
            steps_failed: self.steps_failed.load(Ordering::Relaxed),
            rollback_actions_failed: self.rollback_actions_failed.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
        }
    }
}

impl Default for SequencerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequencerStatsSnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_rolled_back: u64,
    pub runs_aborted: u64,
    pub steps_dispatched: u64,
    pub steps_failed: u64,
    pub rollback_actions_failed: u64,
    pub rejected_requests: u64,
}

/// Per-controller statistics
pub struct DeviceStats {
    pub commands_handled: AtomicU64,
    pub hw_failures: AtomicU64,
    pub close_timeouts: AtomicU64,
    pub close_retries: AtomicU64,
    pub rollbacks: AtomicU64,
    pub stale_events: AtomicU64,
}

impl DeviceStats {
    pub fn new() -> Self {
        Self {
            commands_handled: AtomicU64::new(0),
            hw_failures: AtomicU64::new(0),
            close_timeouts: AtomicU64::new(0),
            close_retries: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            stale_events: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> DeviceStatsSnapshot {
        DeviceStatsSnapshot {
            commands_handled: self.commands_handled.load(Ordering::Relaxed),
            hw_failures: self.hw_failures.load(Ordering::Relaxed),
            close_timeouts: self.close_timeouts.load(Ordering::Relaxed),
            close_retries: self.close_retries.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            stale_events: self.stale_events.load(Ordering::Relaxed),
        }
    }
}

impl Default for DeviceStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceStatsSnapshot {
    pub commands_handled: u64,
    pub hw_failures: u64,
    pub close_timeouts: u64,
    pub close_retries: u64,
    pub rollbacks: u64,
    pub stale_events: u64,
}
