//! Run identity and correlation context

use serde::{Deserialize, Serialize};

/// Identifier of one accepted sequence run
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl RunId {
    /// Create a new run ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// The ID following this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Debug for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RunId({})", self.0)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation context carried into logs, the journal and observer hooks
#[derive(Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Run this event belongs to
    pub run_id: RunId,
    /// Index of the step being driven (or where the run stopped)
    pub step_index: usize,
    /// When the run started (millis since UNIX epoch)
    pub run_started_at_millis: u64,
    /// Timestamp of this event (millis since UNIX epoch)
    pub event_timestamp_millis: u64,
}

impl RunContext {
    /// Context for a run starting now
    pub fn start(run_id: RunId) -> Self {
        let now = Self::now_millis();
        Self {
            run_id,
            step_index: 0,
            run_started_at_millis: now,
            event_timestamp_millis: now,
        }
    }

    /// Get current time in milliseconds since UNIX epoch
    pub fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Context for an event at `step_index`
    pub fn at_step(&self, step_index: usize) -> Self {
        Self {
            step_index,
            event_timestamp_millis: Self::now_millis(),
            ..self.clone()
        }
    }

    /// Calculate elapsed time since the run started
    pub fn elapsed_millis(&self) -> u64 {
        self.event_timestamp_millis
            .saturating_sub(self.run_started_at_millis)
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("step_index", &self.step_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_step_keeps_run_identity() {
        let ctx = RunContext::start(RunId::new(7));
        let later = ctx.at_step(3);

        assert_eq!(later.run_id, RunId::new(7));
        assert_eq!(later.step_index, 3);
        assert_eq!(later.run_started_at_millis, ctx.run_started_at_millis);
        assert!(later.event_timestamp_millis >= ctx.event_timestamp_millis);
    }

    #[test]
    fn test_run_id_next() {
        assert_eq!(RunId::new(1).next(), RunId::new(2));
        assert_eq!(format!("{}", RunId::new(9)), "9");
    }
}
