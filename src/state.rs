//! Device and sequence state

use crate::RunId;
use serde::{Deserialize, Serialize};

/// Physical state of the optical shutter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutterState {
    Closed,
    Opened,
    Error,
}

/// State of the image-signal processor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IspState {
    Idle,
    /// A command is executing, or a firmware update is in progress
    Busy,
    Error,
}

/// Common view of device states used by the orchestrator
pub trait DeviceState: Copy + std::fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Whether the device reports a fault
    fn is_error(&self) -> bool;
}

impl DeviceState for ShutterState {
    fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl DeviceState for IspState {
    fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

/// Sequence lifecycle
///
/// ```text
/// Idle --start--> Running --last step--> Idle
///                    |  \--abort--> Aborted      (terminal)
///                    \--device Error--> Error --> RollingBack (terminal)
/// ```
///
/// Terminal states return to `Idle` only through an explicit reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceState {
    Idle,
    Running,
    /// Transient: only ever logged, the orchestrator moves on to
    /// `RollingBack` within the same routine
    Error,
    RollingBack,
    Aborted,
}

impl SequenceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RollingBack | Self::Aborted)
    }
}

impl std::fmt::Display for SequenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceState::Idle => write!(f, "idle"),
            SequenceState::Running => write!(f, "running"),
            SequenceState::Error => write!(f, "error"),
            SequenceState::RollingBack => write!(f, "rolling_back"),
            SequenceState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Orchestrator-owned control block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceControl {
    pub state: SequenceState,
    /// Step being driven, or where the run stopped
    pub current_index: usize,
    /// Checkpoint the last rollback unwound to
    pub rollback_index: Option<usize>,
}

impl SequenceControl {
    pub fn new() -> Self {
        Self {
            state: SequenceState::Idle,
            current_index: 0,
            rollback_index: None,
        }
    }
}

impl Default for SequenceControl {
    fn default() -> Self {
        Self::new()
    }
}

/// How a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceOutcome {
    Completed,
    /// A device faulted and the run was unwound. `clean` is false when a
    /// rollback hardware call failed too.
    RolledBack { clean: bool },
    Aborted { clean: bool },
}

/// Published snapshot of the sequence, for operators and callers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStatus {
    /// Most recent run, if any was ever started
    pub run_id: Option<RunId>,
    pub state: SequenceState,
    pub current_index: usize,
    pub rollback_index: Option<usize>,
    /// Set once the most recent run reached its terminal state
    pub outcome: Option<SequenceOutcome>,
}

impl SequenceStatus {
    pub fn idle() -> Self {
        Self {
            run_id: None,
            state: SequenceState::Idle,
            current_index: 0,
            rollback_index: None,
            outcome: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SequenceState::RollingBack.is_terminal());
        assert!(SequenceState::Aborted.is_terminal());
        assert!(!SequenceState::Idle.is_terminal());
        assert!(!SequenceState::Running.is_terminal());
        assert!(!SequenceState::Error.is_terminal());
    }

    #[test]
    fn test_error_detection() {
        assert!(ShutterState::Error.is_error());
        assert!(!ShutterState::Opened.is_error());
        assert!(IspState::Error.is_error());
        assert!(!IspState::Busy.is_error());
    }
}
