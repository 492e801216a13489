//! Device messages and sequence journal events

use crate::{DeviceCommand, DeviceId, IspState, ReplyTo, RunId, SequenceOutcome, ShutterState};
use serde::{Deserialize, Serialize};

/// Messages understood by a device controller mailbox
#[derive(Debug)]
pub enum DeviceMsg<C, S> {
    /// Execute a step command. The reply is the settled device state.
    Command { command: C, reply_to: ReplyTo<S> },
    /// Force the device to its safe state
    Rollback { reply_to: ReplyTo<S> },
    /// A watchdog armed for `generation` expired
    WatchdogFired { generation: u64 },
    /// Read the current state
    GetState { reply_to: ReplyTo<S> },
}

impl<C, S> DeviceMsg<C, S> {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Rollback { .. } => "rollback",
            Self::WatchdogFired { .. } => "watchdog_fired",
            Self::GetState { .. } => "get_state",
        }
    }
}

/// Why a rollback was started
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackReason {
    DeviceFault(DeviceId),
    Abort,
}

/// Events recorded in the sequence journal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceEvent {
    RunStarted {
        steps: usize,
    },
    StepDispatched {
        index: usize,
        command: DeviceCommand,
    },
    StepSettled {
        index: usize,
        command: DeviceCommand,
        shutter: ShutterState,
        isp: IspState,
    },
    StepFailed {
        index: usize,
        command: DeviceCommand,
        device: DeviceId,
    },
    /// The sequence passed through its Error state
    SequenceFailed {
        index: usize,
    },
    RollbackStarted {
        failed_index: usize,
        rollback_index: usize,
        reason: RollbackReason,
    },
    RollbackIssued {
        command: DeviceCommand,
        succeeded: bool,
    },
    RunFinished {
        outcome: SequenceOutcome,
    },
    Reset {
        run_id: RunId,
    },
}

impl SequenceEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::StepDispatched { .. } => "step_dispatched",
            Self::StepSettled { .. } => "step_settled",
            Self::StepFailed { .. } => "step_failed",
            Self::SequenceFailed { .. } => "sequence_failed",
            Self::RollbackStarted { .. } => "rollback_started",
            Self::RollbackIssued { .. } => "rollback_issued",
            Self::RunFinished { .. } => "run_finished",
            Self::Reset { .. } => "reset",
        }
    }
}
