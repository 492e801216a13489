//! Error types for hardware calls, device faults and the sequencer surface

use crate::{DeviceId, ShutterCommand};
use serde::{Deserialize, Serialize};

/// Error reported by a hardware driver call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum HwError {
    #[error("command rejected by driver: {0}")]
    Rejected(Box<str>),
    #[error("device not responding")]
    NotResponding,
    #[error("bus error: {0}")]
    Bus(Box<str>),
}

/// Fault a device controller recovered from by entering its Error state
///
/// Only the controller sees this detail. The orchestrator only learns that
/// the device is in Error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceFault {
    /// A driver call failed
    HardwareCommandFailure {
        device: DeviceId,
        command: Box<str>,
        error: HwError,
    },
    /// The close watchdog fired before the close completed
    CloseTimeout {
        attempt: u32,
    },
    /// Close timeouts used up the retry budget
    RetryExhausted {
        attempts: u32,
    },
}

impl DeviceFault {
    pub(crate) fn shutter_hw(command: ShutterCommand, error: HwError) -> Self {
        Self::HardwareCommandFailure {
            device: DeviceId::Shutter,
            command: format!("{:?}", command).into(),
            error,
        }
    }
}

impl std::fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HardwareCommandFailure {
                device,
                command,
                error,
            } => write!(f, "{} {} failed: {}", device, command, error),
            Self::CloseTimeout { attempt } => write!(f, "close timed out (attempt {})", attempt),
            Self::RetryExhausted { attempts } => {
                write!(f, "close retries exhausted after {} attempts", attempts)
            }
        }
    }
}

/// Errors returned by the sequencer's external entry points
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("sequence already running")]
    AlreadyRunning,
    #[error("sequence not running")]
    NotRunning,
    #[error("sequence still running, abort it first")]
    StillRunning,
    #[error("sequencer task has stopped")]
    SequencerStopped,
}

/// Delivery failure between actors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MailboxError {
    #[error("mailbox {0} is closed")]
    Closed(&'static str),
    #[error("mailbox {0} dropped the request without replying")]
    NoReply(&'static str),
}

/// Errors while wiring the controllers and the orchestrator together
#[derive(Debug, thiserror::Error)]
pub enum RigError {
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid step table: {0}")]
    Table(#[from] crate::TableError),
    #[error("invalid configuration: {0}")]
    Config(#[from] crate::ConfigError),
}
