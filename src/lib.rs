//! Shutter/ISP Firmware Update Sequencer
//!
//! Runs a firmware update across two devices, a mechanical shutter and an
//! image signal processor (ISP), as an ordered table of steps. Each device
//! is a run-to-completion controller on its own thread; a single
//! orchestrator task dispatches one step at a time and waits for the
//! controller's acknowledgement before looking at device state.
//!
//! When a device ends up in Error the orchestrator compensates: it rolls
//! back to the nearest checkpoint before the failed step by urgently opening
//! the shutter and then stopping the ISP.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let hw = SimulatedHardware::new();
//! let rig = Rig::spawn(SequencerConfig::from_env()?, UPDATE_SEQUENCE, hw.shutter(), hw.isp())?;
//!
//! rig.sequencer().start_sequence().await?;
//! let status = rig.sequencer().wait_for_outcome().await?;
//! assert_eq!(status.outcome, Some(SequenceOutcome::Completed));
//!
//! rig.shutdown().await;
//! ```

// === Core Types ===
mod commands;
mod context;
mod errors;
mod events;
mod state;
mod step;

// === Configuration ===
mod config;

// === Runtime ===
mod controller;
mod mailbox;
mod traits;
mod watchdog;

// === Devices ===
mod hardware;
mod isp;
mod shutter;

// === Orchestration ===
mod orchestrator;
mod rig;

// === Storage ===
mod journal;

// === Observability ===
mod observer;
mod stats;

#[cfg(any(test, feature = "test-harness"))]
pub mod testing;

// === Re-exports ===

// Types
pub use commands::{DeviceCommand, DeviceId, IspCommand, ShutterCommand};
pub use context::{RunContext, RunId};
pub use step::{rollback_checkpoint, validate_table, Step, TableError, UPDATE_SEQUENCE};

// State
pub use state::{
    DeviceState, IspState, SequenceControl, SequenceOutcome, SequenceState, SequenceStatus,
    ShutterState,
};

// Events
pub use events::{DeviceMsg, RollbackReason, SequenceEvent};

// Errors
pub use errors::{DeviceFault, HwError, MailboxError, RigError, SequenceError};

// Configuration
pub use config::{ConfigError, SequencerConfig};

// Runtime
pub use controller::{
    handle_device_msg, spawn_controller, DeviceHandle, DevicePort, IspPort, PublishedState,
    ShutterPort,
};
pub use mailbox::{mailbox, Mailbox, MailboxAddr, ReplyTo, TryNext};
pub use traits::{DeviceController, RetryCounter, RetryDecision};
pub use watchdog::{TokioWatchdog, Watchdog};

// Devices
pub use hardware::{IspDriver, ShutterDriver, SimulatedHardware, SimulatedIsp, SimulatedShutter};
pub use isp::IspController;
pub use shutter::ShutterController;

// Orchestration
pub use orchestrator::{DevicePorts, Sequencer, SequencerHandle, SequencerMsg};
pub use rig::Rig;

// Storage
pub use journal::{InMemoryJournal, JournalEntry, JournalError, SequenceJournal};

// Observability
pub use observer::{NoOpObserver, SequenceObserver, TracingObserver};
pub use stats::{DeviceStats, DeviceStatsSnapshot, SequencerStats, SequencerStatsSnapshot};
