//! Core traits for device controllers

use crate::{DeviceId, DeviceState, ReplyTo};
use tokio::sync::watch;

/// A single-threaded, run-to-completion device controller.
///
/// The controller exclusively owns its device state. It runs on its own
/// mailbox thread (see [`spawn_controller`](crate::spawn_controller)), so
/// at most one handler executes at a time and the blocking driver calls
/// inside the handlers never stall the orchestrator's runtime.
///
/// # Example
///
/// ```rust,ignore
/// impl DeviceController for LensController {
///     type Command = LensCommand;
///     type State = LensState;
///
///     fn device(&self) -> DeviceId { DeviceId::Lens }
///     fn state(&self) -> LensState { self.state.get() }
///     fn subscribe(&self) -> watch::Receiver<LensState> { self.state.subscribe() }
///
///     fn handle_command(&mut self, command: LensCommand, reply_to: ReplyTo<LensState>) {
///         let state = self.run(command);
///         reply_to.reply(state);
///     }
///
///     fn roll_back(&mut self) -> LensState {
///         self.run(LensCommand::Park)
///     }
/// }
/// ```
pub trait DeviceController: Send + 'static {
    /// Commands this device accepts
    type Command: Copy + std::fmt::Debug + Send + 'static;
    /// Observable device state
    type State: DeviceState;

    fn device(&self) -> DeviceId;

    fn state(&self) -> Self::State;

    /// Watch the state. Controllers publish before they reply to anything,
    /// so a read after an acknowledgement is always settled.
    fn subscribe(&self) -> watch::Receiver<Self::State>;

    /// Execute a step command.
    ///
    /// `reply_to` is the acknowledgement the orchestrator waits on. A
    /// controller may hold on to it across events while a multi-event
    /// protocol (close with retries) settles.
    fn handle_command(&mut self, command: Self::Command, reply_to: ReplyTo<Self::State>);

    /// Drive the device to its safe state. Never retried.
    fn roll_back(&mut self) -> Self::State;

    // === Optional Hooks ===

    /// A watchdog armed by this controller expired
    fn on_watchdog(&mut self, _generation: u64) {}

    /// Called once the mailbox has been drained for shutdown
    fn on_stop(&mut self) {}
}

/// Outcome of recording a close timeout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-issue the command; `attempt` is the retry number (1-based)
    Retry { attempt: u32 },
    /// Budget used up; the fault is terminal
    Exhausted { attempts: u32 },
}

/// Bounded retry counter for close timeouts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryCounter {
    count: u32,
    max: u32,
}

impl RetryCounter {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Count one timeout. The counter never exceeds `max`; the timeout that
    /// brings it to `max` is terminal.
    pub fn record_timeout(&mut self) -> RetryDecision {
        self.count = (self.count + 1).min(self.max);
        if self.count >= self.max {
            RetryDecision::Exhausted {
                attempts: self.count,
            }
        } else {
            RetryDecision::Retry {
                attempt: self.count,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_counter_bound() {
        let mut counter = RetryCounter::new(3);

        assert_eq!(counter.record_timeout(), RetryDecision::Retry { attempt: 1 });
        assert_eq!(counter.record_timeout(), RetryDecision::Retry { attempt: 2 });
        assert_eq!(counter.record_timeout(), RetryDecision::Exhausted { attempts: 3 });
        assert_eq!(counter.count(), 3);

        // Stays pinned at the bound
        assert_eq!(counter.record_timeout(), RetryDecision::Exhausted { attempts: 3 });
        assert!(counter.count() <= counter.max());
    }

    #[test]
    fn test_retry_counter_reset() {
        let mut counter = RetryCounter::new(2);
        counter.record_timeout();
        counter.reset();
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.record_timeout(), RetryDecision::Retry { attempt: 1 });
    }

    #[test]
    fn test_single_attempt_budget() {
        let mut counter = RetryCounter::new(1);
        assert_eq!(counter.record_timeout(), RetryDecision::Exhausted { attempts: 1 });
    }
}
