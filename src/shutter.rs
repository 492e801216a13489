//! Shutter device controller
//!
//! Open/close requests become driver calls. A close arms a watchdog; if the
//! close does not complete before the deadline, the watchdog's event
//! drives a bounded retry. Once the retry budget is spent the shutter
//! faults. Urgent variants skip the watchdog and leave the counter alone.
//!
//! A close is acknowledged only once it settles (Closed or Error), so the
//! orchestrator sees one outcome regardless of how many attempts it took.

use crate::{
    DeviceController, DeviceFault, DeviceId, DeviceStats, PublishedState, ReplyTo, RetryCounter,
    RetryDecision, SequencerConfig, ShutterCommand, ShutterDriver, ShutterState, Watchdog,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

pub struct ShutterController<D, W> {
    driver: D,
    watchdog: W,
    state: PublishedState<ShutterState>,
    retries: RetryCounter,
    close_timeout: Duration,

    // Close attempt bookkeeping
    generation: u64,
    armed: Option<u64>,
    pending_close: Option<ReplyTo<ShutterState>>,

    last_fault: Option<DeviceFault>,
    stats: Arc<DeviceStats>,
}

impl<D: ShutterDriver, W: Watchdog> ShutterController<D, W> {
    /// Shutter assumed open (safe) at boot
    pub fn new(driver: D, watchdog: W, config: &SequencerConfig) -> Self {
        Self {
            driver,
            watchdog,
            state: PublishedState::new(ShutterState::Opened),
            retries: RetryCounter::new(config.max_close_retries),
            close_timeout: config.close_timeout(),
            generation: 0,
            armed: None,
            pending_close: None,
            last_fault: None,
            stats: Arc::new(DeviceStats::new()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<DeviceStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<DeviceStats> {
        &self.stats
    }

    pub fn retry_count(&self) -> u32 {
        self.retries.count()
    }

    pub fn last_fault(&self) -> Option<&DeviceFault> {
        self.last_fault.as_ref()
    }

    /// Whether a close is waiting on its watchdog
    pub fn is_close_pending(&self) -> bool {
        self.pending_close.is_some()
    }

    fn begin_close(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        self.watchdog.arm(generation, self.close_timeout);
        self.armed = Some(generation);

        let started = Instant::now();
        let result = self.driver.execute(ShutterCommand::Close);
        let elapsed = started.elapsed();

        match result {
            Ok(()) if elapsed <= self.close_timeout => {
                self.disarm();
                self.retries.reset();
                self.state.set(ShutterState::Closed);
                tracing::info!(device = %DeviceId::Shutter, generation, elapsed_ms = elapsed.as_millis() as u64, "Shutter closed");
                self.settle_close();
            }
            Ok(()) => {
                // Too late to count; the queued watchdog event decides
                tracing::warn!(
                    device = %DeviceId::Shutter,
                    generation,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Close completed after watchdog deadline"
                );
            }
            Err(error) => {
                self.disarm();
                self.fail(DeviceFault::shutter_hw(ShutterCommand::Close, error));
                self.settle_close();
            }
        }
    }

    fn on_close_timeout(&mut self, generation: u64) {
        if self.armed != Some(generation) {
            self.stats.stale_events.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(device = %DeviceId::Shutter, generation, "Ignoring stale close timeout");
            return;
        }
        self.armed = None;
        self.stats.close_timeouts.fetch_add(1, Ordering::Relaxed);

        match self.retries.record_timeout() {
            RetryDecision::Retry { attempt } => {
                self.stats.close_retries.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    device = %DeviceId::Shutter,
                    fault = %DeviceFault::CloseTimeout { attempt },
                    max = self.retries.max(),
                    "Retrying close"
                );
                self.begin_close();
            }
            RetryDecision::Exhausted { attempts } => {
                self.fail(DeviceFault::RetryExhausted { attempts });
                self.settle_close();
            }
        }
    }

    fn run(&mut self, command: ShutterCommand) {
        match self.driver.execute(command) {
            Ok(()) => {
                let state = if command.closes() {
                    ShutterState::Closed
                } else {
                    ShutterState::Opened
                };
                if command == ShutterCommand::Open {
                    self.retries.reset();
                }
                self.state.set(state);
                tracing::info!(device = %DeviceId::Shutter, ?command, ?state, "Shutter command completed");
            }
            Err(error) => self.fail(DeviceFault::shutter_hw(command, error)),
        }
    }

    fn fail(&mut self, fault: DeviceFault) {
        if matches!(fault, DeviceFault::HardwareCommandFailure { .. }) {
            self.stats.hw_failures.fetch_add(1, Ordering::Relaxed);
        }
        tracing::error!(device = %DeviceId::Shutter, fault = %fault, "Shutter fault");
        self.state.set(ShutterState::Error);
        self.last_fault = Some(fault);
    }

    fn disarm(&mut self) {
        self.watchdog.disarm();
        self.armed = None;
    }

    fn settle_close(&mut self) {
        if let Some(reply_to) = self.pending_close.take() {
            reply_to.reply(self.state.get());
        }
    }

    /// Abandon an unsettled close, acknowledging it with the current state
    fn abandon_close(&mut self, why: &'static str) {
        if self.pending_close.is_some() {
            tracing::warn!(device = %DeviceId::Shutter, generation = self.generation, why, "Abandoning pending close");
            self.disarm();
            self.settle_close();
        }
    }
}

impl<D: ShutterDriver, W: Watchdog> DeviceController for ShutterController<D, W> {
    type Command = ShutterCommand;
    type State = ShutterState;

    fn device(&self) -> DeviceId {
        DeviceId::Shutter
    }

    fn state(&self) -> ShutterState {
        self.state.get()
    }

    fn subscribe(&self) -> watch::Receiver<ShutterState> {
        self.state.subscribe()
    }

    fn handle_command(&mut self, command: ShutterCommand, reply_to: ReplyTo<ShutterState>) {
        self.stats.commands_handled.fetch_add(1, Ordering::Relaxed);
        self.abandon_close("superseded by a new command");

        match command {
            ShutterCommand::Close => {
                // A fresh close gets the full retry budget
                self.retries.reset();
                self.pending_close = Some(reply_to);
                self.begin_close();
            }
            ShutterCommand::Open | ShutterCommand::UrgentOpen | ShutterCommand::UrgentClose => {
                self.run(command);
                reply_to.reply(self.state.get());
            }
        }
    }

    fn roll_back(&mut self) -> ShutterState {
        self.stats.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.abandon_close("rollback requested");
        self.disarm();
        self.run(ShutterCommand::UrgentOpen);
        self.state.get()
    }

    fn on_watchdog(&mut self, generation: u64) {
        self.on_close_timeout(generation);
    }

    fn on_stop(&mut self) {
        self.abandon_close("controller stopping");
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingWatchdog;
    use crate::SimulatedHardware;
    use tokio::sync::oneshot::error::TryRecvError;

    fn controller(
        sim: &SimulatedHardware,
        config: &SequencerConfig,
    ) -> (
        ShutterController<crate::SimulatedShutter, RecordingWatchdog>,
        RecordingWatchdog,
    ) {
        let watchdog = RecordingWatchdog::new();
        (
            ShutterController::new(sim.shutter(), watchdog.clone(), config),
            watchdog,
        )
    }

    fn fast_config() -> SequencerConfig {
        SequencerConfig {
            base_tick_millis: 5,
            close_timeout_ticks: 2,
            max_close_retries: 3,
        }
    }

    #[test]
    fn test_initial_state_open() {
        let sim = SimulatedHardware::new();
        let (shutter, _) = controller(&sim, &SequencerConfig::default());
        assert_eq!(shutter.state(), ShutterState::Opened);
        assert_eq!(*shutter.subscribe().borrow(), ShutterState::Opened);
    }

    #[test]
    fn test_close_success_disarms_watchdog() {
        let sim = SimulatedHardware::new();
        let (mut shutter, watchdog) = controller(&sim, &SequencerConfig::default());

        let (reply_to, mut rx) = ReplyTo::channel();
        shutter.handle_command(ShutterCommand::Close, reply_to);

        assert_eq!(rx.try_recv(), Ok(ShutterState::Closed));
        assert_eq!(shutter.retry_count(), 0);
        assert_eq!(watchdog.armed_generations(), vec![1]);
        assert!(!watchdog.is_armed());
    }

    #[test]
    fn test_close_hw_failure_is_error() {
        let sim = SimulatedHardware::new();
        sim.fail_next(ShutterCommand::Close, 1);
        let (mut shutter, watchdog) = controller(&sim, &SequencerConfig::default());

        let (reply_to, mut rx) = ReplyTo::channel();
        shutter.handle_command(ShutterCommand::Close, reply_to);

        assert_eq!(rx.try_recv(), Ok(ShutterState::Error));
        assert!(matches!(
            shutter.last_fault(),
            Some(DeviceFault::HardwareCommandFailure { .. })
        ));
        assert!(!watchdog.is_armed());
        assert_eq!(shutter.stats().snapshot().hw_failures, 1);
    }

    #[test]
    fn test_three_timeouts_exhaust_retries() {
        let sim = SimulatedHardware::new();
        let config = fast_config();
        // Every close overruns the 10ms deadline
        sim.set_latency(ShutterCommand::Close, Duration::from_millis(30));
        let (mut shutter, watchdog) = controller(&sim, &config);

        let (reply_to, mut rx) = ReplyTo::channel();
        shutter.handle_command(ShutterCommand::Close, reply_to);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert!(shutter.is_close_pending());
        assert_eq!(sim.count(ShutterCommand::Close), 1);

        // 1st timeout: retry
        shutter.on_watchdog(watchdog.last_armed().unwrap());
        assert_eq!(shutter.retry_count(), 1);
        assert_eq!(sim.count(ShutterCommand::Close), 2);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        // 2nd timeout: retry
        shutter.on_watchdog(watchdog.last_armed().unwrap());
        assert_eq!(shutter.retry_count(), 2);
        assert_eq!(sim.count(ShutterCommand::Close), 3);

        // 3rd timeout: fault, no 4th close
        shutter.on_watchdog(watchdog.last_armed().unwrap());
        assert_eq!(shutter.retry_count(), 3);
        assert_eq!(sim.count(ShutterCommand::Close), 3);
        assert_eq!(shutter.state(), ShutterState::Error);
        assert_eq!(rx.try_recv(), Ok(ShutterState::Error));
        assert_eq!(
            shutter.last_fault(),
            Some(&DeviceFault::RetryExhausted { attempts: 3 })
        );
        assert_eq!(watchdog.armed_generations(), vec![1, 2, 3]);

        let stats = shutter.stats().snapshot();
        assert_eq!(stats.close_timeouts, 3);
        assert_eq!(stats.close_retries, 2);
    }

    #[test]
    fn test_retry_then_success_resets_counter() {
        let sim = SimulatedHardware::new();
        sim.set_latency(ShutterCommand::Close, Duration::from_millis(30));
        let (mut shutter, watchdog) = controller(&sim, &fast_config());

        let (reply_to, mut rx) = ReplyTo::channel();
        shutter.handle_command(ShutterCommand::Close, reply_to);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        sim.set_latency(ShutterCommand::Close, Duration::ZERO);
        shutter.on_watchdog(watchdog.last_armed().unwrap());

        assert_eq!(rx.try_recv(), Ok(ShutterState::Closed));
        assert_eq!(shutter.retry_count(), 0);
        assert_eq!(sim.count(ShutterCommand::Close), 2);
    }

    #[test]
    fn test_stale_timeout_ignored() {
        let sim = SimulatedHardware::new();
        let (mut shutter, watchdog) = controller(&sim, &SequencerConfig::default());

        let (reply_to, _rx) = ReplyTo::channel();
        shutter.handle_command(ShutterCommand::Close, reply_to);
        let generation = watchdog.last_armed().unwrap();

        shutter.on_watchdog(generation);

        assert_eq!(shutter.state(), ShutterState::Closed);
        assert_eq!(shutter.retry_count(), 0);
        assert_eq!(sim.count(ShutterCommand::Close), 1);
        assert_eq!(shutter.stats().snapshot().stale_events, 1);
    }

    #[test]
    fn test_fresh_close_gets_full_budget() {
        let sim = SimulatedHardware::new();
        sim.set_latency(ShutterCommand::Close, Duration::from_millis(30));
        let config = SequencerConfig {
            max_close_retries: 2,
            ..fast_config()
        };
        let (mut shutter, watchdog) = controller(&sim, &config);

        let (reply_to, _rx) = ReplyTo::channel();
        shutter.handle_command(ShutterCommand::Close, reply_to);
        shutter.on_watchdog(watchdog.last_armed().unwrap());
        shutter.on_watchdog(watchdog.last_armed().unwrap());
        assert_eq!(shutter.state(), ShutterState::Error);

        // Recovered by rollback; urgent paths leave the counter alone
        assert_eq!(shutter.roll_back(), ShutterState::Opened);
        assert_eq!(shutter.retry_count(), 2);

        sim.set_latency(ShutterCommand::Close, Duration::ZERO);
        let (reply_to, mut rx) = ReplyTo::channel();
        shutter.handle_command(ShutterCommand::Close, reply_to);
        assert_eq!(rx.try_recv(), Ok(ShutterState::Closed));
    }

    #[test]
    fn test_open_resets_counter_and_urgent_skips_watchdog() {
        let sim = SimulatedHardware::new();
        sim.set_latency(ShutterCommand::Close, Duration::from_millis(30));
        let (mut shutter, watchdog) = controller(&sim, &fast_config());

        let (reply_to, _rx) = ReplyTo::channel();
        shutter.handle_command(ShutterCommand::Close, reply_to);
        shutter.on_watchdog(watchdog.last_armed().unwrap());
        assert_eq!(shutter.retry_count(), 1);

        // Superseding Open abandons the close and resets the counter
        let (reply_to, mut rx) = ReplyTo::channel();
        shutter.handle_command(ShutterCommand::Open, reply_to);
        assert_eq!(rx.try_recv(), Ok(ShutterState::Opened));
        assert_eq!(shutter.retry_count(), 0);
        assert!(!shutter.is_close_pending());

        let arms = watchdog.armed_generations().len();
        let (reply_to, mut rx) = ReplyTo::channel();
        shutter.handle_command(ShutterCommand::UrgentClose, reply_to);
        assert_eq!(rx.try_recv(), Ok(ShutterState::Closed));
        assert_eq!(watchdog.armed_generations().len(), arms);
    }

    #[test]
    fn test_rollback_issues_urgent_open() {
        let sim = SimulatedHardware::new();
        let (mut shutter, _) = controller(&sim, &SequencerConfig::default());

        let (reply_to, _rx) = ReplyTo::channel();
        shutter.handle_command(ShutterCommand::Close, reply_to);
        assert_eq!(shutter.roll_back(), ShutterState::Opened);
        assert_eq!(
            sim.calls().last(),
            Some(&crate::DeviceCommand::Shutter(ShutterCommand::UrgentOpen))
        );
    }

    #[test]
    fn test_rollback_failure_stays_error() {
        let sim = SimulatedHardware::new();
        sim.fail_always(ShutterCommand::UrgentOpen);
        let (mut shutter, _) = controller(&sim, &SequencerConfig::default());

        assert_eq!(shutter.roll_back(), ShutterState::Error);
        // Not retried inside the controller
        assert_eq!(sim.count(ShutterCommand::UrgentOpen), 1);
    }
}
