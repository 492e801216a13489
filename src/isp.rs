//! ISP device controller
//!
//! No local retry and no watchdog: a failed driver call puts the ISP in
//! Error immediately.

use crate::{
    DeviceController, DeviceFault, DeviceId, DeviceStats, IspCommand, IspDriver, IspState,
    PublishedState, ReplyTo,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;

pub struct IspController<D> {
    driver: D,
    state: PublishedState<IspState>,
    last_fault: Option<DeviceFault>,
    stats: Arc<DeviceStats>,
}

impl<D: IspDriver> IspController<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            state: PublishedState::new(IspState::Idle),
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

    pub fn last_fault(&self) -> Option<&DeviceFault> {
        self.last_fault.as_ref()
    }

    fn run(&mut self, command: IspCommand) -> IspState {
        self.state.set(IspState::Busy);

        match self.driver.execute(command) {
            Ok(()) => {
                let state = if command.leaves_busy() {
                    IspState::Busy
                } else {
                    IspState::Idle
                };
                self.state.set(state);
                tracing::info!(device = %DeviceId::Isp, ?command, ?state, "ISP command completed");
            }
            Err(error) => {
                self.stats.hw_failures.fetch_add(1, Ordering::Relaxed);
                let fault = DeviceFault::HardwareCommandFailure {
                    device: DeviceId::Isp,
                    command: format!("{:?}", command).into(),
                    error,
                };
                tracing::error!(device = %DeviceId::Isp, fault = %fault, "ISP fault");
                self.state.set(IspState::Error);
                self.last_fault = Some(fault);
            }
        }

        self.state.get()
    }
}

impl<D: IspDriver> DeviceController for IspController<D> {
    type Command = IspCommand;
    type State = IspState;

    fn device(&self) -> DeviceId {
        DeviceId::Isp
    }

    fn state(&self) -> IspState {
        self.state.get()
    }

    fn subscribe(&self) -> watch::Receiver<IspState> {
        self.state.subscribe()
    }

    fn handle_command(&mut self, command: IspCommand, reply_to: ReplyTo<IspState>) {
        self.stats.commands_handled.fetch_add(1, Ordering::Relaxed);
        let state = self.run(command);
        reply_to.reply(state);
    }

    fn roll_back(&mut self) -> IspState {
        self.stats.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.run(IspCommand::StopMode)
    }

    fn on_watchdog(&mut self, generation: u64) {
        self.stats.stale_events.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(device = %DeviceId::Isp, generation, "ISP has no watchdog, ignoring");
    }
}
