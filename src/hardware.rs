//! Hardware driver seams and a simulated rig
//!
//! Each device is reached through one blocking call. The driver layer owns
//! register-level control and bounds its own call duration.

use crate::{DeviceCommand, HwError, IspCommand, ShutterCommand};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Blocking shutter driver
pub trait ShutterDriver: Send + 'static {
    fn execute(&mut self, command: ShutterCommand) -> Result<(), HwError>;
}

/// Blocking ISP driver
pub trait IspDriver: Send + 'static {
    fn execute(&mut self, command: IspCommand) -> Result<(), HwError>;
}

impl<F> ShutterDriver for F
where
    F: FnMut(ShutterCommand) -> Result<(), HwError> + Send + 'static,
{
    fn execute(&mut self, command: ShutterCommand) -> Result<(), HwError> {
        self(command)
    }
}

impl<F> IspDriver for F
where
    F: FnMut(IspCommand) -> Result<(), HwError> + Send + 'static,
{
    fn execute(&mut self, command: IspCommand) -> Result<(), HwError> {
        self(command)
    }
}

#[derive(Default)]
struct SimInner {
    calls: Vec<DeviceCommand>,
    /// Remaining injected failures per command; `u32::MAX` never runs out
    failures: HashMap<DeviceCommand, u32>,
    latency: HashMap<DeviceCommand, Duration>,
}

/// Simulated shutter and ISP sharing one call log.
///
/// The shared log gives the global order of hardware calls across both
/// devices. Clones share the same simulation.
#[derive(Clone, Default)]
pub struct SimulatedHardware {
    inner: Arc<Mutex<SimInner>>,
}

impl SimulatedHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver for the shutter half of the rig
    pub fn shutter(&self) -> SimulatedShutter {
        SimulatedShutter { sim: self.clone() }
    }

    /// Driver for the ISP half of the rig
    pub fn isp(&self) -> SimulatedIsp {
        SimulatedIsp { sim: self.clone() }
    }

    /// Fail the next `times` calls of `command`
    pub fn fail_next(&self, command: impl Into<DeviceCommand>, times: u32) {
        self.with(|inner| {
            inner.failures.insert(command.into(), times);
        });
    }

    /// Fail every call of `command` until cleared
    pub fn fail_always(&self, command: impl Into<DeviceCommand>) {
        self.fail_next(command, u32::MAX);
    }

    pub fn clear_failures(&self) {
        self.with(|inner| inner.failures.clear());
    }

    /// Make every call of `command` take `latency`
    pub fn set_latency(&self, command: impl Into<DeviceCommand>, latency: Duration) {
        self.with(|inner| {
            inner.latency.insert(command.into(), latency);
        });
    }

    /// Every hardware call so far, in order
    pub fn calls(&self) -> Vec<DeviceCommand> {
        self.with(|inner| inner.calls.clone())
    }

    /// Number of calls of `command` so far
    pub fn count(&self, command: impl Into<DeviceCommand>) -> usize {
        let command = command.into();
        self.with(|inner| inner.calls.iter().filter(|c| **c == command).count())
    }

    pub fn clear_calls(&self) {
        self.with(|inner| inner.calls.clear());
    }

    fn with<R>(&self, f: impl FnOnce(&mut SimInner) -> R) -> R {
        // A panicking test thread must not wedge the other device
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut inner)
    }

    fn run(&self, command: DeviceCommand) -> Result<(), HwError> {
        let (latency, fail) = self.with(|inner| {
            inner.calls.push(command);
            let fail = match inner.failures.get_mut(&command) {
                Some(remaining) if *remaining > 0 => {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    true
                }
                _ => false,
            };
            (inner.latency.get(&command).copied(), fail)
        });

        // Sleep outside the lock so the other device keeps running
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }

        if fail {
            tracing::debug!(command = %command, "Simulated hardware failure");
            Err(HwError::Rejected(format!("injected failure on {}", command).into()))
        } else {
            Ok(())
        }
    }
}

/// Shutter driver backed by [`SimulatedHardware`]
pub struct SimulatedShutter {
    sim: SimulatedHardware,
}

impl ShutterDriver for SimulatedShutter {
    fn execute(&mut self, command: ShutterCommand) -> Result<(), HwError> {
        self.sim.run(command.into())
    }
}

/// ISP driver backed by [`SimulatedHardware`]
pub struct SimulatedIsp {
    sim: SimulatedHardware,
}

impl IspDriver for SimulatedIsp {
    fn execute(&mut self, command: IspCommand) -> Result<(), HwError> {
        self.sim.run(command.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_call_log_order() {
        let sim = SimulatedHardware::new();
        let mut shutter = sim.shutter();
        let mut isp = sim.isp();

        isp.execute(IspCommand::StopMode).unwrap();
        shutter.execute(ShutterCommand::Close).unwrap();
        isp.execute(IspCommand::StartMode).unwrap();

        assert_eq!(
            sim.calls(),
            vec![
                DeviceCommand::Isp(IspCommand::StopMode),
                DeviceCommand::Shutter(ShutterCommand::Close),
                DeviceCommand::Isp(IspCommand::StartMode),
            ]
        );
    }

    #[test]
    fn test_fail_next_runs_out() {
        let sim = SimulatedHardware::new();
        let mut isp = sim.isp();
        sim.fail_next(IspCommand::ApplyUpdate, 2);

        assert!(isp.execute(IspCommand::ApplyUpdate).is_err());
        assert!(isp.execute(IspCommand::ApplyUpdate).is_err());
        assert!(isp.execute(IspCommand::ApplyUpdate).is_ok());
        // Other commands are unaffected
        assert!(isp.execute(IspCommand::PrepareUpdate).is_ok());
        assert_eq!(sim.count(IspCommand::ApplyUpdate), 3);
    }

    #[test]
    fn test_fail_always_until_cleared() {
        let sim = SimulatedHardware::new();
        let mut shutter = sim.shutter();
        sim.fail_always(ShutterCommand::UrgentOpen);

        for _ in 0..5 {
            assert!(shutter.execute(ShutterCommand::UrgentOpen).is_err());
        }
        sim.clear_failures();
        assert!(shutter.execute(ShutterCommand::UrgentOpen).is_ok());
    }

    #[test]
    fn test_closure_driver() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let mut driver = move |command: ShutterCommand| -> Result<(), HwError> {
            log.lock().unwrap().push(command);
            Err(HwError::NotResponding)
        };
        assert_eq!(
            ShutterDriver::execute(&mut driver, ShutterCommand::Open),
            Err(HwError::NotResponding)
        );
        assert_eq!(*seen.lock().unwrap(), vec![ShutterCommand::Open]);
    }
}
