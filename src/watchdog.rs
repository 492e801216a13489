//! Close-timeout watchdog

use crate::{DeviceMsg, MailboxAddr};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Time-driven source of `WatchdogFired` events.
///
/// Expiry is delivered into the owning controller's mailbox, so it is
/// handled as an ordinary event and never interrupts a handler.
pub trait Watchdog: Send + 'static {
    /// Arm for `generation`, replacing any armed timer
    fn arm(&mut self, generation: u64, timeout: Duration);

    /// Cancel the armed timer, if any
    fn disarm(&mut self);
}

/// Watchdog running as a timer task on a tokio runtime
pub struct TokioWatchdog<C, S> {
    runtime: Handle,
    addr: MailboxAddr<DeviceMsg<C, S>>,
    timer: Option<JoinHandle<()>>,
}

impl<C, S> TokioWatchdog<C, S> {
    pub fn new(runtime: Handle, addr: MailboxAddr<DeviceMsg<C, S>>) -> Self {
        Self {
            runtime,
            addr,
            timer: None,
        }
    }
}

impl<C, S> Watchdog for TokioWatchdog<C, S>
where
    C: Send + 'static,
    S: Send + 'static,
{
    fn arm(&mut self, generation: u64, timeout: Duration) {
        self.disarm();
        let addr = self.addr.clone();
        self.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if addr.tell(DeviceMsg::WatchdogFired { generation }).is_err() {
                tracing::debug!(mailbox = addr.name(), generation, "Watchdog fired after controller stopped");
            }
        }));
    }

    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<C, S> Drop for TokioWatchdog<C, S> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mailbox, ShutterCommand, ShutterState};

    type Msg = DeviceMsg<ShutterCommand, ShutterState>;

    #[tokio::test(start_paused = true)]
    async fn test_fires_into_mailbox() {
        let (addr, mut inbox) = mailbox::<Msg>("shutter");
        let mut watchdog = TokioWatchdog::new(Handle::current(), addr);

        watchdog.arm(4, Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(250)).await;

        match inbox.try_next().into_msg() {
            Some(DeviceMsg::WatchdogFired { generation }) => assert_eq!(generation, 4),
            other => panic!("expected watchdog event, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_cancels() {
        let (addr, mut inbox) = mailbox::<Msg>("shutter");
        let mut watchdog = TokioWatchdog::new(Handle::current(), addr);

        watchdog.arm(1, Duration::from_millis(200));
        watchdog.disarm();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(inbox.try_next().into_msg().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let (addr, mut inbox) = mailbox::<Msg>("shutter");
        let mut watchdog = TokioWatchdog::new(Handle::current(), addr);

        watchdog.arm(1, Duration::from_millis(200));
        watchdog.arm(2, Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(300)).await;

        match inbox.try_next().into_msg() {
            Some(DeviceMsg::WatchdogFired { generation }) => assert_eq!(generation, 2),
            other => panic!("expected watchdog event, got {:?}", other),
        }
        assert!(inbox.try_next().into_msg().is_none());
    }
}
