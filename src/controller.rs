//! Controller plumbing: message routing, state publication, spawning

use crate::{
    mailbox, DeviceController, DeviceMsg, DeviceState, IspCommand, IspState, MailboxAddr,
    MailboxError, RigError, ShutterCommand, ShutterState,
};
use tokio::sync::watch;

/// Device state owned by a controller and published to observers.
///
/// `set` publishes synchronously, so anyone woken by a later reply sees
/// the new value.
pub struct PublishedState<S> {
    tx: watch::Sender<S>,
}

impl<S: DeviceState> PublishedState<S> {
    pub fn new(initial: S) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> S {
        *self.tx.borrow()
    }

    pub fn set(&self, state: S) {
        self.tx.send_replace(state);
    }

    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }
}

/// Default device event handler.
///
/// Routes one mailbox message to the controller. Runs to completion.
pub fn handle_device_msg<P>(controller: &mut P, msg: DeviceMsg<P::Command, P::State>)
where
    P: DeviceController,
{
    tracing::trace!(device = %controller.device(), event = msg.event_type(), "Device event");

    match msg {
        DeviceMsg::Command { command, reply_to } => {
            controller.handle_command(command, reply_to);
        }

        DeviceMsg::Rollback { reply_to } => {
            let state = controller.roll_back();
            reply_to.reply(state);
        }

        DeviceMsg::WatchdogFired { generation } => {
            controller.on_watchdog(generation);
        }

        DeviceMsg::GetState { reply_to } => {
            reply_to.reply(controller.state());
        }
    }
}

/// Cloneable address of a running controller plus a view of its state
pub struct DevicePort<C, S> {
    addr: MailboxAddr<DeviceMsg<C, S>>,
    state: watch::Receiver<S>,
}

impl<C, S> Clone for DevicePort<C, S> {
    fn clone(&self) -> Self {
        Self {
            addr: self.addr.clone(),
            state: self.state.clone(),
        }
    }
}

pub type ShutterPort = DevicePort<ShutterCommand, ShutterState>;
pub type IspPort = DevicePort<IspCommand, IspState>;

impl<C, S> DevicePort<C, S>
where
    C: Send + 'static,
    S: DeviceState,
{
    /// Post a command and wait until the controller has fully handled it
    pub async fn execute(&self, command: C) -> Result<S, MailboxError> {
        self.addr
            .ask(|reply_to| DeviceMsg::Command { command, reply_to })
            .await
    }

    /// Post a rollback and wait for the resulting state
    pub async fn roll_back(&self) -> Result<S, MailboxError> {
        self.addr.ask(|reply_to| DeviceMsg::Rollback { reply_to }).await
    }

    /// Query the controller through its mailbox (ordered after queued events)
    pub async fn query(&self) -> Result<S, MailboxError> {
        self.addr.ask(|reply_to| DeviceMsg::GetState { reply_to }).await
    }

    /// Last published state
    pub fn state(&self) -> S {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.state.clone()
    }

    pub fn addr(&self) -> &MailboxAddr<DeviceMsg<C, S>> {
        &self.addr
    }
}

/// Owner of a controller thread
pub struct DeviceHandle<C, S> {
    port: DevicePort<C, S>,
    thread: std::thread::JoinHandle<()>,
}

impl<C, S> DeviceHandle<C, S>
where
    C: Send + 'static,
    S: DeviceState,
{
    pub fn port(&self) -> &DevicePort<C, S> {
        &self.port
    }

    /// Stop the controller after it drains its queue, and join its thread
    pub async fn shutdown(self) {
        let name = self.port.addr.name();
        let _ = self.port.addr.stop();
        match tokio::task::spawn_blocking(move || self.thread.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::error!(device = name, "Controller thread panicked"),
            Err(e) => tracing::error!(device = name, error = %e, "Failed to join controller thread"),
        }
    }
}

/// Spawn `build`'s controller on its own named thread.
///
/// `build` receives the controller's own address, so a controller can post
/// events (watchdog expiries) back into its queue.
pub fn spawn_controller<T, F>(
    name: &'static str,
    build: F,
) -> Result<DeviceHandle<T::Command, T::State>, RigError>
where
    T: DeviceController,
    F: FnOnce(MailboxAddr<DeviceMsg<T::Command, T::State>>) -> T,
{
    let (addr, mut inbox) = mailbox(name);
    let mut controller = build(addr.clone());
    let state = controller.subscribe();

    let thread = std::thread::Builder::new()
        .name(format!("{}-controller", name))
        .spawn(move || {
            tracing::info!(device = %controller.device(), "Controller started");
            while let Some(msg) = inbox.blocking_next() {
                handle_device_msg(&mut controller, msg);
            }
            controller.on_stop();
            tracing::info!(device = %controller.device(), "Controller stopped");
        })
        .map_err(|source| RigError::Spawn { name, source })?;

    Ok(DeviceHandle {
        port: DevicePort { addr, state },
        thread,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IspController, SimulatedHardware};

    #[tokio::test]
    async fn test_state_published_before_reply() {
        let sim = SimulatedHardware::new();
        let driver = sim.isp();
        let handle = spawn_controller("isp", move |_addr| IspController::new(driver)).unwrap();
        let port = handle.port().clone();

        assert_eq!(port.execute(IspCommand::PrepareUpdate).await, Ok(IspState::Busy));
        assert_eq!(port.state(), IspState::Busy);
        assert_eq!(port.query().await, Ok(IspState::Busy));

        assert_eq!(port.roll_back().await, Ok(IspState::Idle));
        assert_eq!(port.state(), IspState::Idle);

        handle.shutdown().await;
        assert_eq!(
            port.execute(IspCommand::StartMode).await,
            Err(MailboxError::Closed("isp"))
        );
    }
}
