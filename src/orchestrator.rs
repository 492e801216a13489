//! Sequence orchestrator
//!
//! Drives the step table one step at a time. Each step is posted to its
//! device controller and acknowledged before both device states are
//! inspected; a device in Error triggers compensation. Rollback unwinds
//! to the nearest preceding checkpoint and always issues the shutter's
//! urgent open before the ISP stop.
//!
//! The orchestrator is the only writer of [`SequenceControl`]. Callers talk
//! to it through a [`SequencerHandle`] and read a published
//! [`SequenceStatus`].

use crate::{
    mailbox, rollback_checkpoint, validate_table, DeviceCommand, DeviceId, DeviceState,
    InMemoryJournal, IspCommand, IspPort, Mailbox, MailboxAddr, MailboxError, NoOpObserver,
    ReplyTo, RollbackReason, RunContext, RunId, SequenceControl, SequenceError, SequenceEvent,
    SequenceJournal, SequenceObserver, SequenceOutcome, SequenceState, SequenceStatus,
    SequencerStats, ShutterCommand, ShutterPort, Step, TableError, TryNext,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Requests served by the orchestrator task
#[derive(Debug)]
pub enum SequencerMsg {
    Start {
        reply_to: ReplyTo<Result<(), SequenceError>>,
    },
    Abort {
        reply_to: ReplyTo<Result<(), SequenceError>>,
    },
    Reset {
        reply_to: ReplyTo<Result<(), SequenceError>>,
    },
}

/// Controllers the orchestrator drives
#[derive(Clone)]
pub struct DevicePorts {
    pub shutter: ShutterPort,
    pub isp: IspPort,
}

impl DevicePorts {
    /// Post `command` to its device and wait for the acknowledgement
    async fn dispatch(self, command: DeviceCommand) -> Result<(), MailboxError> {
        match command {
            DeviceCommand::Shutter(command) => self.shutter.execute(command).await.map(|_| ()),
            DeviceCommand::Isp(command) => self.isp.execute(command).await.map(|_| ()),
        }
    }

    /// First device found in Error, shutter checked first
    fn faulted_device(&self) -> Option<DeviceId> {
        if self.shutter.state().is_error() {
            Some(DeviceId::Shutter)
        } else if self.isp.state().is_error() {
            Some(DeviceId::Isp)
        } else {
            None
        }
    }
}

pub struct Sequencer {
    steps: &'static [Step],
    devices: DevicePorts,
    control: SequenceControl,
    run_id: RunId,
    context: RunContext,
    outcome: Option<SequenceOutcome>,
    abort_requested: bool,
    stop_requested: bool,
    status: watch::Sender<SequenceStatus>,
    journal: Arc<dyn SequenceJournal>,
    observer: Arc<dyn SequenceObserver>,
    stats: Arc<SequencerStats>,
}

impl Sequencer {
    pub fn new(steps: &'static [Step], devices: DevicePorts) -> Result<Self, TableError> {
        validate_table(steps)?;
        let (status, _) = watch::channel(SequenceStatus::idle());
        Ok(Self {
            steps,
            devices,
            control: SequenceControl::new(),
            run_id: RunId::new(0),
            context: RunContext::start(RunId::new(0)),
            outcome: None,
            abort_requested: false,
            stop_requested: false,
            status,
            journal: Arc::new(InMemoryJournal::new()),
            observer: Arc::new(NoOpObserver),
            stats: Arc::new(SequencerStats::new()),
        })
    }

    pub fn with_journal(mut self, journal: Arc<dyn SequenceJournal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SequenceObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_stats(mut self, stats: Arc<SequencerStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Run the orchestrator as a task on the current tokio runtime
    pub fn spawn(self) -> (SequencerHandle, JoinHandle<()>) {
        let (addr, inbox) = mailbox("sequencer");
        let handle = SequencerHandle {
            addr,
            status: self.status.subscribe(),
        };
        let task = tokio::spawn(self.run(inbox));
        (handle, task)
    }

    async fn run(mut self, mut inbox: Mailbox<SequencerMsg>) {
        tracing::info!(steps = self.steps.len(), "Sequencer started");

        while let Some(msg) = inbox.next().await {
            match msg {
                SequencerMsg::Start { reply_to } => {
                    let result = self.begin();
                    let accepted = result.is_ok();
                    reply_to.reply(result);
                    if accepted {
                        self.drive(&mut inbox).await;
                    }
                }
                SequencerMsg::Abort { reply_to } => {
                    self.reject("abort", SequenceError::NotRunning, reply_to);
                }
                SequencerMsg::Reset { reply_to } => {
                    let result = self.reset();
                    reply_to.reply(result);
                }
            }

            if self.stop_requested {
                break;
            }
        }

        tracing::info!(last_run = %self.run_id, state = %self.control.state, "Sequencer stopped");
    }

    // === Lifecycle ===

    fn begin(&mut self) -> Result<(), SequenceError> {
        if self.control.state != SequenceState::Idle {
            self.stats.rejected_requests.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(run_id = %self.run_id, state = %self.control.state, "Start rejected");
            return Err(SequenceError::AlreadyRunning);
        }

        self.run_id = self.run_id.next();
        self.context = RunContext::start(self.run_id);
        self.control = SequenceControl {
            state: SequenceState::Running,
            current_index: 0,
            rollback_index: None,
        };
        self.outcome = None;
        self.abort_requested = false;

        self.stats.runs_started.fetch_add(1, Ordering::Relaxed);
        self.record(SequenceEvent::RunStarted {
            steps: self.steps.len(),
        });
        self.observer.on_run_started(&self.context, self.steps.len());
        self.publish();
        Ok(())
    }

    fn reset(&mut self) -> Result<(), SequenceError> {
        match self.control.state {
            SequenceState::Idle => Ok(()),
            SequenceState::Running | SequenceState::Error => {
                self.stats.rejected_requests.fetch_add(1, Ordering::Relaxed);
                Err(SequenceError::StillRunning)
            }
            SequenceState::RollingBack | SequenceState::Aborted => {
                tracing::info!(run_id = %self.run_id, from = %self.control.state, "Sequence reset");
                self.record(SequenceEvent::Reset {
                    run_id: self.run_id,
                });
                self.control = SequenceControl::new();
                self.publish();
                Ok(())
            }
        }
    }

    fn reject(
        &self,
        request: &'static str,
        error: SequenceError,
        reply_to: ReplyTo<Result<(), SequenceError>>,
    ) {
        self.stats.rejected_requests.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(request, state = %self.control.state, error = %error, "Request rejected");
        reply_to.reply(Err(error));
    }

    // === Step driving ===

    async fn drive(&mut self, inbox: &mut Mailbox<SequencerMsg>) {
        loop {
            self.drain_inbox(inbox);
            if self.abort_requested {
                self.abort().await;
                return;
            }

            let index = self.control.current_index;
            let Some(step) = self.steps.get(index).copied() else {
                self.complete();
                return;
            };

            let context = self.context.at_step(index);
            self.stats.steps_dispatched.fetch_add(1, Ordering::Relaxed);
            self.record(SequenceEvent::StepDispatched {
                index,
                command: step.command,
            });
            self.observer.on_step_dispatched(&context, step.command);

            // Keep serving requests while the controller works; nothing else
            // is posted to a device until this acknowledgement arrives
            let started = Instant::now();
            let dispatch = self.devices.clone().dispatch(step.command);
            tokio::pin!(dispatch);
            let delivered = loop {
                tokio::select! {
                    result = &mut dispatch => break result,
                    msg = inbox.next(), if !self.stop_requested => self.handle_while_running(msg),
                }
            };

            let faulted = match delivered {
                Ok(()) => self.devices.faulted_device(),
                Err(error) => {
                    tracing::error!(run_id = %self.run_id, step = index, error = %error, "Lost contact with device");
                    Some(step.target())
                }
            };

            if let Some(device) = faulted {
                self.fail(index, step, device).await;
                return;
            }

            self.record(SequenceEvent::StepSettled {
                index,
                command: step.command,
                shutter: self.devices.shutter.state(),
                isp: self.devices.isp.state(),
            });
            self.observer
                .on_step_settled(&context, step.command, started.elapsed().as_millis() as u64);
            self.control.current_index += 1;
            self.publish();
        }
    }

    /// Serve requests that arrived at a step boundary
    fn drain_inbox(&mut self, inbox: &mut Mailbox<SequencerMsg>) {
        while !self.stop_requested {
            match inbox.try_next() {
                TryNext::Msg(msg) => self.handle_while_running(Some(msg)),
                TryNext::Stopped => self.handle_while_running(None),
                TryNext::Empty => break,
            }
        }
    }

    fn handle_while_running(&mut self, msg: Option<SequencerMsg>) {
        match msg {
            None => {
                tracing::warn!(run_id = %self.run_id, "Stop requested mid-run, aborting");
                self.stop_requested = true;
                self.abort_requested = true;
            }
            Some(SequencerMsg::Start { reply_to }) => {
                self.reject("start", SequenceError::AlreadyRunning, reply_to);
            }
            Some(SequencerMsg::Abort { reply_to }) => {
                if !self.abort_requested {
                    tracing::info!(run_id = %self.run_id, step = self.control.current_index, "Abort accepted");
                }
                self.abort_requested = true;
                reply_to.reply(Ok(()));
            }
            Some(SequencerMsg::Reset { reply_to }) => {
                self.reject("reset", SequenceError::StillRunning, reply_to);
            }
        }
    }

    fn complete(&mut self) {
        self.control.state = SequenceState::Idle;
        self.stats.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.finish(SequenceOutcome::Completed);
    }

    // === Failure and compensation ===

    async fn fail(&mut self, index: usize, step: Step, device: DeviceId) {
        let context = self.context.at_step(index);
        self.stats.steps_failed.fetch_add(1, Ordering::Relaxed);
        self.record(SequenceEvent::StepFailed {
            index,
            command: step.command,
            device,
        });
        self.observer.on_step_failed(&context, step.command, device);

        self.control.state = SequenceState::Error;
        tracing::error!(
            run_id = %self.run_id,
            step = index,
            command = %step.command,
            device = %device,
            state = %self.control.state,
            "Device fault, compensating"
        );
        self.record(SequenceEvent::SequenceFailed { index });

        self.control.state = SequenceState::RollingBack;
        let clean = self
            .roll_back(index, RollbackReason::DeviceFault(device))
            .await;
        self.stats.runs_rolled_back.fetch_add(1, Ordering::Relaxed);
        self.finish(SequenceOutcome::RolledBack { clean });
    }

    async fn abort(&mut self) {
        let index = self.control.current_index;
        let clean = self.roll_back(index, RollbackReason::Abort).await;
        self.control.state = SequenceState::Aborted;
        self.stats.runs_aborted.fetch_add(1, Ordering::Relaxed);
        self.finish(SequenceOutcome::Aborted { clean });
    }

    /// Unwind to the nearest checkpoint before `failed_index`.
    ///
    /// Shutter first, then ISP, for every failure. The ISP rollback is
    /// attempted whatever the shutter's outcome. Returns whether both
    /// devices reached their safe state.
    async fn roll_back(&mut self, failed_index: usize, reason: RollbackReason) -> bool {
        let rollback_index = rollback_checkpoint(self.steps, failed_index);
        self.control.rollback_index = Some(rollback_index);
        self.publish();

        let context = self.context.at_step(failed_index);
        self.record(SequenceEvent::RollbackStarted {
            failed_index,
            rollback_index,
            reason,
        });
        self.observer.on_rollback_started(&context, rollback_index);

        let shutter_safe = match self.devices.shutter.roll_back().await {
            Ok(state) => !state.is_error(),
            Err(error) => {
                tracing::error!(run_id = %self.run_id, error = %error, "Shutter rollback undeliverable");
                false
            }
        };
        self.note_rollback_action(&context, ShutterCommand::UrgentOpen.into(), shutter_safe);

        let isp_safe = match self.devices.isp.roll_back().await {
            Ok(state) => !state.is_error(),
            Err(error) => {
                tracing::error!(run_id = %self.run_id, error = %error, "ISP rollback undeliverable");
                false
            }
        };
        self.note_rollback_action(&context, IspCommand::StopMode.into(), isp_safe);

        shutter_safe && isp_safe
    }

    fn note_rollback_action(&self, context: &RunContext, command: DeviceCommand, succeeded: bool) {
        if !succeeded {
            self.stats
                .rollback_actions_failed
                .fetch_add(1, Ordering::Relaxed);
        }
        self.record(SequenceEvent::RollbackIssued { command, succeeded });
        self.observer.on_rollback_action(context, command, succeeded);
    }

    fn finish(&mut self, outcome: SequenceOutcome) {
        self.outcome = Some(outcome);
        self.record(SequenceEvent::RunFinished { outcome });
        self.observer
            .on_run_finished(&self.context.at_step(self.control.current_index), outcome);
        self.publish();
    }

    // === Reporting ===

    fn record(&self, event: SequenceEvent) {
        if let Err(error) = self.journal.append(self.run_id, event) {
            tracing::warn!(run_id = %self.run_id, error = %error, "Failed to journal sequence event");
        }
    }

    fn publish(&self) {
        let status = SequenceStatus {
            run_id: (self.run_id.get() > 0).then_some(self.run_id),
            state: self.control.state,
            current_index: self.control.current_index,
            rollback_index: self.control.rollback_index,
            outcome: self.outcome,
        };
        self.status.send_replace(status);
    }
}

/// External command surface of a running sequencer
#[derive(Clone)]
pub struct SequencerHandle {
    addr: MailboxAddr<SequencerMsg>,
    status: watch::Receiver<SequenceStatus>,
}

impl SequencerHandle {
    /// Start the sequence. Rejected with `AlreadyRunning` unless Idle.
    pub async fn start_sequence(&self) -> Result<(), SequenceError> {
        self.request(|reply_to| SequencerMsg::Start { reply_to }).await
    }

    /// Abort the running sequence at the next step boundary
    pub async fn abort_sequence(&self) -> Result<(), SequenceError> {
        self.request(|reply_to| SequencerMsg::Abort { reply_to }).await
    }

    /// Return a terminal sequence to Idle
    pub async fn reset(&self) -> Result<(), SequenceError> {
        self.request(|reply_to| SequencerMsg::Reset { reply_to }).await
    }

    pub fn status(&self) -> SequenceStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SequenceStatus> {
        self.status.clone()
    }

    /// Wait until the most recent run has an outcome
    pub async fn wait_for_outcome(&self) -> Result<SequenceStatus, SequenceError> {
        let mut status = self.status.clone();
        let settled = status
            .wait_for(|s| s.outcome.is_some())
            .await
            .map_err(|_| SequenceError::SequencerStopped)?;
        Ok(settled.clone())
    }

    /// Ask the orchestrator to stop. A running sequence is rolled back first.
    pub fn stop(&self) {
        let _ = self.addr.stop();
    }

    async fn request(
        &self,
        make: impl FnOnce(ReplyTo<Result<(), SequenceError>>) -> SequencerMsg,
    ) -> Result<(), SequenceError> {
        self.addr
            .ask(make)
            .await
            .map_err(|_| SequenceError::SequencerStopped)?
    }
}
