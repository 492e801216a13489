//! Wiring for a complete sequencer: two controller threads, the shutter
//! watchdog and the orchestrator task.

use crate::{
    spawn_controller, validate_table, DeviceHandle, DevicePorts, DeviceStats, DeviceStatsSnapshot,
    InMemoryJournal, IspCommand, IspController, IspDriver, IspPort, IspState, RigError, Sequencer,
    SequencerConfig, SequencerHandle, SequencerStats, SequencerStatsSnapshot, ShutterCommand,
    ShutterController, ShutterDriver, ShutterPort, ShutterState, Step, TokioWatchdog,
    TracingObserver,
};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub struct Rig {
    sequencer: SequencerHandle,
    sequencer_task: JoinHandle<()>,
    shutter: DeviceHandle<ShutterCommand, ShutterState>,
    isp: DeviceHandle<IspCommand, IspState>,
    journal: Arc<InMemoryJournal>,
    stats: Arc<SequencerStats>,
    shutter_stats: Arc<DeviceStats>,
    isp_stats: Arc<DeviceStats>,
}

impl Rig {
    /// Spawn everything on the current tokio runtime.
    ///
    /// Fails without a runtime, on an invalid config or table, or if a
    /// controller thread cannot be started.
    pub fn spawn<S, I>(
        config: SequencerConfig,
        steps: &'static [Step],
        shutter_driver: S,
        isp_driver: I,
    ) -> Result<Self, RigError>
    where
        S: ShutterDriver,
        I: IspDriver,
    {
        config.validate()?;
        validate_table(steps)?;
        let runtime = Handle::try_current()?;
        let close_timeout = config.close_timeout();

        let shutter_stats = Arc::new(DeviceStats::new());
        let isp_stats = Arc::new(DeviceStats::new());

        let shutter = {
            let stats = shutter_stats.clone();
            spawn_controller("shutter", move |addr| {
                let watchdog = TokioWatchdog::new(runtime, addr);
                ShutterController::new(shutter_driver, watchdog, &config).with_stats(stats)
            })?
        };
        let isp = {
            let stats = isp_stats.clone();
            spawn_controller("isp", move |_addr| IspController::new(isp_driver).with_stats(stats))?
        };

        let journal = Arc::new(InMemoryJournal::new());
        let stats = Arc::new(SequencerStats::new());
        let devices = DevicePorts {
            shutter: shutter.port().clone(),
            isp: isp.port().clone(),
        };
        let (sequencer, sequencer_task) = Sequencer::new(steps, devices)?
            .with_journal(journal.clone())
            .with_observer(Arc::new(TracingObserver))
            .with_stats(stats.clone())
            .spawn();

        tracing::info!(
            steps = steps.len(),
            close_timeout_ms = close_timeout.as_millis() as u64,
            "Rig started"
        );

        Ok(Self {
            sequencer,
            sequencer_task,
            shutter,
            isp,
            journal,
            stats,
            shutter_stats,
            isp_stats,
        })
    }

    pub fn sequencer(&self) -> &SequencerHandle {
        &self.sequencer
    }

    pub fn shutter(&self) -> &ShutterPort {
        self.shutter.port()
    }

    pub fn isp(&self) -> &IspPort {
        self.isp.port()
    }

    pub fn journal(&self) -> &Arc<InMemoryJournal> {
        &self.journal
    }

    pub fn stats(&self) -> SequencerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn shutter_stats(&self) -> DeviceStatsSnapshot {
        self.shutter_stats.snapshot()
    }

    pub fn isp_stats(&self) -> DeviceStatsSnapshot {
        self.isp_stats.snapshot()
    }

    /// Stop the orchestrator (rolling back a running sequence), then the
    /// controllers, and join their threads.
    pub async fn shutdown(self) {
        self.sequencer.stop();
        if let Err(e) = self.sequencer_task.await {
            tracing::error!(error = %e, "Sequencer task failed");
        }
        self.shutter.shutdown().await;
        self.isp.shutdown().await;
        tracing::info!("Rig stopped");
    }
}
