//! Firmware Update Example
//!
//! Runs the update sequence twice against simulated hardware:
//!
//! - a clean run that leaves the shutter open and the ISP idle
//! - a run where ApplyUpdate fails, which rolls back to the shutter-close
//!   checkpoint by urgently opening the shutter and stopping the ISP
//!
//! Set `RUST_LOG=info` (or `debug`) to watch the controllers.

use isp_update_sequencer::{
    IspCommand, Rig, RunId, SequencerConfig, SimulatedHardware, UPDATE_SEQUENCE,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = SequencerConfig::from_env()?;
    tracing::info!(?config, "Starting firmware update example");

    let hw = SimulatedHardware::new();
    hw.set_latency(IspCommand::ApplyUpdate, Duration::from_millis(50));
    let rig = Rig::spawn(config, UPDATE_SEQUENCE, hw.shutter(), hw.isp())?;
    let sequencer = rig.sequencer().clone();

    // Clean run
    sequencer.start_sequence().await?;
    let status = sequencer.wait_for_outcome().await?;
    tracing::info!(?status, calls = ?hw.calls(), "First run finished");

    // Flash failure
    sequencer.reset().await?;
    hw.clear_calls();
    hw.fail_next(IspCommand::ApplyUpdate, 1);
    sequencer.start_sequence().await?;
    let status = sequencer.wait_for_outcome().await?;
    tracing::info!(?status, calls = ?hw.calls(), "Second run finished");

    for event in rig.journal().events(RunId::new(2)) {
        tracing::info!(event = event.event_type(), ?event, "Journal");
    }
    tracing::info!(stats = ?rig.stats(), "Sequencer stats");

    sequencer.reset().await?;
    rig.shutdown().await;
    Ok(())
}
