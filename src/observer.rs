//! Sequence observer trait

use super::{DeviceCommand, DeviceId, RunContext, SequenceOutcome};

/// Observer trait for external observability
pub trait SequenceObserver: Send + Sync + 'static {
    fn on_run_started(&self, context: &RunContext, steps: usize);
    fn on_step_dispatched(&self, context: &RunContext, command: DeviceCommand);
    fn on_step_settled(&self, context: &RunContext, command: DeviceCommand, duration_millis: u64);
    fn on_step_failed(&self, context: &RunContext, command: DeviceCommand, device: DeviceId);
    fn on_rollback_started(&self, context: &RunContext, rollback_index: usize);
    fn on_rollback_action(&self, context: &RunContext, command: DeviceCommand, succeeded: bool);
    fn on_run_finished(&self, context: &RunContext, outcome: SequenceOutcome);
}

/// No-op observer
pub struct NoOpObserver;

impl SequenceObserver for NoOpObserver {
    fn on_run_started(&self, _context: &RunContext, _steps: usize) {}
    fn on_step_dispatched(&self, _context: &RunContext, _command: DeviceCommand) {}
    fn on_step_settled(&self, _context: &RunContext, _command: DeviceCommand, _duration_millis: u64) {}
    fn on_step_failed(&self, _context: &RunContext, _command: DeviceCommand, _device: DeviceId) {}
    fn on_rollback_started(&self, _context: &RunContext, _rollback_index: usize) {}
    fn on_rollback_action(&self, _context: &RunContext, _command: DeviceCommand, _succeeded: bool) {}
    fn on_run_finished(&self, _context: &RunContext, _outcome: SequenceOutcome) {}
}

/// Tracing-based observer
pub struct TracingObserver;

impl SequenceObserver for TracingObserver {
    fn on_run_started(&self, context: &RunContext, steps: usize) {
        tracing::info!(run_id = %context.run_id, steps, "Sequence started");
    }

    fn on_step_dispatched(&self, context: &RunContext, command: DeviceCommand) {
        tracing::debug!(run_id = %context.run_id, step = context.step_index, command = %command, "Step dispatched");
    }

    fn on_step_settled(&self, context: &RunContext, command: DeviceCommand, duration_millis: u64) {
        tracing::info!(run_id = %context.run_id, step = context.step_index, command = %command, duration_ms = duration_millis, "Step settled");
    }

    fn on_step_failed(&self, context: &RunContext, command: DeviceCommand, device: DeviceId) {
        tracing::warn!(run_id = %context.run_id, step = context.step_index, command = %command, device = %device, "Step failed");
    }

    fn on_rollback_started(&self, context: &RunContext, rollback_index: usize) {
        tracing::warn!(run_id = %context.run_id, step = context.step_index, rollback_index, "Rollback started");
    }

    fn on_rollback_action(&self, context: &RunContext, command: DeviceCommand, succeeded: bool) {
        if succeeded {
            tracing::info!(run_id = %context.run_id, command = %command, "Rollback action completed");
        } else {
            tracing::error!(run_id = %context.run_id, command = %command, "Rollback action failed - operator intervention required");
        }
    }

    fn on_run_finished(&self, context: &RunContext, outcome: SequenceOutcome) {
        match outcome {
            SequenceOutcome::Completed => {
                tracing::info!(run_id = %context.run_id, elapsed_ms = context.elapsed_millis(), "Sequence completed")
            }
            SequenceOutcome::RolledBack { clean } | SequenceOutcome::Aborted { clean } => {
                tracing::error!(run_id = %context.run_id, step = context.step_index, ?outcome, clean, "Sequence ended in rollback")
            }
        }
    }
}
