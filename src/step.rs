//! Step table and checkpoint search

use crate::{DeviceCommand, DeviceId, IspCommand, ShutterCommand};

/// One entry of the sequence table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub command: DeviceCommand,
    /// Safe point a rollback may unwind to
    pub checkpoint: bool,
}

impl Step {
    pub const fn new(command: DeviceCommand, checkpoint: bool) -> Self {
        Self {
            command,
            checkpoint,
        }
    }

    pub const fn shutter(command: ShutterCommand) -> Self {
        Self::new(DeviceCommand::Shutter(command), false)
    }

    pub const fn isp(command: IspCommand) -> Self {
        Self::new(DeviceCommand::Isp(command), false)
    }

    /// Mark this step as a rollback checkpoint
    pub const fn checkpoint(self) -> Self {
        Self {
            checkpoint: true,
            ..self
        }
    }

    pub fn target(&self) -> DeviceId {
        self.command.target()
    }
}

/// Firmware update: stop sensor mode, prepare, close shutter, flash,
/// reopen shutter, finish, resume sensor mode.
///
/// The last steps return both devices to their nominal state (shutter
/// open, ISP idle).
pub const UPDATE_SEQUENCE: &[Step] = &[
    Step::isp(IspCommand::StopMode),
    Step::isp(IspCommand::PrepareUpdate).checkpoint(),
    Step::shutter(ShutterCommand::Close).checkpoint(),
    Step::isp(IspCommand::ApplyUpdate),
    Step::shutter(ShutterCommand::Open).checkpoint(),
    Step::isp(IspCommand::FinishUpdate),
    Step::isp(IspCommand::StartMode),
];

/// Errors from [`validate_table`]
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("step table is empty")]
    Empty,
}

/// Check that a table can be driven
pub fn validate_table(steps: &[Step]) -> Result<(), TableError> {
    if steps.is_empty() {
        return Err(TableError::Empty);
    }
    Ok(())
}

/// Nearest checkpoint strictly before `failed_index`, or 0 when there is
/// none (the start of the table is always safe).
///
/// Compensation always unwinds toward the start, never forward.
pub fn rollback_checkpoint(steps: &[Step], failed_index: usize) -> usize {
    let end = failed_index.min(steps.len());
    steps[..end]
        .iter()
        .rposition(|step| step.checkpoint)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_sequence_shape() {
        assert_eq!(UPDATE_SEQUENCE.len(), 7);
        assert_eq!(UPDATE_SEQUENCE[2].target(), DeviceId::Shutter);
        assert_eq!(
            UPDATE_SEQUENCE[3].command,
            DeviceCommand::Isp(IspCommand::ApplyUpdate)
        );
        let checkpoints: Vec<usize> = UPDATE_SEQUENCE
            .iter()
            .enumerate()
            .filter(|(_, s)| s.checkpoint)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(checkpoints, vec![1, 2, 4]);
    }

    #[test]
    fn test_rollback_checkpoint_is_nearest_preceding() {
        // ApplyUpdate fails: nearest preceding checkpoint is the close
        assert_eq!(rollback_checkpoint(UPDATE_SEQUENCE, 3), 2);
        // FinishUpdate fails: unwinds to the reopen, never forward
        assert_eq!(rollback_checkpoint(UPDATE_SEQUENCE, 5), 4);
        assert_eq!(rollback_checkpoint(UPDATE_SEQUENCE, 6), 4);
        // Failing on a checkpoint itself unwinds to the one before it
        assert_eq!(rollback_checkpoint(UPDATE_SEQUENCE, 2), 1);
        assert_eq!(rollback_checkpoint(UPDATE_SEQUENCE, 4), 2);
    }

    #[test]
    fn test_rollback_checkpoint_defaults_to_start() {
        assert_eq!(rollback_checkpoint(UPDATE_SEQUENCE, 0), 0);
        assert_eq!(rollback_checkpoint(UPDATE_SEQUENCE, 1), 0);

        const NO_CHECKPOINTS: &[Step] = &[
            Step::isp(IspCommand::StopMode),
            Step::isp(IspCommand::StartMode),
        ];
        assert_eq!(rollback_checkpoint(NO_CHECKPOINTS, 1), 0);
    }

    #[test]
    fn test_rollback_checkpoint_matches_brute_force() {
        for failed in 0..=UPDATE_SEQUENCE.len() {
            let expected = (0..failed)
                .filter(|&j| UPDATE_SEQUENCE[j].checkpoint)
                .max()
                .unwrap_or(0);
            assert_eq!(rollback_checkpoint(UPDATE_SEQUENCE, failed), expected);
        }
    }

    #[test]
    fn test_validate_table() {
        assert_eq!(validate_table(&[]), Err(TableError::Empty));
        assert!(validate_table(UPDATE_SEQUENCE).is_ok());
    }
}
