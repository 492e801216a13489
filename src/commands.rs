//! Device identities and per-device command sets

use serde::{Deserialize, Serialize};

/// Devices driven by the sequencer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceId {
    Shutter,
    Isp,
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceId::Shutter => write!(f, "shutter"),
            DeviceId::Isp => write!(f, "isp"),
        }
    }
}

/// Optical shutter commands
///
/// Urgent variants skip the close watchdog and retry bookkeeping. They are
/// used for rollback and expedited requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShutterCommand {
    Open,
    Close,
    UrgentOpen,
    UrgentClose,
}

impl ShutterCommand {
    /// Whether this command leaves the shutter closed on success
    pub fn closes(&self) -> bool {
        matches!(self, Self::Close | Self::UrgentClose)
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self, Self::UrgentOpen | Self::UrgentClose)
    }
}

/// Image-signal-processor commands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IspCommand {
    StopMode,
    StartMode,
    PrepareUpdate,
    ApplyUpdate,
    FinishUpdate,
}

impl IspCommand {
    /// Intermediate firmware-update steps leave the ISP busy until the
    /// update is finished or rolled back
    pub fn leaves_busy(&self) -> bool {
        matches!(self, Self::PrepareUpdate | Self::ApplyUpdate)
    }
}

/// A command addressed to one device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCommand {
    Shutter(ShutterCommand),
    Isp(IspCommand),
}

impl DeviceCommand {
    /// Device this command is delivered to
    pub fn target(&self) -> DeviceId {
        match self {
            Self::Shutter(_) => DeviceId::Shutter,
            Self::Isp(_) => DeviceId::Isp,
        }
    }
}

impl From<ShutterCommand> for DeviceCommand {
    fn from(command: ShutterCommand) -> Self {
        Self::Shutter(command)
    }
}

impl From<IspCommand> for DeviceCommand {
    fn from(command: IspCommand) -> Self {
        Self::Isp(command)
    }
}

impl std::fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shutter(c) => write!(f, "{:?}->shutter", c),
            Self::Isp(c) => write!(f, "{:?}->isp", c),
        }
    }
}
