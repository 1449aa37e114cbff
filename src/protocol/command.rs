//! Command set of the Luxtronik socket protocol
//!
//! The controller understands exactly four commands. There is no transaction
//! ID; correlation relies on the controller echoing the command code back as
//! the first word of every response.

use serde::{Deserialize, Serialize};

/// Wire code for writing a single parameter.
pub const CODE_WRITE_PARAMETER: i32 = 3002;
/// Wire code for reading the parameter block.
pub const CODE_READ_PARAMETERS: i32 = 3003;
/// Wire code for reading the calculated-values block.
pub const CODE_READ_CALCULATED: i32 = 3004;
/// Wire code for reading the visibility-flag block.
pub const CODE_READ_VISIBILITY: i32 = 3005;

/// One of the three readable register groups.
///
/// Field definitions are addressed by (read kind, index) within the group's
/// response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadKind {
    /// Settable parameters (mode selectors, target temperatures)
    Parameters,
    /// Measured and computed values (temperatures, power, state)
    CalculatedValues,
    /// Visibility flags describing which controls the firmware exposes
    VisibilityFlags,
}

impl ReadKind {
    /// All read kinds in the order a poll cycle fetches them.
    pub const ALL: [ReadKind; 3] = [
        ReadKind::Parameters,
        ReadKind::CalculatedValues,
        ReadKind::VisibilityFlags,
    ];
}

/// A protocol command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ReadParameters,
    ReadCalculatedValues,
    ReadVisibilityFlags,
    /// Write a single parameter register. The controller echoes the written
    /// (index, value) pair back for verification.
    WriteParameter { index: i32, value: i32 },
}

impl Command {
    /// Wire command code.
    pub fn code(&self) -> i32 {
        match self {
            Command::ReadParameters => CODE_READ_PARAMETERS,
            Command::ReadCalculatedValues => CODE_READ_CALCULATED,
            Command::ReadVisibilityFlags => CODE_READ_VISIBILITY,
            Command::WriteParameter { .. } => CODE_WRITE_PARAMETER,
        }
    }

    /// The register group a read command addresses, `None` for writes.
    pub fn read_kind(&self) -> Option<ReadKind> {
        match self {
            Command::ReadParameters => Some(ReadKind::Parameters),
            Command::ReadCalculatedValues => Some(ReadKind::CalculatedValues),
            Command::ReadVisibilityFlags => Some(ReadKind::VisibilityFlags),
            Command::WriteParameter { .. } => None,
        }
    }

    /// Read command for a register group.
    pub fn read(kind: ReadKind) -> Command {
        match kind {
            ReadKind::Parameters => Command::ReadParameters,
            ReadKind::CalculatedValues => Command::ReadCalculatedValues,
            ReadKind::VisibilityFlags => Command::ReadVisibilityFlags,
        }
    }
}
