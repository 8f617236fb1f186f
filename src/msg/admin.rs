use num_enum::FromPrimitive;

/// Administrative command codes understood by the bearerbox.
///
/// The integers are wire codes, not an ordering. The reverse mapping is
/// total: any integer outside the defined set converts to `Undefined`
/// instead of failing, so a malformed or future wire value can never
/// break the decode path.
#[derive(FromPrimitive)]
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminCommand {
    Shutdown = 0,
    Suspend = 1,
    Resume = 2,
    Identify = 3,
    Restart = 4,
    #[num_enum(default)]
    Undefined = -1,
}

impl AdminCommand {
    /// The fixed wire integer for this command.
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Total reverse mapping from a wire integer.
    pub fn from_value(value: i32) -> Self {
        Self::from(value)
    }
}

/// An administrative control instruction.
///
/// Sent by the engine during the identification handshake and by
/// application code for operational control (suspend, resume, ...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admin {
    /// The administrative intent.
    pub command: AdminCommand,
    /// Identifier of the box the command concerns, when applicable.
    pub box_id: Option<String>,
}

impl Admin {
    pub fn new(command: AdminCommand, box_id: Option<String>) -> Self {
        Self { command, box_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINED: [AdminCommand; 5] = [
        AdminCommand::Shutdown,
        AdminCommand::Suspend,
        AdminCommand::Resume,
        AdminCommand::Identify,
        AdminCommand::Restart,
    ];

    #[test]
    fn wire_values_are_fixed() {
        assert_eq!(AdminCommand::Shutdown.value(), 0);
        assert_eq!(AdminCommand::Suspend.value(), 1);
        assert_eq!(AdminCommand::Resume.value(), 2);
        assert_eq!(AdminCommand::Identify.value(), 3);
        assert_eq!(AdminCommand::Restart.value(), 4);
        assert_eq!(AdminCommand::Undefined.value(), -1);
    }

    #[test]
    fn from_value_round_trips_every_variant() {
        for command in DEFINED {
            assert_eq!(AdminCommand::from_value(command.value()), command);
        }
        assert_eq!(AdminCommand::from_value(-1), AdminCommand::Undefined);
    }

    #[test]
    fn from_value_is_total() {
        for value in [-1000, -2, 5, 6, 42, i32::MIN, i32::MAX] {
            assert_eq!(AdminCommand::from_value(value), AdminCommand::Undefined);
        }
    }
}
