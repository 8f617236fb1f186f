//! Typed protocol messages exchanged over a bearerbox box connection.
//!
//! Every concrete message kind is a variant of [`Message`]; the wire
//! discriminant is derived from the variant tag via
//! [`Message::message_type`], never stored separately, so a decoded
//! message can never disagree with its own type.

pub mod admin;
pub mod heartbeat;

pub use admin::{Admin, AdminCommand};
pub use heartbeat::HeartBeat;

use num_enum::FromPrimitive;

/// Sentinel for integer fields the peer did not populate.
///
/// The box protocol distinguishes "no value" from zero; a heartbeat with
/// an unknown load carries this sentinel, not `0`.
pub const PARAM_UNDEFINED: i32 = -1;

/// Wire discriminant identifying the kind of a framed message.
///
/// The values follow the bearerbox wire protocol. `Sms`, `Ack` and
/// `WdpDatagram` are recognized on the wire but have no concrete message
/// variant in this crate; they are extension points for integrations that
/// supply their own [`Transcoder`](crate::transcode::Transcoder).
#[derive(FromPrimitive)]
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    HeartBeat = 0,
    Admin = 1,
    Sms = 2,
    Ack = 3,
    WdpDatagram = 4,
    /// Any wire value outside the known set.
    #[num_enum(default)]
    Unknown = -1,
}

impl MessageType {
    /// The wire integer for this discriminant.
    pub fn value(self) -> i32 {
        self as i32
    }
}

/// A protocol message carried by exactly one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Admin(Admin),
    HeartBeat(HeartBeat),
}

impl Message {
    /// The discriminant matching this variant.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Admin(_) => MessageType::Admin,
            Message::HeartBeat(_) => MessageType::HeartBeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_matches_variant() {
        let admin = Message::Admin(Admin::new(AdminCommand::Suspend, None));
        assert_eq!(admin.message_type(), MessageType::Admin);

        let heartbeat = Message::HeartBeat(HeartBeat::new(3));
        assert_eq!(heartbeat.message_type(), MessageType::HeartBeat);
    }

    #[test]
    fn message_type_from_unknown_wire_value() {
        assert_eq!(MessageType::from(99), MessageType::Unknown);
        assert_eq!(MessageType::from(-7), MessageType::Unknown);
        assert_eq!(MessageType::from(2), MessageType::Sms);
    }
}
