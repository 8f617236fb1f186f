//! Translation between framed byte payloads and [`Message`] values.
//!
//! The [`Transcoder`] trait is the boundary between the session engine and
//! the wire grammar. Both operations are synchronous, deterministic and
//! free of I/O; their failures are per-message and never close the
//! connection by themselves. [`BoxTranscoder`] is the reference
//! implementation of the bearerbox grammar for the message kinds this
//! crate models.

use crate::msg::{Admin, AdminCommand, HeartBeat, Message, MessageType};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Error decoding a framed payload into a message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload ended before all declared fields were read.
    #[error("message payload is truncated")]
    Truncated,

    /// The discriminant names a kind this transcoder cannot produce.
    #[error("unsupported message type {0:?}")]
    Unsupported(MessageType),

    /// An octet-string length field is neither a size nor the absent marker.
    #[error("invalid octet string length {0}")]
    InvalidOctetLength(i32),

    /// An octet-string field does not hold valid UTF-8.
    #[error("octet string is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Error encoding a message into a framed payload.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A string field is too large for the 32-bit octet-string length.
    #[error("field of {0} bytes exceeds the octet string limit")]
    FieldTooLong(usize),
}

/// Translates between raw framed payloads and typed messages.
pub trait Transcoder: Send + Sync {
    /// Decode the payload of one frame.
    fn decode(&self, payload: &[u8]) -> Result<Message, DecodeError>;

    /// Encode one message into the payload of one frame.
    fn encode(&self, message: &Message) -> Result<Bytes, EncodeError>;
}

/// Reference transcoder for the bearerbox wire grammar.
///
/// A payload is a 4-byte big-endian [`MessageType`] followed by the
/// type-specific fields. Integers are 4-byte big-endian two's complement;
/// octet strings are a 4-byte big-endian length (`-1` marks an absent
/// value) followed by that many UTF-8 bytes.
#[derive(Debug, Default)]
pub struct BoxTranscoder;

impl Transcoder for BoxTranscoder {
    fn decode(&self, payload: &[u8]) -> Result<Message, DecodeError> {
        let mut buf = payload;
        let message_type = MessageType::from(get_i32(&mut buf)?);
        match message_type {
            MessageType::Admin => {
                let command = AdminCommand::from_value(get_i32(&mut buf)?);
                let box_id = get_octstr(&mut buf)?;
                Ok(Message::Admin(Admin::new(command, box_id)))
            }
            MessageType::HeartBeat => {
                let load = get_i32(&mut buf)?;
                Ok(Message::HeartBeat(HeartBeat::new(load)))
            }
            other => Err(DecodeError::Unsupported(other)),
        }
    }

    fn encode(&self, message: &Message) -> Result<Bytes, EncodeError> {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_i32(message.message_type().value());
        match message {
            Message::Admin(admin) => {
                buf.put_i32(admin.command.value());
                put_octstr(&mut buf, admin.box_id.as_deref())?;
            }
            Message::HeartBeat(heartbeat) => {
                buf.put_i32(heartbeat.load);
            }
        }
        Ok(buf.freeze())
    }
}

fn get_i32(buf: &mut &[u8]) -> Result<i32, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::Truncated);
    }
    Ok(buf.get_i32())
}

fn get_octstr(buf: &mut &[u8]) -> Result<Option<String>, DecodeError> {
    let len = get_i32(buf)?;
    if len == -1 {
        return Ok(None);
    }
    if len < 0 {
        return Err(DecodeError::InvalidOctetLength(len));
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(DecodeError::Truncated);
    }
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(Some(String::from_utf8(bytes)?))
}

fn put_octstr(buf: &mut BytesMut, value: Option<&str>) -> Result<(), EncodeError> {
    match value {
        None => buf.put_i32(-1),
        Some(s) => {
            let len = i32::try_from(s.len()).map_err(|_| EncodeError::FieldTooLong(s.len()))?;
            buf.put_i32(len);
            buf.put_slice(s.as_bytes());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: Message) -> Message {
        let transcoder = BoxTranscoder;
        let payload = transcoder.encode(&message).unwrap();
        transcoder.decode(&payload).unwrap()
    }

    #[test]
    fn admin_round_trip_with_box_id() {
        let message = Message::Admin(Admin::new(AdminCommand::Identify, Some("box-7".into())));
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn admin_round_trip_without_box_id() {
        let message = Message::Admin(Admin::new(AdminCommand::Restart, None));
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn heartbeat_round_trip() {
        let message = Message::HeartBeat(HeartBeat::new(12));
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn unknown_admin_wire_value_decodes_to_undefined() {
        // type=Admin, command=99, box id absent
        let mut payload = BytesMut::new();
        payload.put_i32(MessageType::Admin.value());
        payload.put_i32(99);
        payload.put_i32(-1);

        match BoxTranscoder.decode(&payload) {
            Ok(Message::Admin(admin)) => {
                assert_eq!(admin.command, AdminCommand::Undefined);
                assert_eq!(admin.box_id, None);
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut payload = BytesMut::new();
        payload.put_i32(MessageType::HeartBeat.value());
        payload.put_u16(0); // half an i32

        assert!(matches!(
            BoxTranscoder.decode(&payload),
            Err(DecodeError::Truncated)
        ));
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let mut payload = BytesMut::new();
        payload.put_i32(MessageType::Sms.value());

        assert!(matches!(
            BoxTranscoder.decode(&payload),
            Err(DecodeError::Unsupported(MessageType::Sms))
        ));
    }

    #[test]
    fn unknown_type_is_rejected_without_panicking() {
        let mut payload = BytesMut::new();
        payload.put_i32(-42);

        assert!(matches!(
            BoxTranscoder.decode(&payload),
            Err(DecodeError::Unsupported(MessageType::Unknown))
        ));
    }

    #[test]
    fn negative_octet_length_is_rejected() {
        let mut payload = BytesMut::new();
        payload.put_i32(MessageType::Admin.value());
        payload.put_i32(AdminCommand::Suspend.value());
        payload.put_i32(-5);

        assert!(matches!(
            BoxTranscoder.decode(&payload),
            Err(DecodeError::InvalidOctetLength(-5))
        ));
    }
}
