//! Length-prefix framing for the box connection byte stream.
//!
//! Every message travels as `[u32 length][payload]` with the length in
//! big-endian byte order and excluding the prefix itself. The decoder
//! buffers until a complete frame has arrived and rejects a declared
//! length above the configured maximum before allocating anything for it;
//! a corrupt or hostile length field is fatal to the connection, unlike a
//! malformed payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Default upper bound on a frame payload.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Connection-fatal framing violation.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The length prefix declares a payload above the configured maximum.
    #[error("declared frame length {length} exceeds maximum {max}")]
    Oversized { length: usize, max: usize },
}

/// Incremental decoder turning raw bytes into complete frame payloads.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            max_frame_size,
        }
    }

    /// Absorb `input` and return every payload that is now complete, in
    /// arrival order. Partial trailing data stays buffered for the next
    /// call.
    pub fn decode(&mut self, input: &[u8]) -> Result<Vec<Bytes>, FrameError> {
        self.buffer.extend_from_slice(input);

        let mut frames = Vec::new();
        loop {
            if self.buffer.len() < 4 {
                break;
            }
            let length = u32::from_be_bytes([
                self.buffer[0],
                self.buffer[1],
                self.buffer[2],
                self.buffer[3],
            ]) as usize;
            if length > self.max_frame_size {
                return Err(FrameError::Oversized {
                    length,
                    max: self.max_frame_size,
                });
            }
            if self.buffer.len() < 4 + length {
                break;
            }
            self.buffer.advance(4);
            frames.push(self.buffer.split_to(length).freeze());
        }
        Ok(frames)
    }

    /// True when bytes of an incomplete frame are still buffered.
    ///
    /// A clean remote shutdown leaves the buffer empty; a non-empty
    /// buffer at end of stream means the peer closed mid-frame.
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// Wraps one payload with its length prefix.
#[derive(Debug, Default)]
pub struct FrameEncoder;

impl FrameEncoder {
    pub fn encode(&self, payload: &Bytes) -> Result<Bytes, FrameError> {
        let length = u32::try_from(payload.len()).map_err(|_| FrameError::Oversized {
            length: payload.len(),
            max: u32::MAX as usize,
        })?;
        let mut framed = BytesMut::with_capacity(4 + payload.len());
        framed.put_u32(length);
        framed.put_slice(payload);
        Ok(framed.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut framed = (payload.len() as u32).to_be_bytes().to_vec();
        framed.extend_from_slice(payload);
        framed
    }

    #[test]
    fn decodes_a_complete_frame() {
        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        let frames = decoder.decode(&frame(b"hello")).unwrap();
        assert_eq!(frames, vec![Bytes::from_static(b"hello")]);
        assert!(!decoder.has_partial_frame());
    }

    #[test]
    fn buffers_until_the_frame_is_complete() {
        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        let wire = frame(b"split across reads");

        assert!(decoder.decode(&wire[..3]).unwrap().is_empty());
        assert!(decoder.has_partial_frame());
        assert!(decoder.decode(&wire[3..10]).unwrap().is_empty());

        let frames = decoder.decode(&wire[10..]).unwrap();
        assert_eq!(frames, vec![Bytes::from_static(b"split across reads")]);
        assert!(!decoder.has_partial_frame());
    }

    #[test]
    fn decodes_multiple_frames_from_one_read() {
        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        let mut wire = frame(b"one");
        wire.extend_from_slice(&frame(b"two"));

        let frames = decoder.decode(&wire).unwrap();
        assert_eq!(
            frames,
            vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]
        );
    }

    #[test]
    fn zero_length_frame_is_valid() {
        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        let frames = decoder.decode(&frame(b"")).unwrap();
        assert_eq!(frames, vec![Bytes::new()]);
    }

    #[test]
    fn oversized_length_prefix_is_fatal() {
        let mut decoder = FrameDecoder::new(16);
        let wire = 17u32.to_be_bytes();

        assert!(matches!(
            decoder.decode(&wire),
            Err(FrameError::Oversized { length: 17, max: 16 })
        ));
    }

    #[test]
    fn corrupt_length_prefix_is_fatal_before_payload_arrives() {
        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        let wire = u32::MAX.to_be_bytes();

        assert!(decoder.decode(&wire).is_err());
    }

    #[test]
    fn encoder_prefixes_the_length() {
        let framed = FrameEncoder.encode(&Bytes::from_static(b"abc")).unwrap();
        assert_eq!(&framed[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
    }
}
