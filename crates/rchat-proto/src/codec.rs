//! NUL-framed codec for tokio.
//!
//! Frames are the bytes between 0x00 terminators. The decoder yields raw
//! frame bodies; envelope parsing happens a layer up so a malformed frame
//! can be reported without tearing down the connection (the decoder has
//! already advanced past it).

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::envelope::Envelope;
use crate::error::ProtocolError;

/// Default cap on a single frame. Snapshot transfers ride this codec, so
/// the cap is generous.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// NUL-delimited frame codec.
///
/// Decodes to raw [`Bytes`] frame bodies (terminator stripped); encodes an
/// [`Envelope`] as its JSON form plus the terminator.
pub struct FrameCodec {
    /// Index of the next byte to check for a terminator.
    next_index: usize,
    /// Maximum frame length.
    max_frame: usize,
}

impl FrameCodec {
    /// Create a codec with the default frame cap.
    pub fn new() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME)
    }

    /// Create a codec with a custom frame cap.
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            next_index: 0,
            max_frame,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == 0) {
            let mut frame = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            frame.truncate(frame.len() - 1);
            return Ok(Some(frame.freeze()));
        }
        if src.len() > self.max_frame {
            return Err(ProtocolError::FrameTooLong {
                actual: src.len(),
                limit: self.max_frame,
            });
        }
        self.next_index = src.len();
        Ok(None)
    }
}

impl Encoder<Envelope> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let json = item.to_json();
        dst.reserve(json.len() + 1);
        dst.extend_from_slice(json.as_bytes());
        dst.extend_from_slice(&[0]);
        Ok(())
    }
}
