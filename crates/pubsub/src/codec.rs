//! CBOR frame encoding

use bytes::Bytes;

use crate::error::CodecError;
use crate::message::Frame;

/// Encode a frame for the wire
pub fn encode_frame(frame: &Frame) -> Result<Bytes, CodecError> {
    let mut buf = Vec::new();
    ciborium::into_writer(frame, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Decode a frame received from a peer, rejecting anything above `max_frame_size`
pub fn decode_frame(bytes: &[u8], max_frame_size: usize) -> Result<Frame, CodecError> {
    if bytes.len() > max_frame_size {
        return Err(CodecError::FrameTooLarge {
            size: bytes.len(),
            max: max_frame_size,
        });
    }

    ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}
