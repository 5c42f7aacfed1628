use std::convert::TryFrom;
use std::io;

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use tokio_codec::{Decoder, Encoder};

/// Frame header is a big endian u32 holding the length of the frame body.
const FRAME_HEADER_LENGTH: usize = 4;
/// Max message size is [64KB](https://developers.google.com/cast/docs/reference/messages).
pub const FRAME_MAX_LENGTH: usize = 64 << 10;

/// `FrameCodec` splits a byte stream into length-prefixed frames. This enum
/// represents the phase of the decoding. Keep track of the decode phase to
/// ensure the decoder does not drop bytes from the `BytesMut`.
#[derive(Debug)]
enum DecodeState {
    /// Waiting to read a u32 representing the size of the next frame.
    Header,
    /// Reading a frame body with a given length.
    Body(usize),
}

impl Default for DecodeState {
    fn default() -> Self {
        DecodeState::Header
    }
}

/// Frame transport for the cast wire protocol.
///
/// Frames are opaque to this layer: the decoder yields exactly the bytes
/// that followed each length prefix, in the order the peer wrote them, and
/// the encoder writes each item as exactly one frame. Envelope decoding
/// happens above the transport so a bad envelope never tears down the
/// stream. A length prefix above [`FRAME_MAX_LENGTH`] is a transport error.
#[derive(Debug, Default)]
pub struct FrameCodec {
    state: DecodeState,
    decoded_frames: u64,
    encoded_frames: u64,
}

impl FrameCodec {
    /// Read the length of the next frame and reserve that much capacity in
    /// the `BytesMut`. At least 4 bytes are required.
    fn decode_header(&mut self, src: &mut BytesMut) -> io::Result<Option<usize>> {
        if src.len() < FRAME_HEADER_LENGTH {
            return Ok(None);
        }
        let header = src.split_to(FRAME_HEADER_LENGTH);
        let length = BigEndian::read_u32(&header) as usize;
        if length > FRAME_MAX_LENGTH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "received frame of length {}, which is larger than the max frame length of {}",
                    length, FRAME_MAX_LENGTH
                ),
            ));
        }
        src.reserve(length);
        Ok(Some(length))
    }

    fn decode_body(&self, n: usize, src: &mut BytesMut) -> Option<BytesMut> {
        if src.len() < n {
            return None;
        }
        Some(src.split_to(n))
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let n = match self.state {
            DecodeState::Header => match self.decode_header(src)? {
                Some(n) => n,
                None => return Ok(None),
            },
            DecodeState::Body(n) => n,
        };
        self.state = DecodeState::Body(n);
        match self.decode_body(n, src) {
            Some(frame) => {
                self.state = DecodeState::Header;
                src.reserve(FRAME_HEADER_LENGTH);
                self.decoded_frames += 1;
                trace!("codec decoded frame {} of {} bytes", self.decoded_frames, n);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

impl Encoder for FrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn encode(&mut self, item: Self::Item, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > FRAME_MAX_LENGTH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "refusing to encode frame of length {}, which is larger than the max frame length of {}",
                    item.len(),
                    FRAME_MAX_LENGTH
                ),
            ));
        }
        let length = u32::try_from(item.len())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let header = &mut [0; FRAME_HEADER_LENGTH];
        BigEndian::write_u32(header, length);

        dst.reserve(FRAME_HEADER_LENGTH + item.len());
        dst.put_slice(header);
        dst.put_slice(&item);
        self.encoded_frames += 1;
        trace!("codec encoded frame {} of {} bytes", self.encoded_frames, item.len());
        Ok(())
    }
}
