//! Length-prefixed framing: `u32` big-endian length || protobuf bytes.
//!
//! The parser never dispatches a partial frame: bytes accumulate until a
//! full length-prefixed frame is available, exactly the guarantee
//! [`tokio_util::codec::LengthDelimitedCodec`] gives when configured with a
//! big-endian `u32` length field, so the frame codec here is a thin,
//! named wrapper around it rather than a hand-rolled accumulator.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

pub struct FrameCodec(LengthDelimitedCodec);

impl Default for FrameCodec {
    fn default() -> Self {
        Self(
            LengthDelimitedCodec::builder()
                .length_field_type::<u32>()
                .big_endian()
                .new_codec(),
        )
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.0.decode(src)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.0.encode(item, dst)
    }
}
