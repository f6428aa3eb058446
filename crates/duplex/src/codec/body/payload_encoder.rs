use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{PayloadItem, PayloadSize, SendError};
use bytes::{Buf, BufMut, BytesMut};

use tokio_util::codec::Encoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthEncoder),

    Chunked(ChunkedEncoder),

    /// Raw bytes, the body ends when the connection closes.
    UntilClose { finished: bool },

    NoBody,
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedEncoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthEncoder::new(size)) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose { finished: false } }
    }

    /// The terminal item has been written.
    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::UntilClose { finished } => *finished,
            Kind::NoBody => true,
        }
    }
}

impl From<PayloadSize> for PayloadEncoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(0) | PayloadSize::Empty => PayloadEncoder::empty(),
            PayloadSize::Length(size) => PayloadEncoder::fix_length(size),
            PayloadSize::Chunked => PayloadEncoder::chunked(),
            PayloadSize::UntilClose => PayloadEncoder::until_close(),
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::UntilClose { finished } => {
                match item {
                    PayloadItem::Chunk(bytes) if !*finished => dst.put(bytes),
                    PayloadItem::Chunk(_) => {}
                    PayloadItem::Trailers(_) | PayloadItem::Eof => *finished = true,
                }
                Ok(())
            }
            Kind::NoBody => Ok(()),
        }
    }
}
