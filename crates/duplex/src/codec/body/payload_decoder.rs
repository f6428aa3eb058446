//! Decoder implementation for HTTP message payloads.
//!
//! This module provides a unified decoder for the framings an HTTP/1.x body can use:
//! - Content-Length based payloads
//! - Chunked transfer encoding
//! - Close-delimited payloads
//! - Messages with no body

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::codec::body::until_close_decoder::UntilCloseDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),

    Chunked(ChunkedDecoder),

    UntilClose(UntilCloseDecoder),

    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose(UntilCloseDecoder) }
    }

    pub fn is_until_close(&self) -> bool {
        matches!(self.kind, Kind::UntilClose(_))
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(length) => PayloadDecoder::fix_length(length),
            PayloadSize::Chunked => PayloadDecoder::chunked(),
            PayloadSize::UntilClose => PayloadDecoder::until_close(),
            PayloadSize::Empty => PayloadDecoder::empty(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::UntilClose(until_close_decoder) => until_close_decoder.decode(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}
