//! Decoder for bodies framed by `Content-Length`.

use std::cmp;

use crate::protocol::{ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Hands out at most `length` bytes, then the terminal [`PayloadItem::Eof`].
///
/// Bytes beyond the announced length stay in the buffer: they belong to the next message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = usize::try_from(self.remaining).map_or(src.len(), |remaining| cmp::min(remaining, src.len()));
        let bytes = src.split_to(len).freeze();

        self.remaining -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_once_length_reached() {
        let mut buffer = BytesMut::from(&b"abc"[..]);
        let mut length_decoder = LengthDecoder::new(5);

        assert_eq!(length_decoder.decode(&mut buffer).unwrap().unwrap().as_bytes().unwrap().len(), 3);
        assert!(length_decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"deGET");
        assert_eq!(length_decoder.decode(&mut buffer).unwrap().unwrap().as_bytes().unwrap().len(), 2);
        assert!(length_decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(&buffer[..], b"GET");
    }

    #[test]
    fn test_basic() {
        let mut buffer: BytesMut = BytesMut::from(&b"101234567890abcdef\r\n\r\n"[..]);

        let mut length_decoder = LengthDecoder::new(10);
        let payload = length_decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(payload.is_chunk());

        let bytes = payload.as_bytes().unwrap();
        assert_eq!(&bytes[..], b"1012345678");
        assert_eq!(&buffer[..], b"90abcdef\r\n\r\n");
    }
}
