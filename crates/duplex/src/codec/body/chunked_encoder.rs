use crate::codec::FastWrite;
use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use std::io::Write;

use tokio_util::codec::Encoder;

/// Writes chunks as `size CRLF data CRLF`, and the terminal chunk with optional trailers.
///
/// Empty chunks are skipped: a zero-size chunk would end the body early.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                if !bytes.has_remaining() {
                    return Ok(());
                }
                write!(FastWrite(dst), "{:X}\r\n", bytes.remaining())?;
                dst.reserve(bytes.remaining() + 2);
                dst.put(bytes);
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Trailers(trailers) => {
                self.eof = true;
                dst.extend_from_slice(b"0\r\n");
                for (name, value) in &trailers {
                    dst.put_slice(name.as_ref());
                    dst.put_slice(b": ");
                    dst.put_slice(value.as_ref());
                    dst.put_slice(b"\r\n");
                }
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderMap;

    #[test]
    fn chunks_then_eof() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"0123456789abcdefX")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        assert!(!encoder.is_finish());
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        assert!(encoder.is_finish());

        assert_eq!(&dst[..], b"11\r\n0123456789abcdefX\r\n0\r\n\r\n");
    }

    #[test]
    fn trailers_end_the_body() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();
        let mut trailers = HeaderMap::new();
        trailers.insert("x-sum", "12".parse().unwrap());

        encoder.encode(PayloadItem::<Bytes>::Trailers(trailers), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"late")), &mut dst).unwrap();
        assert_eq!(&dst[..], b"0\r\nx-sum: 12\r\n\r\n");
    }
}
