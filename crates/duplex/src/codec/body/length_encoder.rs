use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

/// Writes exactly the announced number of bytes.
///
/// A body longer or shorter than its `Content-Length` would corrupt the connection, both are
/// reported as [`SendError::InvalidBody`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
    finished: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length, finished: false }
    }

    pub fn is_finish(&self) -> bool {
        self.finished
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.finished {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                let size = bytes.remaining() as u64;
                if size > self.remaining {
                    return Err(SendError::invalid_body(format!(
                        "body exceeds content-length, {size} bytes written but {} remaining",
                        self.remaining
                    )));
                }
                self.remaining -= size;
                dst.put(bytes);
                Ok(())
            }
            PayloadItem::Trailers(_) | PayloadItem::Eof => {
                self.finished = true;
                if self.remaining > 0 {
                    return Err(SendError::invalid_body(format!("body ended {} bytes short of content-length", self.remaining)));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn writes_exact_length() {
        let mut encoder = LengthEncoder::new(5);
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hel")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"lo")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        assert!(encoder.is_finish());
        assert_eq!(&dst[..], b"hello");
    }

    #[test]
    fn rejects_mismatched_length() {
        let mut dst = BytesMut::new();
        let mut encoder = LengthEncoder::new(2);
        assert!(encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"abc")), &mut dst).is_err());

        let mut encoder = LengthEncoder::new(2);
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"a")), &mut dst).unwrap();
        assert!(encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).is_err());
    }
}
