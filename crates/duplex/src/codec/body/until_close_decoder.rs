//! Decoder for bodies delimited by the end of the connection.
//!
//! Used for responses that carry neither `Content-Length` nor chunked framing. Every byte read is
//! body; the terminal item is produced by [`ResponseDecoder`](crate::codec::ResponseDecoder) when
//! the transport reports end of stream.

use crate::protocol::{ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UntilCloseDecoder;

impl Decoder for UntilCloseDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(PayloadItem::Chunk(src.split().freeze())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_everything() {
        let mut buffer = BytesMut::from(&b"HTTP/1.1 200 OK"[..]);
        let item = UntilCloseDecoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(item.as_bytes().unwrap().len(), 15);
        assert!(UntilCloseDecoder.decode(&mut buffer).unwrap().is_none());
    }
}
