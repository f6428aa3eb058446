//! Inbound request decoding for the server side.
//!
//! [`RequestDecoder`] alternates between two phases: a head is decoded with [`HeaderDecoder`],
//! then the payload decoder selected by the head framing yields chunks until the terminal item.

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::config::ConnectionConfig;
use crate::protocol::{Message, ParseError, PayloadSize, RequestHeader};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A decoder for HTTP requests that handles both headers and payload.
///
/// The `payload_decoder` field is the state: `None` while reading a head, `Some` while reading the
/// body of the last decoded head.
#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self { header_decoder: HeaderDecoder::new(config), payload_decoder: None }
    }

    /// Whether the decoder is between two messages.
    pub fn is_idle(&self) -> bool {
        self.payload_decoder.is_none()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new(&ConnectionConfig::default())
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let Some(item) = payload_decoder.decode(src)? else {
                return Ok(None);
            };
            if item.is_terminal() {
                self.payload_decoder = None;
            }
            return Ok(Some(Message::Payload(item)));
        }

        let message = match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use http::Method;
    use indoc::indoc;

    #[test]
    fn pipelined_requests() {
        let str = indoc! {r#"
        POST /echo HTTP/1.1
        Transfer-Encoding: chunked

        3
        abc
        0

        GET /next HTTP/1.1
        Host: localhost

        "#};
        let mut bytes = BytesMut::from(str.replace('\n', "\r\n").as_str());
        let mut decoder = RequestDecoder::default();

        let Some(Message::Header((header, PayloadSize::Chunked))) = decoder.decode(&mut bytes).unwrap() else {
            panic!("expected a chunked request head");
        };
        assert_eq!(header.method(), Method::POST);

        let Some(Message::Payload(PayloadItem::Chunk(chunk))) = decoder.decode(&mut bytes).unwrap() else {
            panic!("expected a chunk");
        };
        assert_eq!(&chunk[..], b"abc");

        assert!(matches!(decoder.decode(&mut bytes).unwrap(), Some(Message::Payload(PayloadItem::Eof))));
        assert!(decoder.is_idle());

        let Some(Message::Header((header, PayloadSize::Empty))) = decoder.decode(&mut bytes).unwrap() else {
            panic!("expected a bodiless request head");
        };
        assert_eq!(header.uri().path(), "/next");

        // a bodiless request still ends with a terminal item
        assert!(matches!(decoder.decode(&mut bytes).unwrap(), Some(Message::Payload(PayloadItem::Eof))));
        assert!(decoder.decode(&mut bytes).unwrap().is_none());
    }
}
