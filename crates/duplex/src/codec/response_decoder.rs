//! Inbound response decoding for the client side.

use crate::codec::body::PayloadDecoder;
use crate::codec::header::ResponseHeaderDecoder;
use crate::config::ConnectionConfig;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, ResponseHead};
use bytes::BytesMut;
use http::Method;
use tokio_util::codec::Decoder;

/// Decodes responses, matching them in order with the requests recorded through
/// [`push_request_method`](Self::push_request_method).
///
/// Close-delimited bodies end in [`decode_eof`](Decoder::decode_eof), when the transport reports
/// end of stream.
#[derive(Debug)]
pub struct ResponseDecoder {
    header_decoder: ResponseHeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self { header_decoder: ResponseHeaderDecoder::new(config), payload_decoder: None }
    }

    pub fn push_request_method(&mut self, method: Method) {
        self.header_decoder.push_request_method(method);
    }

    /// Requests written but not yet answered with a final response.
    pub fn pending(&self) -> usize {
        self.header_decoder.pending()
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new(&ConnectionConfig::default())
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHead, PayloadSize)>;
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
            Some((head, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((head, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }

        match &self.payload_decoder {
            Some(payload_decoder) if payload_decoder.is_until_close() => {
                self.payload_decoder = None;
                Ok(Some(Message::Payload(PayloadItem::Eof)))
            }
            Some(_) => Err(ParseError::invalid_body("connection closed before the body completed")),
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::unexpected_message(format!("connection closed with {} bytes of a partial head", src.len()))),
        }
    }
}
