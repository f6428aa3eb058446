//! Response head decoding for the client side.
//!
//! Whether a response has a body depends on the request it answers, so the decoder keeps the
//! methods of the requests written so far, in order.

use std::collections::VecDeque;

use bytes::BytesMut;
use http::{HeaderMap, Method, Response, StatusCode};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use super::header_decoder::{HeaderIndex, content_length, fill_headers, parse_version, transfer_encoding_chunked};
use crate::config::ConnectionConfig;
use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, ResponseHead, response_has_body};

#[derive(Debug, Clone)]
pub struct ResponseHeaderDecoder {
    max_headers: usize,
    max_header_bytes: usize,
    methods: VecDeque<Method>,
}

impl ResponseHeaderDecoder {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self { max_headers: config.max_headers, max_header_bytes: config.max_header_bytes, methods: VecDeque::new() }
    }

    /// Records a request written to the peer; its response is expected after all earlier ones.
    pub fn push_request_method(&mut self, method: Method) {
        self.methods.push_back(method);
    }

    /// Requests still waiting for a final response.
    pub fn pending(&self) -> usize {
        self.methods.len()
    }
}

impl Default for ResponseHeaderDecoder {
    fn default() -> Self {
        Self::new(&ConnectionConfig::default())
    }
}

impl Decoder for ResponseHeaderDecoder {
    type Item = (ResponseHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut headers = vec![httparse::EMPTY_HEADER; self.max_headers];
        let mut res = httparse::Response::new(&mut headers);

        let status = res.parse(src).map_err(|e| match e {
            httparse::Error::TooManyHeaders => ParseError::too_many_headers(self.max_headers),
            e => ParseError::invalid_header(e),
        })?;

        let head_size = match status {
            Status::Complete(head_size) => head_size,
            Status::Partial => {
                ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                return Ok(None);
            }
        };

        ensure!(head_size <= self.max_header_bytes, ParseError::too_large_header(head_size, self.max_header_bytes));

        let version = parse_version(res.version)?;
        let status = StatusCode::from_u16(res.code.ok_or(ParseError::InvalidStatus)?).map_err(|_| ParseError::InvalidStatus)?;
        let indices = HeaderIndex::record(src, res.headers);

        let head_bytes = src.split_to(head_size).freeze();

        let mut response = Response::new(());
        *response.status_mut() = status;
        *response.version_mut() = version;
        fill_headers(&head_bytes, &indices, response.headers_mut())?;

        // interim responses leave the request waiting, 101 ends the exchange
        let method = if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
            self.methods.front().cloned()
        } else {
            self.methods.pop_front()
        };
        let method = method.ok_or_else(|| ParseError::unexpected_message(format!("response {status} without a pending request")))?;

        trace!(%status, %method, head_size, "parsed response head");
        let payload_size = response_payload_size(&method, status, response.headers())?;
        Ok(Some((response, payload_size)))
    }
}

fn response_payload_size(method: &Method, status: StatusCode, headers: &HeaderMap) -> Result<PayloadSize, ParseError> {
    if !response_has_body(method, status) {
        return Ok(PayloadSize::new_empty());
    }

    match (transfer_encoding_chunked(headers), content_length(headers)?) {
        (Some(true), _) => Ok(PayloadSize::new_chunked()),
        (Some(false), _) => Ok(PayloadSize::UntilClose),
        (None, Some(length)) => Ok(PayloadSize::new_length(length)),
        (None, None) => Ok(PayloadSize::UntilClose),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(methods: &[Method]) -> ResponseHeaderDecoder {
        let mut decoder = ResponseHeaderDecoder::default();
        for method in methods {
            decoder.push_request_method(method.clone());
        }
        decoder
    }

    #[test]
    fn head_response_has_no_body() {
        let mut decoder = decoder(&[Method::HEAD, Method::GET]);
        let mut bytes = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");

        let (_, size) = decoder.decode(&mut bytes).unwrap().unwrap();
        assert_eq!(size, PayloadSize::Empty);

        let (head, size) = decoder.decode(&mut bytes).unwrap().unwrap();
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(size, PayloadSize::Length(2));
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn interim_responses_keep_the_request_pending() {
        let mut decoder = decoder(&[Method::POST]);
        let mut bytes = BytesMut::from("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n");

        let (head, size) = decoder.decode(&mut bytes).unwrap().unwrap();
        assert_eq!(head.status(), StatusCode::CONTINUE);
        assert_eq!(size, PayloadSize::Empty);
        assert_eq!(decoder.pending(), 1);

        let (head, size) = decoder.decode(&mut bytes).unwrap().unwrap();
        assert_eq!(head.status(), StatusCode::NO_CONTENT);
        assert_eq!(size, PayloadSize::Empty);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn unframed_response_reads_until_close() {
        let mut decoder = decoder(&[Method::GET]);
        let mut bytes = BytesMut::from("HTTP/1.0 200 OK\r\n\r\nbody");
        let (_, size) = decoder.decode(&mut bytes).unwrap().unwrap();
        assert_eq!(size, PayloadSize::UntilClose);
    }

    #[test]
    fn unsolicited_response_is_an_error() {
        let mut bytes = BytesMut::from("HTTP/1.1 200 OK\r\n\r\n");
        assert!(matches!(decoder(&[]).decode(&mut bytes), Err(ParseError::UnexpectedMessage { .. })));
    }
}
