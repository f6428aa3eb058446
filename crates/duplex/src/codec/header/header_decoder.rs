//! Request head decoding.
//!
//! Heads are parsed with `httparse`, which borrows from the read buffer. The decoder records the
//! byte range of every header name and value, splits the head off the buffer, and builds the
//! `http` header map from slices of the frozen head, so header values share the read buffer
//! instead of being copied.

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, Version};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::config::ConnectionConfig;
use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Decodes a request head and the framing of the body that follows it.
///
/// Framing is taken from `Transfer-Encoding` and `Content-Length` whatever the method is
/// (RFC 9112, section 6.3). A request carrying both is rejected, as is a transfer coding list
/// that does not end with `chunked`.
#[derive(Debug, Clone)]
pub struct HeaderDecoder {
    max_headers: usize,
    max_header_bytes: usize,
}

impl HeaderDecoder {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self { max_headers: config.max_headers, max_header_bytes: config.max_header_bytes }
    }
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self::new(&ConnectionConfig::default())
    }
}

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut headers = vec![httparse::EMPTY_HEADER; self.max_headers];
        let mut req = httparse::Request::new(&mut headers);

        let status = req.parse(src).map_err(|e| match e {
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

        trace!(head_size, "parsed request head");
        ensure!(head_size <= self.max_header_bytes, ParseError::too_large_header(head_size, self.max_header_bytes));

        let version = parse_version(req.version)?;
        let method = req.method.ok_or(ParseError::InvalidMethod)?;
        let method = Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::InvalidMethod)?;
        let uri = req.path.ok_or(ParseError::InvalidUri)?.parse::<Uri>().map_err(|_| ParseError::InvalidUri)?;
        let indices = HeaderIndex::record(src, req.headers);

        let head_bytes = src.split_to(head_size).freeze();

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = version;
        fill_headers(&head_bytes, &indices, request.headers_mut())?;

        let payload_size = request_payload_size(request.headers())?;
        Ok(Some((RequestHeader::from(request), payload_size)))
    }
}

pub(super) fn parse_version(version: Option<u8>) -> Result<Version, ParseError> {
    match version {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        v => Err(ParseError::InvalidVersion(v)),
    }
}

/// Byte ranges of a header's name and value within the parsed buffer.
#[derive(Debug, Clone, Copy)]
pub(super) struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderIndex {
    pub(super) fn record(bytes: &[u8], headers: &[httparse::Header<'_>]) -> Vec<HeaderIndex> {
        let base = bytes.as_ptr() as usize;
        headers
            .iter()
            .map(|header| {
                let name_start = header.name.as_ptr() as usize - base;
                let value_start = header.value.as_ptr() as usize - base;
                HeaderIndex {
                    name: (name_start, name_start + header.name.len()),
                    value: (value_start, value_start + header.value.len()),
                }
            })
            .collect()
    }
}

pub(super) fn fill_headers(head_bytes: &Bytes, indices: &[HeaderIndex], headers: &mut HeaderMap) -> Result<(), ParseError> {
    headers.reserve(indices.len());
    for index in indices {
        let name = HeaderName::from_bytes(&head_bytes[index.name.0..index.name.1]).map_err(ParseError::invalid_header)?;
        let value = HeaderValue::from_maybe_shared(head_bytes.slice(index.value.0..index.value.1)).map_err(ParseError::invalid_header)?;
        headers.append(name, value);
    }
    Ok(())
}

/// `None` without `Transfer-Encoding`, otherwise whether the final coding is `chunked`.
pub(super) fn transfer_encoding_chunked(headers: &HeaderMap) -> Option<bool> {
    if !headers.contains_key(TRANSFER_ENCODING) {
        return None;
    }

    let last = headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|coding| !coding.is_empty())
        .last();

    Some(last.is_some_and(|coding| coding.eq_ignore_ascii_case("chunked")))
}

/// The announced `Content-Length`. Repeated values must agree.
pub(super) fn content_length(headers: &HeaderMap) -> Result<Option<u64>, ParseError> {
    let mut length = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let text = value.to_str().map_err(|_| ParseError::invalid_content_length("value is not visible ascii"))?;
        for item in text.split(',').map(str::trim) {
            ensure!(
                !item.is_empty() && item.bytes().all(|b| b.is_ascii_digit()),
                ParseError::invalid_content_length(format!("value {item} is not a number"))
            );
            let parsed = item.parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {item} is not u64")))?;
            ensure!(length.is_none_or(|length| length == parsed), ParseError::invalid_content_length("conflicting values"));
            length = Some(parsed);
        }
    }
    Ok(length)
}

fn request_payload_size(headers: &HeaderMap) -> Result<PayloadSize, ParseError> {
    // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length
    match (transfer_encoding_chunked(headers), content_length(headers)?) {
        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer-encoding and content-length both present")),
        (Some(true), None) => Ok(PayloadSize::new_chunked()),
        (Some(false), None) => Err(ParseError::invalid_header("transfer-encoding does not end with chunked")),
        (None, Some(length)) => Ok(PayloadSize::new_length(length)),
        (None, None) => Ok(PayloadSize::new_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn decode(text: &str) -> Result<Option<(RequestHeader, PayloadSize)>, ParseError> {
        let mut bytes = BytesMut::from(text.replace('\n', "\r\n").as_str());
        HeaderDecoder::default().decode(&mut bytes)
    }

    #[test]
    fn decodes_head_and_leaves_body() {
        let str = indoc! {r#"
        POST /upload?kind=avatar HTTP/1.1
        Host: 127.0.0.1:8080
        Content-Length: 5
        X-Trace: a
        X-Trace: b

        hello"#};

        let mut bytes = BytesMut::from(str.replace('\n', "\r\n").as_str());
        let (header, payload_size) = HeaderDecoder::default().decode(&mut bytes).unwrap().unwrap();

        assert_eq!(header.method(), Method::POST);
        assert_eq!(header.uri().query(), Some("kind=avatar"));
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.headers().get_all("x-trace").iter().count(), 2);
        assert_eq!(payload_size, PayloadSize::Length(5));
        assert_eq!(&bytes[..], b"hello");
    }

    #[test]
    fn partial_head_waits_for_more() {
        assert!(decode("GET /index.html HTTP/1.1\nHost: loc").unwrap().is_none());
    }

    #[test]
    fn framing_from_headers() {
        let (_, size) = decode("GET / HTTP/1.1\nTransfer-Encoding: gzip, chunked\n\n").unwrap().unwrap();
        assert_eq!(size, PayloadSize::Chunked);

        let (_, size) = decode("DELETE / HTTP/1.1\n\n").unwrap().unwrap();
        assert_eq!(size, PayloadSize::Empty);

        let (_, size) = decode("PUT / HTTP/1.1\nContent-Length: 3, 3\n\n").unwrap().unwrap();
        assert_eq!(size, PayloadSize::Length(3));
    }

    #[test]
    fn rejects_ambiguous_framing() {
        assert!(decode("POST / HTTP/1.1\nTransfer-Encoding: chunked\nContent-Length: 3\n\n").is_err());
        assert!(decode("POST / HTTP/1.1\nTransfer-Encoding: gzip\n\n").is_err());
        assert!(decode("POST / HTTP/1.1\nContent-Length: 3\nContent-Length: 4\n\n").is_err());
        assert!(decode("POST / HTTP/1.1\nContent-Length: -1\n\n").is_err());
    }

    #[test]
    fn enforces_limits() {
        let config = ConnectionConfig::builder().max_headers(2).max_header_bytes(64).build();

        let mut bytes = BytesMut::from("GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n");
        let result = HeaderDecoder::new(&config).decode(&mut bytes);
        assert!(matches!(result, Err(ParseError::TooManyHeaders { .. })));

        let mut bytes = BytesMut::from(format!("GET /{} HTTP/1.1\r\n", "a".repeat(80)).as_str());
        let result = HeaderDecoder::new(&config).decode(&mut bytes);
        assert!(matches!(result, Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn rejects_unknown_version() {
        assert!(decode("GET / HTTP/2.0\n\n").is_err());
    }
}
