//! Head encoding for both directions.
//!
//! The encoder writes the start line, then rewrites the framing headers so that they agree with
//! the [`PayloadSize`] the body will be written with:
//!
//! | payload       | `Content-Length`        | `Transfer-Encoding` |
//! |---------------|-------------------------|---------------------|
//! | `Length(n)`   | `n`                     | removed             |
//! | `Chunked`     | removed                 | `chunked`           |
//! | `UntilClose`  | removed                 | removed             |
//! | `Empty`       | `0` on responses if unset | removed           |
//!
//! 1xx, 204 and 304 responses never carry either header.

use crate::protocol::{PayloadSize, RequestHead, ResponseHead, SendError, status_forbids_body};

use bytes::{BufMut, BytesMut};

use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Version};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

const INIT_HEADER_SIZE: usize = 4 * 1024;

/// A message head that can be written on the wire.
pub trait Head {
    fn write_start_line(&self, dst: &mut BytesMut) -> Result<(), SendError>;

    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Fills headers derived from the start line.
    fn complete_headers(&mut self) -> Result<(), SendError> {
        Ok(())
    }

    /// The message may not carry framing headers at all.
    fn forbids_framing(&self) -> bool {
        false
    }

    /// Whether an empty body is announced with `Content-Length: 0`.
    fn announces_empty_body(&self) -> bool;
}

fn version_str(version: Version) -> Result<&'static str, SendError> {
    match version {
        Version::HTTP_11 => Ok("HTTP/1.1"),
        Version::HTTP_10 => Ok("HTTP/1.0"),
        v => {
            error!(http_version = ?v, "unsupported http version");
            Err(io::Error::from(ErrorKind::Unsupported).into())
        }
    }
}

impl Head for ResponseHead {
    fn write_start_line(&self, dst: &mut BytesMut) -> Result<(), SendError> {
        let status = self.status();
        write!(FastWrite(dst), "{} {} {}\r\n", version_str(self.version())?, status.as_str(), status.canonical_reason().unwrap_or(""))?;
        Ok(())
    }

    fn headers(&self) -> &HeaderMap {
        self.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.headers_mut()
    }

    fn forbids_framing(&self) -> bool {
        status_forbids_body(self.status())
    }

    fn announces_empty_body(&self) -> bool {
        true
    }
}

impl Head for RequestHead {
    fn write_start_line(&self, dst: &mut BytesMut) -> Result<(), SendError> {
        let target = self.uri().path_and_query().map_or("/", |path| path.as_str());
        write!(FastWrite(dst), "{} {} {}\r\n", self.method(), target, version_str(self.version())?)?;
        Ok(())
    }

    fn headers(&self) -> &HeaderMap {
        self.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.headers_mut()
    }

    fn complete_headers(&mut self) -> Result<(), SendError> {
        if self.headers().contains_key(HOST) {
            return Ok(());
        }
        if let Some(authority) = self.uri().authority() {
            let host = HeaderValue::from_str(authority.as_str()).map_err(|e| SendError::io(io::Error::new(ErrorKind::InvalidInput, e)))?;
            self.headers_mut().insert(HOST, host);
        }
        Ok(())
    }

    fn announces_empty_body(&self) -> bool {
        false
    }
}

/// Encoder for message heads implementing the [`Encoder`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl<H: Head> Encoder<(H, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (H, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        head.write_start_line(dst)?;
        head.complete_headers()?;

        let forbids_framing = head.forbids_framing();
        let announces_empty_body = head.announces_empty_body();
        let headers = head.headers_mut();
        match payload_size {
            _ if forbids_framing => {
                headers.remove(CONTENT_LENGTH);
                headers.remove(TRANSFER_ENCODING);
            }
            PayloadSize::Length(n) => {
                headers.insert(CONTENT_LENGTH, n.into());
                headers.remove(TRANSFER_ENCODING);
            }
            PayloadSize::Chunked => {
                headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
                headers.remove(CONTENT_LENGTH);
            }
            PayloadSize::UntilClose => {
                headers.remove(CONTENT_LENGTH);
                headers.remove(TRANSFER_ENCODING);
            }
            PayloadSize::Empty => {
                headers.remove(TRANSFER_ENCODING);
                if announces_empty_body {
                    headers.entry(CONTENT_LENGTH).or_insert(HeaderValue::from_static("0"));
                } else {
                    headers.remove(CONTENT_LENGTH);
                }
            }
        }

        for (header_name, header_value) in head.headers().iter() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// `io::Write` over a `BytesMut`, for `write!` into the output buffer.
pub(crate) struct FastWrite<'a>(pub(crate) &'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
