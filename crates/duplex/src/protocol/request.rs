//! HTTP request header handling.
//!
//! [`RequestHeader`] wraps `http::Request<()>` and answers the protocol questions the connection
//! asks about a request head: persistence, `Expect: 100-continue`, and upgrade handshakes.

use http::header::{CONNECTION, CONTENT_TYPE, EXPECT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE};
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

/// Head of an outgoing request, as written by the client.
pub type RequestHead = Request<()>;

/// Represents an HTTP request header.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body, converting the header into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Whether the client waits for `100 Continue` before sending the body.
    pub fn expects_continue(&self) -> bool {
        self.version() != Version::HTTP_10
            && self.headers().get(EXPECT).is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
    }

    /// Whether the connection may serve another request after this one.
    ///
    /// HTTP/1.1 is persistent unless `Connection: close`; HTTP/1.0 only with `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        is_keep_alive(self.version(), self.headers())
    }

    /// A well formed websocket opening handshake.
    pub fn is_websocket_upgrade(&self) -> bool {
        let headers = self.headers();
        self.method() == Method::GET
            && has_token(headers, CONNECTION, "upgrade")
            && has_token(headers, UPGRADE, "websocket")
            && headers.get(SEC_WEBSOCKET_VERSION).is_some_and(|v| v.as_bytes() == b"13")
            && headers.contains_key(SEC_WEBSOCKET_KEY)
    }

    pub fn content_type(&self) -> Option<mime::Mime> {
        content_type(self.headers())
    }

    /// Any `Upgrade` request, handshake valid or not.
    pub fn wants_upgrade(&self) -> bool {
        self.headers().contains_key(UPGRADE)
    }
}

/// Parsed `Content-Type` of a message.
pub fn content_type(headers: &HeaderMap) -> Option<mime::Mime> {
    headers.get(CONTENT_TYPE)?.to_str().ok()?.parse().ok()
}

/// Whether the message carries an `application/x-www-form-urlencoded` body.
pub fn is_form_urlencoded(headers: &HeaderMap) -> bool {
    content_type(headers).is_some_and(|m| m.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str())
}

/// Persistence of a message with the given version and headers.
pub(crate) fn is_keep_alive(version: Version, headers: &HeaderMap) -> bool {
    match version {
        Version::HTTP_10 => has_token(headers, CONNECTION, "keep-alive"),
        _ => !has_token(headers, CONNECTION, "close"),
    }
}

/// Whether the comma separated header `name` lists `token`, case-insensitively.
pub(crate) fn has_token(headers: &HeaderMap, name: http::header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
