//! HTTP response header handling.
//!
//! Response heads use the standard `http::Response` type with an empty body placeholder. The body
//! is framed separately, see [`PayloadSize`](super::PayloadSize).

use http::{Method, Response, StatusCode};

/// Type alias for HTTP response headers.
pub type ResponseHead = Response<()>;

/// 1xx, 204 and 304 responses never carry a body, nor body framing headers.
pub(crate) fn status_forbids_body(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}

/// Whether a response with `status` to a `method` request has a body on the wire.
pub(crate) fn response_has_body(method: &Method, status: StatusCode) -> bool {
    method != Method::HEAD && !status_forbids_body(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodiless_responses() {
        assert!(!response_has_body(&Method::GET, StatusCode::CONTINUE));
        assert!(!response_has_body(&Method::GET, StatusCode::SWITCHING_PROTOCOLS));
        assert!(!response_has_body(&Method::GET, StatusCode::NO_CONTENT));
        assert!(!response_has_body(&Method::GET, StatusCode::NOT_MODIFIED));
        assert!(!response_has_body(&Method::HEAD, StatusCode::OK));
        assert!(response_has_body(&Method::POST, StatusCode::OK));
    }
}
