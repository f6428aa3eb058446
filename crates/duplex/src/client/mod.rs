//! Client side of an HTTP/1.1 connection.
//!
//! [`ClientConnection::handshake`] splits a transport into a [`SendRequest`] handle and the
//! connection itself, which must be driven with [`ClientConnection::run`]. Requests are written
//! in the order they are sent and responses are matched to them in the same order, so several
//! requests may be in flight at once.
//!
//! A request announcing `Expect: 100-continue` holds its body back until the server answers
//! `100 Continue`. When the server answers with a final response instead, the body is dropped:
//! a chunked request is ended with an empty terminal chunk, a length-framed one can't be ended
//! early and the connection closes after the response.

mod connection;

pub use connection::{ClientConnection, ResponseFuture, SendRequest};
