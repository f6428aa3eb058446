//! Message head coding.
//!
//! - [`HeaderDecoder`] parses request heads and derives the request body framing
//! - [`ResponseHeaderDecoder`] parses response heads, using the pending request methods to decide
//!   whether a body follows
//! - [`HeaderEncoder`] writes any [`Head`] and aligns its framing headers with the body

mod header_decoder;
mod header_encoder;
mod response_header_decoder;

pub use header_decoder::HeaderDecoder;
pub(crate) use header_encoder::FastWrite;
pub use header_encoder::{Head, HeaderEncoder};
pub use response_header_decoder::ResponseHeaderDecoder;
