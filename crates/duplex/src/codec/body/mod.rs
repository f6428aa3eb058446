//! Payload coders for the three HTTP/1.x body framings.
//!
//! - `Content-Length` delimited bodies
//! - `Transfer-Encoding: chunked`, trailers included
//! - close-delimited bodies, which end with the connection
//!
//! [`PayloadDecoder`] and [`PayloadEncoder`] select the framing from a [`PayloadSize`](crate::protocol::PayloadSize).

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;
mod until_close_decoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
