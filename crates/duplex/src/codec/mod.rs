//! HTTP/1.x wire codec for both directions.
//!
//! # Architecture
//!
//! - Inbound:
//!   - [`RequestDecoder`]: request heads and bodies, server side
//!   - [`ResponseDecoder`]: response heads and bodies, client side, including close-delimited
//!     bodies that end with the connection
//! - Outbound:
//!   - [`ResponseEncoder`] / [`RequestEncoder`]: one [`MessageEncoder`] over the head type
//! - Heads are handled by the [`header`] coders, payloads by the `body` coders
//!
//! Decoders yield [`Message`](crate::protocol::Message) items: one head, then payload items up to
//! exactly one terminal item, also for messages without a body.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_duplex::codec::RequestDecoder;
//! use micro_duplex::protocol::Message;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = RequestDecoder::default();
//! let mut buffer = BytesMut::from("GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
//! let message = decoder.decode(&mut buffer).unwrap();
//! assert!(matches!(message, Some(Message::Header(_))));
//! ```

mod body;
pub mod header;
mod message_encoder;
mod request_decoder;
mod response_decoder;

pub(crate) use header::FastWrite;
pub use message_encoder::{MessageEncoder, RequestEncoder, ResponseEncoder};
pub use request_decoder::RequestDecoder;
pub use response_decoder::ResponseDecoder;
