//! Message bodies with exactly-once consumption and demand-driven delivery.
//!
//! Every received body is a [`ByteBody`]: either [`Immediate`](ByteBody::Immediate), fully in
//! memory, or [`Streaming`](ByteBody::Streaming), still arriving from the connection. A body has
//! exactly one consumer. Any attempt to consume it a second time fails with
//! [`BodyError::AlreadyClaimed`], and a body nobody consumed is released when it is dropped.
//!
//! # Architecture
//!
//! Two contracts connect a body to whatever produces it:
//!
//! - [`BufferConsumer`]: data flowing downstream, `add` / `complete` / `error`
//! - [`Upstream`]: demand flowing upstream, `start` / `on_bytes_consumed` / `discard`
//!
//! A producer never sends more than the demand it was granted. Consumers report what they
//! consumed, possibly from another thread, and the producer (the connection) resumes reading.
//!
//! A streaming body can be [`split`](ByteBody::split) into two bodies that both observe the full
//! content. The [`UpstreamBalancer`] merges the demand of the two branches into one signal,
//! following the branch selected by [`SplitMode`].
//!
//! # Consumers
//!
//! - [`BufferFuture`]: collects the whole body into an [`ImmediateBody`]
//! - [`BodyStream`]: asynchronous chunks, implements `http_body::Body` and `futures::Stream`
//! - [`BlockingReader`]: `std::io::Read` for code running on a blocking thread
//! - [`MultiObjectBody`]: the body as data parts or decoded form fields
//!
//! Outgoing messages use [`OutgoingBody`] instead, which accepts bytes, strings, received bodies
//! and any `http_body::Body`.

mod balancer;
mod buffer;
mod immediate;
mod multi;
mod outgoing;
mod reader;
mod source;
mod stream;
mod streaming;
mod upstream;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::claim::Release;
use crate::protocol::BodyError;

pub use balancer::{SplitMode, UpstreamBalancer};
pub use buffer::BufferFuture;
pub use immediate::ImmediateBody;
pub use multi::{BodyPart, FormData, MultiObjectBody, SingleValue};
pub use outgoing::{BoxError, OutgoingBody};
pub use reader::BlockingReader;
pub use source::BodySender;
pub use stream::BodyStream;
pub use streaming::{StreamingBody, channel};
pub use upstream::{BufferConsumer, NoopUpstream, SharedUpstream, Upstream, Weighted};

/// A received message body.
#[derive(Debug)]
pub enum ByteBody {
    Immediate(ImmediateBody),
    Streaming(StreamingBody),
}

impl ByteBody {
    pub fn empty() -> Self {
        ByteBody::Immediate(ImmediateBody::empty())
    }

    pub fn from_bytes<B: Into<Bytes>>(bytes: B) -> Self {
        ByteBody::Immediate(ImmediateBody::new(bytes.into()))
    }

    /// Exact length, when the sender announced one.
    pub fn expected_length(&self) -> Option<u64> {
        match self {
            ByteBody::Immediate(body) => Some(body.length()),
            ByteBody::Streaming(body) => body.expected_length(),
        }
    }

    /// A second body with the same content.
    ///
    /// An immediate body shares its buffer. A streaming body feeds both branches, with demand
    /// merged according to `mode`. Fails once this body has a consumer.
    pub fn split(&mut self, mode: SplitMode) -> Result<ByteBody, BodyError> {
        match self {
            ByteBody::Immediate(body) => body.split().map(ByteBody::Immediate),
            ByteBody::Streaming(body) => body.split(mode).map(ByteBody::Streaming),
        }
    }

    pub fn buffer(&mut self) -> BufferFuture {
        match self {
            ByteBody::Immediate(body) => body.buffer(),
            ByteBody::Streaming(body) => body.buffer(),
        }
    }

    /// Must not be read from an async task.
    pub fn into_reader(self) -> Result<BlockingReader, BodyError> {
        match self {
            ByteBody::Immediate(body) => body.into_reader(),
            ByteBody::Streaming(body) => body.into_reader(),
        }
    }

    pub fn into_stream(self) -> Result<BodyStream, BodyError> {
        match self {
            ByteBody::Immediate(body) => body.into_stream(),
            ByteBody::Streaming(body) => body.into_stream(),
        }
    }

    pub fn to_multi_object(&mut self) -> Result<MultiObjectBody<BodyPart>, BodyError> {
        match self {
            ByteBody::Immediate(body) => body.to_multi_object(),
            ByteBody::Streaming(body) => body.to_multi_object(),
        }
    }

    pub fn to_form_fields(&mut self) -> Result<MultiObjectBody<BodyPart>, BodyError> {
        match self {
            ByteBody::Immediate(body) => body.to_form_fields(),
            ByteBody::Streaming(body) => body.to_form_fields(),
        }
    }

    /// Decodes an `application/x-www-form-urlencoded` body into `T`.
    pub async fn decode_form<T: DeserializeOwned>(self) -> Result<T, BodyError> {
        match self {
            ByteBody::Immediate(body) => body.decode_form(),
            ByteBody::Streaming(mut body) => body.buffer().await?.decode_form(),
        }
    }

    pub fn is_claimed(&self) -> bool {
        match self {
            ByteBody::Immediate(body) => body.is_claimed(),
            ByteBody::Streaming(body) => body.is_claimed(),
        }
    }
}

impl Release for ByteBody {
    fn release(&mut self) {
        match self {
            ByteBody::Immediate(body) => body.release(),
            ByteBody::Streaming(body) => body.release(),
        }
    }
}

impl Default for ByteBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for ByteBody {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<ImmediateBody> for ByteBody {
    fn from(body: ImmediateBody) -> Self {
        ByteBody::Immediate(body)
    }
}

impl From<StreamingBody> for ByteBody {
    fn from(body: StreamingBody) -> Self {
        ByteBody::Streaming(body)
    }
}
