use bytes::{Buf, Bytes};
use http::HeaderMap;
use http_body::SizeHint;

/// Represents a HTTP message that can either be a header or payload.
///
/// The same type flows in both directions: the decoders produce `Message<(Head, PayloadSize)>`
/// for inbound traffic and the encoders consume it for outbound traffic. `T` is the head type,
/// `Data` the payload chunk type (defaults to `Bytes`).
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// Contains the header information of type `T`
    Header(T),
    /// Contains a chunk of payload data or a terminal marker
    Payload(PayloadItem<Data>),
}

/// Represents an item in the HTTP message payload stream.
///
/// Every payload ends with exactly one terminal item: [`PayloadItem::Eof`], or
/// [`PayloadItem::Trailers`] when the terminal chunk carries trailing fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Terminal chunk carrying trailer fields
    Trailers(HeaderMap),
    /// Marks the end of the payload stream
    Eof,
}

/// Represents the framing of an HTTP payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Payload delimited by the connection close
    UntilClose,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn new_length(length: u64) -> Self {
        PayloadSize::Length(length)
    }

    #[inline]
    pub fn new_chunked() -> Self {
        PayloadSize::Chunked
    }

    #[inline]
    pub fn new_empty() -> Self {
        PayloadSize::Empty
    }

    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty | PayloadSize::Length(0))
    }

    /// Returns true if the end of the payload is only signalled by closing the connection
    #[inline]
    pub fn is_until_close(&self) -> bool {
        matches!(self, PayloadSize::UntilClose)
    }

    /// The exact payload length, when known up front.
    #[inline]
    pub fn exact_length(&self) -> Option<u64> {
        match self {
            PayloadSize::Length(length) => Some(*length),
            PayloadSize::Empty => Some(0),
            PayloadSize::Chunked | PayloadSize::UntilClose => None,
        }
    }
}

impl From<SizeHint> for PayloadSize {
    fn from(size_hint: SizeHint) -> Self {
        match size_hint.exact() {
            Some(0) => PayloadSize::new_empty(),
            Some(length) => PayloadSize::new_length(length),
            None => PayloadSize::new_chunked(),
        }
    }
}

impl From<PayloadSize> for SizeHint {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(length) => SizeHint::with_exact(length),
            PayloadSize::Chunked | PayloadSize::UntilClose => SizeHint::new(),
            PayloadSize::Empty => SizeHint::with_exact(0),
        }
    }
}

impl<T> Message<T> {
    /// Returns true if this message contains payload data
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    /// Returns true if this message contains header information
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Converts the message into a PayloadItem if it contains payload data
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item represents the plain end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if nothing follows this item in the payload
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayloadItem::Eof | PayloadItem::Trailers(_))
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Trailers(_) | PayloadItem::Eof => None,
        }
    }

    /// Consumes the PayloadItem and returns the contained bytes if this is a Chunk
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Trailers(_) | PayloadItem::Eof => None,
        }
    }
}
