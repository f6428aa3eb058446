use std::error::Error;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};

use crate::protocol::body::ByteBody;
use crate::protocol::{BodyError, PayloadItem, PayloadSize, SendError};

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Body of a message this side sends: a response on the server, a request on the client.
pub struct OutgoingBody {
    kind: Kind,
    /// Produced by [`poll_peek`](Self::poll_peek), handed out by the next [`poll_item`](Self::poll_item).
    peeked: Option<Option<Result<PayloadItem, SendError>>>,
}

enum Kind {
    Empty,
    Full(Bytes),
    Stream(UnsyncBoxBody<Bytes, BoxError>),
}

impl OutgoingBody {
    pub fn empty() -> Self {
        Self::from_kind(Kind::Empty)
    }

    fn from_kind(kind: Kind) -> Self {
        Self { kind, peeked: None }
    }

    pub fn full<B: Into<Bytes>>(bytes: B) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() { Self::empty() } else { Self::from_kind(Kind::Full(bytes)) }
    }

    /// Wraps any body producing [`Bytes`].
    pub fn from_body<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self::from_kind(Kind::Stream(body.map_err(Into::into).boxed_unsync()))
    }

    /// Framing this body needs on the wire.
    pub fn payload_size(&self) -> PayloadSize {
        match &self.kind {
            Kind::Empty => PayloadSize::Empty,
            Kind::Full(bytes) => PayloadSize::Length(bytes.len() as u64),
            Kind::Stream(body) => body.size_hint().into(),
        }
    }

    /// Whether the whole body is already in memory and can be written in one shot.
    pub fn is_full(&self) -> bool {
        self.peeked.is_none() && !matches!(self.kind, Kind::Stream(_))
    }

    /// Takes the in-memory content, leaving the body empty.
    pub(crate) fn take_full(&mut self) -> Option<Bytes> {
        match std::mem::replace(&mut self.kind, Kind::Empty) {
            Kind::Full(bytes) => Some(bytes),
            Kind::Empty => None,
            stream @ Kind::Stream(_) => {
                self.kind = stream;
                None
            }
        }
    }

    /// Next payload item; `None` once the body ended without trailers.
    pub(crate) fn poll_item(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<PayloadItem, SendError>>> {
        if let Some(item) = self.peeked.take() {
            return Poll::Ready(item);
        }

        match &mut self.kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Full(_) => Poll::Ready(self.take_full().map(|bytes| Ok(PayloadItem::Chunk(bytes)))),
            Kind::Stream(body) => {
                let frame = match Pin::new(body).poll_frame(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(None) => {
                        self.kind = Kind::Empty;
                        return Poll::Ready(None);
                    }
                    Poll::Ready(Some(Err(e))) => {
                        self.kind = Kind::Empty;
                        return Poll::Ready(Some(Err(SendError::invalid_body(format!("resolve body error: {e}")))));
                    }
                    Poll::Ready(Some(Ok(frame))) => frame,
                };

                let item = match frame.into_data() {
                    Ok(bytes) => PayloadItem::Chunk(bytes),
                    Err(frame) => match frame.into_trailers() {
                        Ok(trailers) => {
                            self.kind = Kind::Empty;
                            PayloadItem::Trailers(trailers)
                        }
                        Err(_unknown) => return self.poll_item(cx),
                    },
                };
                Poll::Ready(Some(Ok(item)))
            }
        }
    }

    /// Polls a streamed body once ahead of writing it. Whatever it produced is kept for the next
    /// [`poll_item`](Self::poll_item); a pending body keeps the waker of `cx`.
    pub(crate) fn poll_peek(&mut self, cx: &mut Context<'_>) {
        if self.peeked.is_none()
            && matches!(self.kind, Kind::Stream(_))
            && let Poll::Ready(item) = self.poll_item(cx)
        {
            self.peeked = Some(item);
        }
    }

    #[cfg(test)]
    pub(crate) async fn next_item(&mut self) -> Option<Result<PayloadItem, SendError>> {
        futures::future::poll_fn(|cx| self.poll_item(cx)).await
    }
}

impl Default for OutgoingBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for OutgoingBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("OutgoingBody::Empty"),
            Kind::Full(bytes) => f.debug_tuple("OutgoingBody::Full").field(&bytes.len()).finish(),
            Kind::Stream(_) => f.write_str("OutgoingBody::Stream"),
        }
    }
}

impl From<()> for OutgoingBody {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl From<Bytes> for OutgoingBody {
    fn from(bytes: Bytes) -> Self {
        Self::full(bytes)
    }
}

impl From<String> for OutgoingBody {
    fn from(value: String) -> Self {
        Self::full(value)
    }
}

impl From<&'static str> for OutgoingBody {
    fn from(value: &'static str) -> Self {
        Self::full(Bytes::from_static(value.as_bytes()))
    }
}

impl From<Vec<u8>> for OutgoingBody {
    fn from(value: Vec<u8>) -> Self {
        Self::full(value)
    }
}

impl From<Empty<Bytes>> for OutgoingBody {
    fn from(_: Empty<Bytes>) -> Self {
        Self::empty()
    }
}

impl From<Full<Bytes>> for OutgoingBody {
    fn from(body: Full<Bytes>) -> Self {
        Self::from_body(body)
    }
}

impl From<UnsyncBoxBody<Bytes, BoxError>> for OutgoingBody {
    fn from(body: UnsyncBoxBody<Bytes, BoxError>) -> Self {
        Self::from_kind(Kind::Stream(body))
    }
}

/// Forwards a received body, e.g. a proxied request body or an echo.
impl From<ByteBody> for OutgoingBody {
    fn from(body: ByteBody) -> Self {
        match body {
            ByteBody::Immediate(immediate) => match immediate.into_bytes() {
                Ok(bytes) => Self::full(bytes),
                Err(e) => failed(e),
            },
            ByteBody::Streaming(streaming) => match streaming.into_stream() {
                Ok(stream) => Self::from_body(stream),
                Err(e) => failed(e),
            },
        }
    }
}

fn failed(e: BodyError) -> OutgoingBody {
    let stream = futures::stream::once(futures::future::ready(Err::<Frame<Bytes>, BodyError>(e)));
    OutgoingBody::from_body(StreamBody::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;

    #[tokio::test]
    async fn full_body_is_one_chunk() {
        let mut body = OutgoingBody::from("hello");
        assert_eq!(body.payload_size(), PayloadSize::Length(5));
        assert!(body.is_full());
        assert_eq!(body.next_item().await.unwrap().unwrap(), PayloadItem::Chunk(Bytes::from_static(b"hello")));
        assert!(body.next_item().await.is_none());
    }

    #[test]
    fn empty_conversions() {
        assert_eq!(OutgoingBody::from(()).payload_size(), PayloadSize::Empty);
        assert_eq!(OutgoingBody::from(String::new()).payload_size(), PayloadSize::Empty);
    }

    #[tokio::test]
    async fn stream_with_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc".parse().unwrap());
        let frames = vec![Ok::<_, BoxError>(Frame::data(Bytes::from_static(b"a"))), Ok(Frame::trailers(trailers.clone()))];
        let mut body = OutgoingBody::from_body(StreamBody::new(futures::stream::iter(frames)));

        assert_eq!(body.payload_size(), PayloadSize::Chunked);
        assert!(!body.is_full());
        assert_eq!(body.next_item().await.unwrap().unwrap(), PayloadItem::Chunk(Bytes::from_static(b"a")));
        assert_eq!(body.next_item().await.unwrap().unwrap(), PayloadItem::Trailers(trailers));
        assert!(body.next_item().await.is_none());
    }

    #[tokio::test]
    async fn peeked_item_is_written_first() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc".parse().unwrap());
        let frames = vec![Ok::<_, BoxError>(Frame::trailers(trailers.clone()))];
        let mut body = OutgoingBody::from_body(StreamBody::new(futures::stream::iter(frames)));

        futures::future::poll_fn(|cx| {
            body.poll_peek(cx);
            Poll::Ready(())
        })
        .await;
        // the peeked trailers must not be mistaken for an in-memory body
        assert!(!body.is_full());
        assert_eq!(body.next_item().await.unwrap().unwrap(), PayloadItem::Trailers(trailers));
        assert!(body.next_item().await.is_none());
    }

    #[tokio::test]
    async fn claimed_body_fails_when_sent() {
        let mut received = ByteBody::from_bytes(Bytes::from_static(b"x"));
        let _ = received.buffer().await.unwrap();

        let mut body = OutgoingBody::from(received);
        assert!(body.next_item().await.unwrap().is_err());
    }
}
