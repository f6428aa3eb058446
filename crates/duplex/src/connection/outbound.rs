//! Outbound half of the stream coordinator.
//!
//! Messages are written strictly in the order their slots were reserved. A message whose body is
//! already in memory goes out in one shot. A streamed body goes out head first, then chunk by
//! chunk as the body produces them, then a terminal item, synthesized when the body ends without
//! trailers. The next message starts only once the terminal write has been flushed.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::channel::oneshot;
use futures::{FutureExt, Sink};
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;
use tracing::{debug, trace};

use crate::codec::MessageEncoder;
use crate::codec::header::Head;
use crate::protocol::body::OutgoingBody;
use crate::protocol::{Message, PayloadItem, PayloadSize, SendError};

type Item<H> = Message<(H, PayloadSize)>;

pub(crate) type MessageSink<W, H> = FramedWrite<W, MessageEncoder<H>>;

/// A message ready to be written.
pub(crate) struct OutgoingMessage<H> {
    pub(crate) head: H,
    pub(crate) payload_size: PayloadSize,
    pub(crate) body: OutgoingBody,
    /// The connection closes once this message is written.
    pub(crate) close: bool,
    /// Holds the body back until the peer allows it: `true` releases it, `false` discards it.
    pub(crate) gate: Option<oneshot::Receiver<bool>>,
}

impl<H> OutgoingMessage<H> {
    pub(crate) fn new(head: H, body: OutgoingBody) -> Self {
        let payload_size = body.payload_size();
        Self { head, payload_size, body, close: false, gate: None }
    }
}

/// Outcome of a finished write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Written {
    pub(crate) message_id: u64,
    pub(crate) close: bool,
}

struct Slot<H> {
    message_id: u64,
    message: Option<OutgoingMessage<H>>,
}

enum Writing {
    Body { message_id: u64, body: OutgoingBody, close: bool, chunked: bool, gate: Option<oneshot::Receiver<bool>> },
    Flush(Written),
}

pub(crate) struct Outbound<H> {
    queue: VecDeque<Slot<H>>,
    writing: Option<Writing>,
}

impl<H: Head> Outbound<H> {
    pub(crate) fn new() -> Self {
        Self { queue: VecDeque::new(), writing: None }
    }

    /// Takes the next position in the write order.
    pub(crate) fn reserve(&mut self, message_id: u64) {
        self.queue.push_back(Slot { message_id, message: None });
    }

    /// Provides the message for a reserved position. Returns the message if nothing was reserved.
    pub(crate) fn fulfill(&mut self, message_id: u64, message: OutgoingMessage<H>) -> Result<(), OutgoingMessage<H>> {
        match self.queue.iter_mut().find(|slot| slot.message_id == message_id) {
            Some(slot) => {
                slot.message = Some(message);
                Ok(())
            }
            None => Err(message),
        }
    }

    /// Reserves and fulfills at once.
    pub(crate) fn push(&mut self, message_id: u64, message: OutgoingMessage<H>) {
        self.queue.push_back(Slot { message_id, message: Some(message) });
    }

    /// The message whose head is written next, when it is `message_id` and ready.
    pub(crate) fn next_message_mut(&mut self, message_id: u64) -> Option<&mut OutgoingMessage<H>> {
        if self.writing.is_some() {
            return None;
        }
        self.queue.front_mut().filter(|slot| slot.message_id == message_id).and_then(|slot| slot.message.as_mut())
    }

    /// Nothing reserved, nothing being written.
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.writing.is_none()
    }

    /// Drives the write of the head-of-line message.
    ///
    /// Resolves once per message, after its terminal item was flushed. Pending without a
    /// registered waker while the head-of-line slot is still unfulfilled: the owner polls again
    /// after fulfilling it.
    pub(crate) fn poll_write<W>(&mut self, cx: &mut Context<'_>, sink: &mut MessageSink<W, H>) -> Poll<Result<Written, SendError>>
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            match self.writing.as_mut() {
                None => {
                    let Some(slot) = self.queue.front_mut() else {
                        return Poll::Pending;
                    };
                    if slot.message.is_none() {
                        return Poll::Pending;
                    }

                    ready!(poll_ready(sink, cx))?;
                    let message_id = slot.message_id;
                    let Some(mut message) = self.queue.pop_front().and_then(|slot| slot.message) else {
                        continue;
                    };

                    trace!(message_id, payload_size = ?message.payload_size, "writing message");
                    let chunked = message.payload_size.is_chunked();
                    let full = (message.gate.is_none() && message.body.is_full()).then(|| message.body.take_full());
                    start_send(sink, Message::Header((message.head, message.payload_size)))?;

                    self.writing = Some(match full {
                        Some(bytes) => {
                            if let Some(bytes) = bytes {
                                start_send(sink, Message::Payload(PayloadItem::Chunk(bytes)))?;
                            }
                            start_send(sink, Message::Payload(PayloadItem::Eof))?;
                            Writing::Flush(Written { message_id, close: message.close })
                        }
                        None => Writing::Body { message_id, body: message.body, close: message.close, chunked, gate: message.gate },
                    });
                }

                Some(Writing::Body { message_id, body, close, chunked, gate }) => {
                    let message_id = *message_id;

                    if let Some(receiver) = gate {
                        // the head must reach the peer before it can answer
                        if let Poll::Ready(Err(e)) = poll_flush(sink, cx) {
                            return Poll::Ready(Err(e));
                        }
                        if ready!(receiver.poll_unpin(cx)).unwrap_or(false) {
                            trace!(message_id, "body released by the peer");
                            *gate = None;
                            continue;
                        }

                        debug!(message_id, "peer declined the body, discarding it");
                        *body = OutgoingBody::empty();
                        if *chunked {
                            ready!(poll_ready(sink, cx))?;
                            start_send(sink, Message::Payload(PayloadItem::Eof))?;
                            let written = Written { message_id, close: *close };
                            self.writing = Some(Writing::Flush(written));
                        } else {
                            // a length-framed body cannot end early
                            self.writing = None;
                            return Poll::Ready(Ok(Written { message_id, close: true }));
                        }
                        continue;
                    }

                    ready!(poll_ready(sink, cx))?;
                    match body.poll_item(cx) {
                        Poll::Pending => {
                            if let Poll::Ready(Err(e)) = poll_flush(sink, cx) {
                                return Poll::Ready(Err(e));
                            }
                            return Poll::Pending;
                        }
                        Poll::Ready(Some(Ok(item))) => {
                            let terminal = item.is_terminal();
                            start_send(sink, Message::Payload(item))?;
                            if terminal {
                                self.writing = Some(Writing::Flush(Written { message_id, close: *close }));
                            }
                        }
                        Poll::Ready(Some(Err(e))) => {
                            self.writing = None;
                            return Poll::Ready(Err(e));
                        }
                        Poll::Ready(None) => {
                            start_send(sink, Message::Payload(PayloadItem::Eof))?;
                            self.writing = Some(Writing::Flush(Written { message_id, close: *close }));
                        }
                    }
                }

                Some(Writing::Flush(written)) => {
                    let written = *written;
                    ready!(poll_flush(sink, cx))?;
                    trace!(message_id = written.message_id, "message written");
                    self.writing = None;
                    return Poll::Ready(Ok(written));
                }
            }
        }
    }
}

fn poll_ready<W: AsyncWrite + Unpin, H: Head>(sink: &mut MessageSink<W, H>, cx: &mut Context<'_>) -> Poll<Result<(), SendError>> {
    Sink::<Item<H>>::poll_ready(Pin::new(sink), cx)
}

fn poll_flush<W: AsyncWrite + Unpin, H: Head>(sink: &mut MessageSink<W, H>, cx: &mut Context<'_>) -> Poll<Result<(), SendError>> {
    Sink::<Item<H>>::poll_flush(Pin::new(sink), cx)
}

fn start_send<W: AsyncWrite + Unpin, H: Head>(sink: &mut MessageSink<W, H>, item: Item<H>) -> Result<(), SendError> {
    Sink::<Item<H>>::start_send(Pin::new(sink), item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::future::poll_fn;
    use http::Response;
    use http_body_util::StreamBody;
    use http_body::Frame;
    use crate::protocol::ResponseHead;
    use tokio::io::AsyncReadExt;

    type Sender = futures::channel::mpsc::UnboundedSender<Result<Frame<Bytes>, std::io::Error>>;

    fn streamed() -> (Sender, OutgoingBody) {
        let (sender, receiver) = futures::channel::mpsc::unbounded();
        (sender, OutgoingBody::from_body(StreamBody::new(receiver)))
    }

    async fn drain(reader: &mut tokio::io::DuplexStream) -> String {
        let mut buf = vec![0u8; 1024];
        let n = reader.read(&mut buf).await.unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn second_message_waits_for_first_terminal() {
        let (writer, mut reader) = tokio::io::duplex(4096);
        let mut sink = FramedWrite::new(writer, MessageEncoder::<ResponseHead>::new());
        let mut outbound = Outbound::new();

        let (sender, slow) = streamed();
        outbound.reserve(1);
        outbound.reserve(2);
        outbound.fulfill(2, OutgoingMessage::new(Response::new(()), OutgoingBody::full("second"))).ok().unwrap();
        outbound.fulfill(1, OutgoingMessage::new(Response::new(()), slow)).ok().unwrap();

        sender.unbounded_send(Ok(Frame::data(Bytes::from_static(b"first")))).unwrap();
        let pending = poll_fn(|cx| Poll::Ready(outbound.poll_write(cx, &mut sink))).await;
        assert!(pending.is_pending());
        assert_eq!(drain(&mut reader).await, "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n5\r\nfirst\r\n");

        drop(sender);
        let written = poll_fn(|cx| outbound.poll_write(cx, &mut sink)).await.unwrap();
        assert_eq!(written, Written { message_id: 1, close: false });
        assert_eq!(drain(&mut reader).await, "0\r\n\r\n");

        let written = poll_fn(|cx| outbound.poll_write(cx, &mut sink)).await.unwrap();
        assert_eq!(written.message_id, 2);
        assert_eq!(drain(&mut reader).await, "HTTP/1.1 200 OK\r\ncontent-length: 6\r\n\r\nsecond");
        assert!(outbound.is_empty());
    }

    #[tokio::test]
    async fn unfulfilled_head_of_line_blocks() {
        let (writer, _reader) = tokio::io::duplex(4096);
        let mut sink = FramedWrite::new(writer, MessageEncoder::<ResponseHead>::new());
        let mut outbound = Outbound::new();

        outbound.reserve(1);
        outbound.push(2, OutgoingMessage::new(Response::new(()), OutgoingBody::full("ready")));
        let pending = poll_fn(|cx| Poll::Ready(outbound.poll_write(cx, &mut sink))).await;
        assert!(pending.is_pending());
        assert!(outbound.fulfill(3, OutgoingMessage::new(Response::new(()), OutgoingBody::empty())).is_err());
    }

    #[tokio::test]
    async fn next_message_is_the_ready_head_of_line() {
        let (writer, mut reader) = tokio::io::duplex(4096);
        let mut sink = FramedWrite::new(writer, MessageEncoder::<ResponseHead>::new());
        let mut outbound = Outbound::new();

        outbound.reserve(1);
        outbound.push(2, OutgoingMessage::new(Response::new(()), OutgoingBody::full("ready")));
        assert!(outbound.next_message_mut(1).is_none());
        assert!(outbound.next_message_mut(2).is_none());

        outbound.fulfill(1, OutgoingMessage::new(Response::new(()), OutgoingBody::empty())).ok().unwrap();
        outbound.next_message_mut(1).unwrap().close = true;

        let written = poll_fn(|cx| outbound.poll_write(cx, &mut sink)).await.unwrap();
        assert_eq!(written, Written { message_id: 1, close: true });
        assert_eq!(drain(&mut reader).await, "HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n");
        assert!(outbound.next_message_mut(2).is_some());
    }

    #[tokio::test]
    async fn declined_body_ends_the_message() {
        let (writer, mut reader) = tokio::io::duplex(4096);
        let mut sink = FramedWrite::new(writer, MessageEncoder::<ResponseHead>::new());
        let mut outbound = Outbound::new();

        let (sender, body) = streamed();
        let (open, gate) = oneshot::channel();
        let mut message = OutgoingMessage::new(Response::new(()), body);
        message.gate = Some(gate);
        outbound.push(1, message);

        let pending = poll_fn(|cx| Poll::Ready(outbound.poll_write(cx, &mut sink))).await;
        assert!(pending.is_pending());
        assert_eq!(drain(&mut reader).await, "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n");

        open.send(false).unwrap();
        let written = poll_fn(|cx| outbound.poll_write(cx, &mut sink)).await.unwrap();
        assert_eq!(written, Written { message_id: 1, close: false });
        assert_eq!(drain(&mut reader).await, "0\r\n\r\n");
        assert!(sender.is_closed());
    }
}
