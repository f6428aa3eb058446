use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use futures::channel::oneshot;

use crate::protocol::BodyError;
use crate::protocol::body::immediate::ImmediateBody;
use crate::protocol::body::source::StreamHandle;
use crate::protocol::body::upstream::BufferConsumer;

/// Resolves once the whole body arrived, with the body as an [`ImmediateBody`].
///
/// Dropping the future before it resolves discards the body.
#[must_use = "futures do nothing unless polled"]
pub struct BufferFuture {
    state: BufferState,
}

enum BufferState {
    Ready(Option<Result<ImmediateBody, BodyError>>),
    Collecting { receiver: oneshot::Receiver<Result<Bytes, BodyError>>, handle: Option<StreamHandle<Bytes>> },
}

impl BufferFuture {
    pub(crate) fn ready(result: Result<ImmediateBody, BodyError>) -> Self {
        Self { state: BufferState::Ready(Some(result)) }
    }

    /// Attaches a collector and asks the producer for everything.
    pub(crate) fn collect(handle: StreamHandle<Bytes>) -> Self {
        let (sender, receiver) = oneshot::channel();
        handle.upstream.start();
        handle.upstream.on_bytes_consumed(u64::MAX);
        handle.source.attach(Box::new(Collector { chunks: Vec::new(), sender: Some(sender) }));
        Self { state: BufferState::Collecting { receiver, handle: Some(handle) } }
    }
}

impl Future for BufferFuture {
    type Output = Result<ImmediateBody, BodyError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            BufferState::Ready(result) => Poll::Ready(result.take().unwrap_or(Err(BodyError::AlreadyClaimed))),
            BufferState::Collecting { receiver, handle } => {
                let result = match receiver.poll_unpin(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(result)) => result,
                    Poll::Ready(Err(_canceled)) => Err(BodyError::Closed),
                };
                // the collector saw the end of the body, nothing to discard anymore
                handle.take();
                Poll::Ready(result.map(ImmediateBody::new))
            }
        }
    }
}

impl Drop for BufferFuture {
    fn drop(&mut self) {
        if let BufferState::Collecting { handle: Some(handle), .. } = &self.state {
            handle.abandon();
        }
    }
}

impl std::fmt::Debug for BufferFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            BufferState::Ready(_) => "ready",
            BufferState::Collecting { .. } => "collecting",
        };
        f.debug_struct("BufferFuture").field("state", &state).finish()
    }
}

struct Collector {
    chunks: Vec<Bytes>,
    sender: Option<oneshot::Sender<Result<Bytes, BodyError>>>,
}

impl Collector {
    fn send(&mut self, result: Result<Bytes, BodyError>) {
        if let Some(sender) = self.sender.take() {
            // receiver gone means the future was dropped and already discarded the body
            let _ = sender.send(result);
        }
    }
}

impl BufferConsumer<Bytes> for Collector {
    fn add(&mut self, item: Bytes) {
        if !item.is_empty() {
            self.chunks.push(item);
        }
    }

    fn complete(&mut self) {
        let bytes = match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks.pop().unwrap_or_default(),
            _ => {
                let total = self.chunks.iter().map(Bytes::len).sum();
                let mut buf = BytesMut::with_capacity(total);
                for chunk in self.chunks.drain(..) {
                    buf.extend_from_slice(&chunk);
                }
                buf.freeze()
            }
        };
        self.send(Ok(bytes));
    }

    fn error(&mut self, error: BodyError) {
        self.chunks.clear();
        self.send(Err(error));
    }
}
