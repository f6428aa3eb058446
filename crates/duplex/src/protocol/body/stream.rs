use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use parking_lot::Mutex;

use crate::claim::Release;
use crate::protocol::BodyError;
use crate::protocol::body::source::StreamHandle;
use crate::protocol::body::upstream::{BufferConsumer, Weighted};

struct StreamQueue<T> {
    items: VecDeque<T>,
    outcome: Option<Result<(), BodyError>>,
    waker: Option<Waker>,
}

struct QueueConsumer<T> {
    queue: Arc<Mutex<StreamQueue<T>>>,
}

impl<T: Send> QueueConsumer<T> {
    fn wake(mut queue: parking_lot::MutexGuard<'_, StreamQueue<T>>) {
        let waker = queue.waker.take();
        drop(queue);
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<T: Send> BufferConsumer<T> for QueueConsumer<T> {
    fn add(&mut self, item: T) {
        let mut queue = self.queue.lock();
        queue.items.push_back(item);
        Self::wake(queue);
    }

    fn complete(&mut self) {
        let mut queue = self.queue.lock();
        queue.outcome = Some(Ok(()));
        Self::wake(queue);
    }

    fn error(&mut self, error: BodyError) {
        let mut queue = self.queue.lock();
        queue.outcome = Some(Err(error));
        Self::wake(queue);
    }
}

/// Asynchronous consumer of a body.
///
/// Each item handed out is reported upstream as consumed (by its [`Weighted::weight`]), so the
/// producer is only ever ahead of this stream by the demand it was granted. The first poll
/// signals [`Upstream::start`](super::Upstream::start). Dropping the stream before its end
/// discards the rest of the body.
///
/// For byte bodies it also implements [`http_body::Body`], so it can be handed to anything that
/// consumes bodies, including an outgoing message.
pub struct BodyStream<T = Bytes> {
    queue: Arc<Mutex<StreamQueue<T>>>,
    handle: Option<StreamHandle<T>>,
    started: bool,
    done: bool,
    length: Option<u64>,
}

impl<T: Release + Weighted + Send + 'static> BodyStream<T> {
    pub(crate) fn attach(handle: StreamHandle<T>, length: Option<u64>) -> Self {
        let queue = Arc::new(Mutex::new(StreamQueue { items: VecDeque::new(), outcome: None, waker: None }));
        handle.source.attach(Box::new(QueueConsumer { queue: Arc::clone(&queue) }));
        Self { queue, handle: Some(handle), started: false, done: false, length }
    }

    pub(crate) fn ready(items: Vec<T>) -> Self {
        let length = items.iter().map(Weighted::weight).sum();
        let queue = StreamQueue { items: items.into(), outcome: Some(Ok(())), waker: None };
        Self { queue: Arc::new(Mutex::new(queue)), handle: None, started: true, done: false, length: Some(length) }
    }

    /// Exact length of the remaining body, when known.
    pub fn expected_length(&self) -> Option<u64> {
        self.length
    }

    fn poll_item(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<T, BodyError>>> {
        if self.done {
            return Poll::Ready(None);
        }

        if !self.started {
            self.started = true;
            if let Some(handle) = &self.handle {
                handle.upstream.start();
            }
        }

        let mut queue = self.queue.lock();
        if let Some(item) = queue.items.pop_front() {
            drop(queue);
            if let Some(handle) = &self.handle {
                handle.upstream.on_bytes_consumed(item.weight());
            }
            return Poll::Ready(Some(Ok(item)));
        }

        match queue.outcome.take() {
            Some(Ok(())) => {
                drop(queue);
                self.done = true;
                // fully delivered: nothing left to discard
                self.handle = None;
                Poll::Ready(None)
            }
            Some(Err(e)) => {
                drop(queue);
                self.done = true;
                self.handle.release();
                Poll::Ready(Some(Err(e)))
            }
            None => {
                queue.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T: Release + Weighted + Send + Unpin + 'static> Stream for BodyStream<T> {
    type Item = Result<T, BodyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_item(cx)
    }
}

impl Body for BodyStream<Bytes> {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.get_mut().poll_item(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }

    fn size_hint(&self) -> SizeHint {
        match self.length {
            Some(length) => SizeHint::with_exact(length),
            None => SizeHint::new(),
        }
    }
}

impl<T> Drop for BodyStream<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abandon();
        }
    }
}

impl<T> std::fmt::Debug for BodyStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyStream")
            .field("started", &self.started)
            .field("done", &self.done)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}
