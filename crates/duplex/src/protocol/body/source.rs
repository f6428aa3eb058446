use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::claim::Release;
use crate::protocol::BodyError;
use crate::protocol::body::upstream::{BufferConsumer, SharedUpstream};

/// Delivery point between a body producer and the consumer attached to it later.
///
/// Items pushed before a consumer attaches are queued and handed over, in order, on
/// [`attach`](StreamSource::attach). Once closed, pushed items are released immediately.
pub(crate) struct StreamSource<T> {
    inner: Mutex<SourceState<T>>,
}

struct SourceState<T> {
    pending: VecDeque<T>,
    outcome: Option<Result<(), BodyError>>,
    consumer: Option<Box<dyn BufferConsumer<T>>>,
    attached: bool,
    closed: bool,
}

impl<T: Release + Send + 'static> StreamSource<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SourceState {
                pending: VecDeque::new(),
                outcome: None,
                consumer: None,
                attached: false,
                closed: false,
            }),
        })
    }

    pub(crate) fn push(&self, mut item: T) {
        let mut state = self.inner.lock();
        if state.closed || state.outcome.is_some() {
            item.release();
            return;
        }

        match &mut state.consumer {
            Some(consumer) => consumer.add(item),
            None => state.pending.push_back(item),
        }
    }

    pub(crate) fn finish(&self, outcome: Result<(), BodyError>) {
        let mut state = self.inner.lock();
        if state.closed || state.outcome.is_some() {
            return;
        }

        if let Some(mut consumer) = state.consumer.take() {
            match outcome.clone() {
                Ok(()) => consumer.complete(),
                Err(e) => consumer.error(e),
            }
        }
        state.outcome = Some(outcome);
    }

    /// Attaches the single consumer, replaying what arrived before it.
    pub(crate) fn attach(&self, mut consumer: Box<dyn BufferConsumer<T>>) {
        let mut state = self.inner.lock();
        state.attached = true;
        if state.closed {
            consumer.error(BodyError::Discarded);
            return;
        }

        while let Some(item) = state.pending.pop_front() {
            consumer.add(item);
        }

        match state.outcome.clone() {
            Some(Ok(())) => consumer.complete(),
            Some(Err(e)) => consumer.error(e),
            None => state.consumer = Some(consumer),
        }
    }
}

impl<T> StreamSource<T> {
    pub(crate) fn is_attached(&self) -> bool {
        self.inner.lock().attached
    }

    /// Stops delivery and drops everything still queued.
    pub(crate) fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        state.consumer = None;
        state.pending.clear();
    }
}

impl<T> std::fmt::Debug for StreamSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("StreamSource")
            .field("pending", &state.pending.len())
            .field("attached", &state.attached)
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

/// A live body: where its items arrive and where its demand goes.
pub(crate) struct StreamHandle<T> {
    pub(crate) source: Arc<StreamSource<T>>,
    pub(crate) upstream: SharedUpstream,
}

impl<T> StreamHandle<T> {
    /// Stops delivery to this body and tells its producer to stop.
    pub(crate) fn abandon(&self) {
        self.source.close();
        self.upstream.discard();
    }
}

impl<T> Release for StreamHandle<T> {
    fn release(&mut self) {
        self.abandon();
    }
}

/// Successor left behind by a borrowed conversion: releases the derived body only while nobody
/// has started consuming it.
pub(crate) struct UnattachedRelease<T> {
    pub(crate) handle: Option<StreamHandle<T>>,
}

impl<T> Release for UnattachedRelease<T> {
    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.source.is_attached() {
                handle.abandon();
            }
        }
    }
}

/// Producer side of a streaming body.
///
/// The connection feeds it through the [`BufferConsumer`] contract. Dropping an unfinished sender
/// fails the body with [`BodyError::Closed`].
pub struct BodySender<T = bytes::Bytes> {
    source: Arc<StreamSource<T>>,
    finished: bool,
}

impl<T: Release + Send + 'static> BodySender<T> {
    pub(crate) fn new(source: Arc<StreamSource<T>>) -> Self {
        Self { source, finished: false }
    }
}

impl<T: Release + Send + 'static> BufferConsumer<T> for BodySender<T> {
    fn add(&mut self, item: T) {
        self.source.push(item);
    }

    fn complete(&mut self) {
        self.finished = true;
        self.source.finish(Ok(()));
    }

    fn error(&mut self, error: BodyError) {
        self.finished = true;
        self.source.finish(Err(error));
    }
}

impl<T> Drop for BodySender<T> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.source.inner.lock();
            if state.outcome.is_none() && !state.closed {
                if let Some(mut consumer) = state.consumer.take() {
                    consumer.error(BodyError::Closed);
                }
                state.outcome = Some(Err(BodyError::Closed));
            }
        }
    }
}

impl<T> std::fmt::Debug for BodySender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodySender").field("finished", &self.finished).finish_non_exhaustive()
    }
}

/// Consumer installed by a split: every item goes to both branches, retained once per branch.
pub(crate) struct Fanout<T> {
    pub(crate) left: Arc<StreamSource<T>>,
    pub(crate) right: Arc<StreamSource<T>>,
}

impl<T: Release + Clone + Send + 'static> BufferConsumer<T> for Fanout<T> {
    fn add(&mut self, item: T) {
        self.left.push(item.clone());
        self.right.push(item);
    }

    fn complete(&mut self) {
        self.left.finish(Ok(()));
        self.right.finish(Ok(()));
    }

    fn error(&mut self, error: BodyError) {
        self.left.finish(Err(error.clone()));
        self.right.finish(Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[derive(Default)]
    struct Collect {
        items: Arc<Mutex<Vec<Bytes>>>,
        outcome: Arc<Mutex<Option<Result<(), BodyError>>>>,
    }

    impl BufferConsumer<Bytes> for Collect {
        fn add(&mut self, item: Bytes) {
            self.items.lock().push(item);
        }

        fn complete(&mut self) {
            *self.outcome.lock() = Some(Ok(()));
        }

        fn error(&mut self, error: BodyError) {
            *self.outcome.lock() = Some(Err(error));
        }
    }

    #[test]
    fn queues_until_attached() {
        let source = StreamSource::new();
        source.push(Bytes::from_static(b"a"));
        source.push(Bytes::from_static(b"b"));

        let collect = Collect::default();
        let (items, outcome) = (Arc::clone(&collect.items), Arc::clone(&collect.outcome));
        source.attach(Box::new(collect));
        assert_eq!(items.lock().len(), 2);
        assert!(outcome.lock().is_none());

        source.push(Bytes::from_static(b"c"));
        source.finish(Ok(()));
        assert_eq!(items.lock().concat(), b"abc");
        assert_eq!(*outcome.lock(), Some(Ok(())));
    }

    #[test]
    fn dropped_sender_fails_consumer() {
        let source = StreamSource::new();
        let sender = BodySender::new(Arc::clone(&source));

        let collect = Collect::default();
        let outcome = Arc::clone(&collect.outcome);
        source.attach(Box::new(collect));

        drop(sender);
        assert_eq!(*outcome.lock(), Some(Err(BodyError::Closed)));
    }

    #[test]
    fn closed_source_drops_items() {
        let source: Arc<StreamSource<Bytes>> = StreamSource::new();
        source.push(Bytes::from_static(b"a"));
        source.close();
        source.push(Bytes::from_static(b"b"));
        assert!(format!("{source:?}").contains("pending: 0"));
    }
}
