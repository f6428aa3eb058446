use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::protocol::BodyError;
use crate::protocol::body::source::StreamHandle;
use crate::protocol::body::upstream::BufferConsumer;

#[derive(Default)]
struct ReaderState {
    chunks: VecDeque<Bytes>,
    outcome: Option<Result<(), BodyError>>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<ReaderState>,
    available: Condvar,
}

struct ReaderConsumer {
    shared: Arc<Shared>,
}

impl BufferConsumer<Bytes> for ReaderConsumer {
    fn add(&mut self, item: Bytes) {
        if item.is_empty() {
            return;
        }
        self.shared.state.lock().chunks.push_back(item);
        self.shared.available.notify_one();
    }

    fn complete(&mut self) {
        self.shared.state.lock().outcome = Some(Ok(()));
        self.shared.available.notify_one();
    }

    fn error(&mut self, error: BodyError) {
        self.shared.state.lock().outcome = Some(Err(error));
        self.shared.available.notify_one();
    }
}

/// Blocking [`io::Read`] adapter over a body.
///
/// Delivery stays push based: arriving chunks are queued and `read` waits on a condition variable
/// when the queue is empty. Every read that finds nothing buffered asks the producer for one more
/// unit of demand, so a reader never waits on a producer that ran out of demand. Must not be used
/// from an async task.
pub struct BlockingReader {
    shared: Arc<Shared>,
    handle: Option<StreamHandle<Bytes>>,
    started: bool,
}

impl BlockingReader {
    pub(crate) fn attach(handle: StreamHandle<Bytes>) -> Self {
        let shared = Arc::new(Shared::default());
        handle.source.attach(Box::new(ReaderConsumer { shared: Arc::clone(&shared) }));
        Self { shared, handle: Some(handle), started: false }
    }

    pub(crate) fn ready(bytes: Bytes) -> Self {
        let shared = Shared::default();
        {
            let mut state = shared.state.lock();
            if !bytes.is_empty() {
                state.chunks.push_back(bytes);
            }
            state.outcome = Some(Ok(()));
        }
        Self { shared: Arc::new(shared), handle: None, started: true }
    }

    fn request_more(&self, state: &mut MutexGuard<'_, ReaderState>) {
        if let Some(handle) = &self.handle {
            MutexGuard::unlocked(state, || handle.upstream.on_bytes_consumed(1));
        }
    }
}

impl io::Read for BlockingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if !self.started {
            self.started = true;
            if let Some(handle) = &self.handle {
                handle.upstream.start();
            }
        }

        let shared = Arc::clone(&self.shared);
        let mut state = shared.state.lock();
        let mut requested = false;
        loop {
            if let Some(chunk) = state.chunks.front_mut() {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                chunk.advance(n);
                if chunk.is_empty() {
                    state.chunks.pop_front();
                }
                drop(state);

                if let Some(handle) = &self.handle {
                    handle.upstream.on_bytes_consumed(n as u64);
                }
                return Ok(n);
            }

            match &state.outcome {
                Some(Ok(())) => {
                    self.handle = None;
                    return Ok(0);
                }
                Some(Err(e)) => return Err(io::Error::other(e.clone())),
                None => {}
            }

            if !requested {
                requested = true;
                self.request_more(&mut state);
                continue;
            }

            shared.available.wait(&mut state);
        }
    }
}

impl Drop for BlockingReader {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abandon();
        }
    }
}

impl std::fmt::Debug for BlockingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("BlockingReader")
            .field("buffered", &state.chunks.len())
            .field("finished", &state.outcome.is_some())
            .finish_non_exhaustive()
    }
}
