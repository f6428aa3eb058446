//! The two halves of the backpressure contract.
//!
//! Data flows downstream through [`BufferConsumer`] (`add` / `complete` / `error`), demand flows
//! upstream through [`Upstream`] (`start` / `on_bytes_consumed` / `discard`).

use std::sync::Arc;

use bytes::Bytes;

use crate::protocol::BodyError;

/// Demand handle of a body producer.
///
/// Implementations are called from arbitrary threads, possibly concurrently, and must not block.
#[cfg_attr(test, mockall::automock)]
pub trait Upstream: Send + Sync {
    /// The consumer attached and wants data. Only the first call has an effect.
    fn start(&self) {}

    /// The consumer finished with `bytes` more bytes; the producer may send that much more.
    ///
    /// Accumulation saturates, `u64::MAX` asks for everything.
    fn on_bytes_consumed(&self, bytes: u64);

    /// The consumer is not interested in the rest of the body. Idempotent.
    fn discard(&self);
}

pub type SharedUpstream = Arc<dyn Upstream>;

/// Upstream of a body that is already complete. Demand is meaningless for it.
#[derive(Debug, Clone, Copy)]
pub struct NoopUpstream;

impl Upstream for NoopUpstream {
    fn on_bytes_consumed(&self, _bytes: u64) {}

    fn discard(&self) {}
}

pub(crate) fn noop_upstream() -> SharedUpstream {
    Arc::new(NoopUpstream)
}

/// Receiver side of a body: invoked by the producer in delivery order.
pub trait BufferConsumer<T>: Send {
    fn add(&mut self, item: T);

    fn complete(&mut self);

    fn error(&mut self, error: BodyError);
}

/// How many bytes an item of a body stands for, when reported as consumed.
pub trait Weighted {
    fn weight(&self) -> u64;
}

impl Weighted for Bytes {
    #[inline]
    fn weight(&self) -> u64 {
        self.len() as u64
    }
}
