use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use tokio::sync::Notify;
use tracing::trace;

use crate::protocol::body::Upstream;

/// Demand of one inbound message body, as seen by the connection.
///
/// The window starts at the configured initial demand, shrinks as the connection delivers body
/// bytes and grows as consumers report consumption. The connection only reads body bytes while
/// the window is open. Consumers may report from any thread: the window is a lock-free counter and
/// every change wakes the connection through the shared [`Notify`].
#[derive(Debug)]
pub(crate) struct InboundDemand {
    message_id: u64,
    window: AtomicI64,
    started: AtomicBool,
    discarded: AtomicBool,
    notify: Arc<Notify>,
}

impl InboundDemand {
    pub(crate) fn new(message_id: u64, initial_demand: u64, notify: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            message_id,
            window: AtomicI64::new(to_signed(initial_demand)),
            started: AtomicBool::new(false),
            discarded: AtomicBool::new(false),
            notify,
        })
    }

    pub(crate) fn message_id(&self) -> u64 {
        self.message_id
    }

    pub(crate) fn record_delivered(&self, bytes: u64) {
        let bytes = to_signed(bytes);
        let _ = self.window.fetch_update(Ordering::AcqRel, Ordering::Acquire, |window| Some(window.saturating_sub(bytes)));
    }

    pub(crate) fn has_demand(&self) -> bool {
        self.window.load(Ordering::Acquire) > 0
    }

    /// A consumer attached and asked for data.
    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub(crate) fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }
}

impl Upstream for InboundDemand {
    /// A consumer that was granted nothing up front still gets its first bytes.
    fn start(&self) {
        if !self.started.swap(true, Ordering::AcqRel) {
            let _ = self.window.fetch_update(Ordering::AcqRel, Ordering::Acquire, |window| (window == 0).then_some(1));
            trace!(message_id = self.message_id, "body consumer started");
            self.notify.notify_one();
        }
    }

    fn on_bytes_consumed(&self, bytes: u64) {
        let bytes = to_signed(bytes);
        let _ = self.window.fetch_update(Ordering::AcqRel, Ordering::Acquire, |window| Some(window.saturating_add(bytes)));
        self.started.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn discard(&self) {
        if !self.discarded.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }
}

fn to_signed(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_opens_and_closes() {
        let demand = InboundDemand::new(1, 10, Arc::new(Notify::new()));
        assert!(demand.has_demand());

        demand.record_delivered(10);
        assert!(!demand.has_demand());

        demand.on_bytes_consumed(4);
        assert!(demand.has_demand());
        assert!(demand.is_started());
    }

    #[test]
    fn unlimited_grant_saturates() {
        let demand = InboundDemand::new(1, 0, Arc::new(Notify::new()));
        demand.on_bytes_consumed(u64::MAX);
        demand.on_bytes_consumed(u64::MAX);
        assert!(demand.has_demand());

        demand.record_delivered(1 << 40);
        assert!(demand.has_demand());
    }

    #[test]
    fn start_opens_an_empty_window() {
        let demand = InboundDemand::new(1, 0, Arc::new(Notify::new()));
        assert!(!demand.has_demand());

        demand.start();
        assert!(demand.has_demand());
        demand.record_delivered(1);
        demand.start();
        assert!(!demand.has_demand());
    }

    #[tokio::test]
    async fn changes_wake_the_connection() {
        let notify = Arc::new(Notify::new());
        let demand = InboundDemand::new(1, 0, Arc::clone(&notify));

        let consumer = Arc::clone(&demand);
        std::thread::spawn(move || consumer.discard()).join().unwrap();

        notify.notified().await;
        assert!(demand.is_discarded());
    }
}
