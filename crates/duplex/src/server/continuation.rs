use tracing::debug;

/// `Expect: 100-continue` bookkeeping for the server.
///
/// The provisional response is sent once the body consumer of the expecting message first asks
/// for data, and only while that message is the only one in flight; an earlier response still
/// being produced defers it. The expectation stays open until the final response head is about to
/// be written, so a response streaming the request body back still gets its `100 Continue`.
#[derive(Debug, Default)]
pub(crate) struct ContinueTracker {
    pending: Option<Pending>,
}

#[derive(Debug)]
struct Pending {
    message_id: u64,
    demanded: bool,
    deferred: bool,
}

impl ContinueTracker {
    pub(crate) fn expect(&mut self, message_id: u64) {
        self.pending = Some(Pending { message_id, demanded: false, deferred: false });
    }

    /// Message still waiting for its `100 Continue`.
    pub(crate) fn pending_message(&self) -> Option<u64> {
        self.pending.as_ref().map(|pending| pending.message_id)
    }

    /// Returns the message to send `100 Continue` for now, if any.
    ///
    /// `is_demanded` tells whether the body consumer of a message asked for data.
    pub(crate) fn poll(&mut self, is_demanded: impl FnOnce(u64) -> bool, in_flight: usize) -> Option<u64> {
        let pending = self.pending.as_mut()?;
        if !pending.demanded {
            pending.demanded = is_demanded(pending.message_id);
        }
        if !pending.demanded {
            return None;
        }

        if in_flight == 1 {
            return self.pending.take().map(|pending| pending.message_id);
        }

        if !pending.deferred {
            pending.deferred = true;
            debug!(message_id = pending.message_id, in_flight, "100 continue deferred");
        }
        None
    }

    /// The body arrived without the provisional response.
    pub(crate) fn on_body_end(&mut self, message_id: u64) {
        if self.pending.as_ref().is_some_and(|pending| pending.message_id == message_id) {
            self.pending = None;
        }
    }

    /// The final response head for `message_id` is written next. Returns whether the expectation
    /// is still open, in which case the peer may or may not send the body and the connection has
    /// to close after the response.
    pub(crate) fn on_response(&mut self, message_id: u64) -> bool {
        if self.pending.as_ref().is_some_and(|pending| pending.message_id == message_id) {
            self.pending = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sent_once_after_first_demand() {
        let mut tracker = ContinueTracker::default();
        tracker.expect(1);

        assert_eq!(tracker.poll(|_| false, 1), None);
        assert_eq!(tracker.poll(|id| id == 1, 1), Some(1));
        assert_eq!(tracker.poll(|_| true, 1), None);
        assert_eq!(tracker.pending_message(), None);
        assert!(!tracker.on_response(1));
    }

    #[test]
    fn deferred_while_another_message_is_in_flight() {
        let mut tracker = ContinueTracker::default();
        tracker.expect(2);

        assert_eq!(tracker.poll(|_| true, 2), None);
        // the demand is remembered even if the consumer does not ask again
        assert_eq!(tracker.poll(|_| false, 2), None);
        assert_eq!(tracker.poll(|_| false, 1), Some(2));
    }

    #[test]
    fn response_before_continue_forces_close() {
        let mut tracker = ContinueTracker::default();
        tracker.expect(3);
        assert_eq!(tracker.pending_message(), Some(3));
        assert!(!tracker.on_response(2));
        assert!(tracker.on_response(3));
        assert_eq!(tracker.poll(|_| true, 1), None);
    }

    #[test]
    fn body_sent_anyway_resolves() {
        let mut tracker = ContinueTracker::default();
        tracker.expect(4);
        tracker.on_body_end(4);
        assert!(!tracker.on_response(4));
    }
}
