//! Inbound half of the stream coordinator.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::config::ConnectionConfig;
use crate::connection::demand::InboundDemand;
use crate::protocol::body::{BodySender, BufferConsumer, ByteBody, SharedUpstream, channel};
use crate::protocol::{BodyError, ParseError, PayloadItem, PayloadSize};

/// Routes decoded payload items to the body of the message they belong to.
///
/// Every message gets its own [`InboundDemand`], so a consumer discarding the body of an earlier
/// message can never affect the message currently streaming.
pub(crate) struct Inbound {
    max_body_size: Option<u64>,
    initial_demand: u64,
    notify: Arc<Notify>,
    state: State,
}

enum State {
    Idle,

    /// Body items are read and dropped until the terminal item.
    Ignoring { message_id: u64, skipped: u64 },

    Streaming { demand: Arc<InboundDemand>, sender: BodySender, received: u64 },
}

impl Inbound {
    pub(crate) fn new(config: &ConnectionConfig) -> Self {
        Self {
            max_body_size: config.max_body_size,
            initial_demand: config.initial_demand,
            notify: Arc::new(Notify::new()),
            state: State::Idle,
        }
    }

    /// Woken whenever a consumer changes the demand of the current body.
    pub(crate) fn notify(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    /// Starts a new message and returns the body handed to its consumer.
    ///
    /// A message that cannot carry a body gets an empty body at once; the terminal item the
    /// decoder still yields for it is swallowed.
    pub(crate) fn on_header(&mut self, message_id: u64, payload_size: PayloadSize) -> Result<ByteBody, ParseError> {
        if !matches!(self.state, State::Idle) {
            return Err(ParseError::unexpected_message("message head before the previous body ended"));
        }

        if let (Some(length), Some(max_size)) = (payload_size.exact_length(), self.max_body_size) {
            if length > max_size {
                return Err(ParseError::too_large_body(length, max_size));
            }
        }

        if payload_size.is_empty() {
            self.state = State::Ignoring { message_id, skipped: 0 };
            return Ok(ByteBody::empty());
        }

        let demand = InboundDemand::new(message_id, self.initial_demand, Arc::clone(&self.notify));
        let upstream: SharedUpstream = Arc::clone(&demand) as SharedUpstream;
        let (body, sender) = channel(upstream, payload_size.exact_length());
        self.state = State::Streaming { demand, sender, received: 0 };
        Ok(body.into())
    }

    pub(crate) fn on_payload(&mut self, item: PayloadItem) -> Result<(), ParseError> {
        match &mut self.state {
            State::Idle => Err(ParseError::unexpected_message("payload item without a message head")),

            State::Ignoring { message_id, skipped } => {
                match item {
                    PayloadItem::Chunk(bytes) => *skipped += bytes.len() as u64,
                    PayloadItem::Trailers(_) | PayloadItem::Eof => {
                        if *skipped > 0 {
                            debug!(message_id = *message_id, skipped = *skipped, "skipped unread body");
                        }
                        self.state = State::Idle;
                    }
                }
                Ok(())
            }

            State::Streaming { demand, sender, received } => match item {
                PayloadItem::Chunk(bytes) => {
                    let size = bytes.len() as u64;
                    *received += size;
                    if let Some(max_size) = self.max_body_size
                        && *received > max_size
                    {
                        let received = *received;
                        sender.error(BodyError::TooLarge { max_size });
                        self.state = State::Idle;
                        return Err(ParseError::too_large_body(received, max_size));
                    }

                    demand.record_delivered(size);
                    if demand.is_discarded() {
                        drop(bytes);
                        self.ignore_rest(size);
                    } else {
                        sender.add(bytes);
                    }
                    Ok(())
                }
                PayloadItem::Trailers(_) | PayloadItem::Eof => {
                    trace!(message_id = demand.message_id(), received = *received, "body completed");
                    sender.complete();
                    self.state = State::Idle;
                    Ok(())
                }
            },
        }
    }

    /// Switches to ignore mode once the consumer of the current body discarded it.
    pub(crate) fn check_discard(&mut self) {
        if let State::Streaming { demand, .. } = &self.state
            && demand.is_discarded()
        {
            self.ignore_rest(0);
        }
    }

    fn ignore_rest(&mut self, skipped: u64) {
        if let State::Streaming { demand, .. } = &self.state {
            let message_id = demand.message_id();
            debug!(message_id, "body discarded by consumer, ignoring the rest");
            self.state = State::Ignoring { message_id, skipped };
        }
    }

    /// Drops the rest of the body of `message_id` once nothing will read it.
    pub(crate) fn abandon(&mut self, message_id: u64) {
        if let State::Streaming { demand, sender, .. } = &mut self.state
            && demand.message_id() == message_id
        {
            sender.error(BodyError::Discarded);
            self.ignore_rest(0);
        }
    }

    /// Whether body bytes may be read now.
    ///
    /// Discarded bodies are still read so the skipped bytes leave the transport.
    pub(crate) fn wants_read(&self) -> bool {
        match &self.state {
            State::Idle | State::Ignoring { .. } => true,
            State::Streaming { demand, .. } => demand.has_demand() || demand.is_discarded(),
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Message currently receiving body items.
    pub(crate) fn current_message(&self) -> Option<u64> {
        match &self.state {
            State::Idle => None,
            State::Ignoring { message_id, .. } => Some(*message_id),
            State::Streaming { demand, .. } => Some(demand.message_id()),
        }
    }

    /// Whether the consumer of `message_id` asked for body data.
    pub(crate) fn is_demanded(&self, message_id: u64) -> bool {
        match &self.state {
            State::Streaming { demand, .. } => demand.message_id() == message_id && demand.is_started(),
            State::Idle | State::Ignoring { .. } => false,
        }
    }

    /// Fails an unfinished body: the transport will not deliver the rest.
    pub(crate) fn on_transport_closed(&mut self) {
        if let State::Streaming { sender, .. } = &mut self.state {
            sender.error(BodyError::Closed);
        }
        self.state = State::Idle;
    }
}
