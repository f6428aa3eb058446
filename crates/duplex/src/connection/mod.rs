//! Stream coordination shared by server and client connections.
//!
//! # Components
//!
//! - [`Inbound`](inbound::Inbound): routes decoded payload items to the body of the message they
//!   belong to, switches to ignore mode once a consumer discards, and enforces the body size limit
//! - [`InboundDemand`](demand::InboundDemand): per-message demand window, the upstream seen by
//!   body consumers
//! - [`Outbound`](outbound::Outbound): FIFO of outgoing messages, written one at a time in order
//! - [`OwnerHandle`](owner::OwnerHandle): resubmits completions from other tasks to the
//!   connection task, which is the only place connection state changes
//!
//! The server and client loops in [`server`](crate::server) and [`client`](crate::client) put
//! these together.

pub(crate) mod demand;
pub(crate) mod inbound;
pub(crate) mod outbound;
pub(crate) mod owner;
