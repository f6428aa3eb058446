//! Backpressure-aware message bodies and a duplex HTTP/1.x stream coordinator.
//!
//! The crate turns a chunked byte transport into bodies that are consumed exactly once, whose
//! consumers pace the transport through demand signals, and which can be split into two
//! independent consumers. On top of that it runs HTTP/1.1 connections in both directions, keeping
//! pipelined messages in order.
//!
//! # Example
//!
//! ```no_run
//! use std::error::Error;
//! use std::sync::Arc;
//!
//! use http::{Request, Response};
//! use micro_duplex::config::ConnectionConfig;
//! use micro_duplex::handler::make_handler;
//! use micro_duplex::protocol::body::ByteBody;
//! use micro_duplex::server::ServerConnection;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let handler = Arc::new(make_handler(echo));
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = Arc::clone(&handler);
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = ServerConnection::new(reader, writer, ConnectionConfig::default());
//!             if let Err(e) = connection.process(handler).await {
//!                 error!(cause = %e, "connection shutdown");
//!             }
//!         });
//!     }
//! }
//!
//! async fn echo(request: Request<ByteBody>) -> Result<Response<ByteBody>, Box<dyn Error + Send + Sync>> {
//!     info!(path = request.uri().path(), "echo");
//!     Ok(Response::new(request.into_body()))
//! }
//! ```
//!
//! # Architecture
//!
//! - [`claim`]: single ownership of releasable resources
//! - [`protocol`]: message framing types, errors and the [`body`](protocol::body) model
//! - [`codec`]: HTTP/1.x encoders and decoders for both directions
//! - [`server`] and [`client`]: the connection loops built on the inbound and outbound halves of
//!   the stream coordinator
//! - [`handler`]: request handlers run by the server
//!
//! # Bodies
//!
//! An inbound body is either already in memory or still streaming from the connection. Every
//! consumer reports the bytes it consumed; the connection reads further body bytes only while
//! the consumer's demand window is open, so a slow consumer slows the peer down instead of
//! growing buffers. A body dropped unread is discarded, and the connection skips the rest of it
//! without disturbing the next pipelined message.
//!
//! # Limitations
//!
//! - HTTP/1.x only
//! - No TLS support

pub mod claim;
pub mod client;
pub mod codec;
pub mod config;
pub(crate) mod connection;
pub mod handler;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
