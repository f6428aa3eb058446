//! Server side of an HTTP/1.1 connection.
//!
//! [`ServerConnection`] reads requests, hands each of them to a [`Handler`](crate::handler::Handler)
//! and writes the responses back in request order. Besides the plain exchange it takes care of:
//!
//! - `Expect: 100-continue`, answered once the handler starts reading the body
//! - protocol upgrades, see [`OnUpgrade`]
//! - conditional and range requests for file-like resources, see [`plan_file_response`]

mod conditional;
mod connection;
pub(crate) mod continuation;
mod upgrade;

pub use conditional::{FileMetadata, FileResponsePlan, plan_file_response};
pub use connection::ServerConnection;
pub use upgrade::{OnUpgrade, UpgradeError, Upgraded};
