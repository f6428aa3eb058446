//! Core HTTP protocol abstractions.
//!
//! # Architecture
//!
//! - **Message Handling** ([`Message`], [`PayloadItem`], [`PayloadSize`]): a message on the wire
//!   is a header followed by payload items, ending with a terminal item
//! - **Request / Response Heads** ([`RequestHeader`], [`RequestHead`], [`ResponseHead`])
//! - **Bodies** ([`body`]): exactly-once, demand-driven message bodies
//! - **Error Handling**: [`HttpError`], [`ParseError`], [`SendError`], [`BodyError`]
//!
//! The protocol module is typically used through the server and client connections rather than
//! directly.

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHead;
pub use request::RequestHeader;
pub use request::{content_type, is_form_urlencoded};
pub(crate) use request::{has_token, is_keep_alive};

mod response;
pub use response::ResponseHead;
pub(crate) use response::{response_has_body, status_forbids_body};

mod error;
pub use error::BodyError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
