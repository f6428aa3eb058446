//! Outbound message encoding, shared by the server (responses) and the client (requests).

use std::marker::PhantomData;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::{Head, HeaderEncoder};
use crate::protocol::{Message, PayloadSize, RequestHead, ResponseHead, SendError};
use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

/// Encodes a head followed by its payload items.
///
/// A new head is accepted once the previous payload wrote its terminal item.
#[derive(Debug)]
pub struct MessageEncoder<H> {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
    _head: PhantomData<fn(H)>,
}

pub type ResponseEncoder = MessageEncoder<ResponseHead>;

pub type RequestEncoder = MessageEncoder<RequestHead>;

impl<H> MessageEncoder<H> {
    pub fn new() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None, _head: PhantomData }
    }

    /// Whether the current payload, if any, is complete.
    pub fn is_idle(&self) -> bool {
        self.payload_encoder.as_ref().is_none_or(PayloadEncoder::is_finish)
    }
}

impl<H> Default for MessageEncoder<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Head, D: Buf> Encoder<Message<(H, PayloadSize), D>> for MessageEncoder<H> {
    type Error = SendError;

    fn encode(&mut self, item: Message<(H, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if !self.is_idle() {
                    error!("expect payload item but receive message head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                let payload_encoder =
                    if head.forbids_framing() { PayloadEncoder::empty() } else { PayloadEncoder::from(payload_size) };
                self.payload_encoder = Some(payload_encoder);
                self.header_encoder.encode((head, payload_size), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect message head but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let result = payload_encoder.encode(payload_item, dst);

                if payload_encoder.is_finish() {
                    self.payload_encoder = None;
                }

                result
            }
        }
    }
}
