use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::claim::{Claimable, Release};
use crate::protocol::BodyError;
use crate::protocol::body::buffer::BufferFuture;
use crate::protocol::body::multi::{BodyPart, MultiObjectBody, parse_form_fields};
use crate::protocol::body::reader::BlockingReader;
use crate::protocol::body::stream::BodyStream;

/// A body that is fully available in memory.
#[derive(Debug)]
pub struct ImmediateBody {
    bytes: Claimable<Bytes>,
    length: u64,
}

impl ImmediateBody {
    pub fn new(bytes: Bytes) -> Self {
        let length = bytes.len() as u64;
        Self { bytes: Claimable::new(bytes), length }
    }

    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }

    /// Exact size of the body.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Peeks at the content.
    pub fn bytes(&self) -> Result<&Bytes, BodyError> {
        self.bytes.value()
    }

    /// A second body over the same, shared, buffer.
    pub fn split(&self) -> Result<ImmediateBody, BodyError> {
        self.bytes.value().map(|bytes| ImmediateBody::new(bytes.clone()))
    }

    /// Already buffered, so this resolves immediately with the body itself.
    pub fn buffer(&mut self) -> BufferFuture {
        BufferFuture::ready(self.bytes.claim().map(ImmediateBody::new))
    }

    pub fn into_bytes(mut self) -> Result<Bytes, BodyError> {
        self.bytes.claim()
    }

    pub fn into_stream(mut self) -> Result<BodyStream, BodyError> {
        let bytes = self.bytes.claim()?;
        let items = if bytes.is_empty() { Vec::new() } else { vec![bytes] };
        Ok(BodyStream::ready(items))
    }

    pub fn into_reader(mut self) -> Result<BlockingReader, BodyError> {
        self.bytes.claim().map(BlockingReader::ready)
    }

    /// The body as a single data part.
    pub fn to_multi_object(&mut self) -> Result<MultiObjectBody<BodyPart>, BodyError> {
        let bytes = self.bytes.claim()?;
        let parts = if bytes.is_empty() { Vec::new() } else { vec![BodyPart::Data(bytes)] };
        Ok(MultiObjectBody::immediate(parts))
    }

    /// The body decoded as `application/x-www-form-urlencoded` fields, in order.
    pub fn to_form_fields(&mut self) -> Result<MultiObjectBody<BodyPart>, BodyError> {
        let bytes = self.bytes.claim()?;
        parse_form_fields(&bytes).map(MultiObjectBody::immediate)
    }

    pub fn decode_form<T: DeserializeOwned>(mut self) -> Result<T, BodyError> {
        let bytes = self.bytes.claim()?;
        serde_urlencoded::from_bytes(&bytes).map_err(BodyError::form)
    }

    pub fn is_claimed(&self) -> bool {
        self.bytes.is_claimed()
    }
}

impl Release for ImmediateBody {
    fn release(&mut self) {
        self.bytes.release();
    }
}

impl From<Bytes> for ImmediateBody {
    fn from(bytes: Bytes) -> Self {
        ImmediateBody::new(bytes)
    }
}
