//! Bodies made of discrete objects rather than raw bytes.
//!
//! A byte body can be viewed as a sequence of [`BodyPart`]s: opaque data chunks, or decoded form
//! fields when the content is `application/x-www-form-urlencoded`. Such a sequence can be
//! collapsed into a single value with [`MultiObjectBody::single_value`].

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::de::DeserializeOwned;

use crate::claim::{Claimable, Release};
use crate::protocol::BodyError;
use crate::protocol::body::balancer::{SplitMode, UpstreamBalancer};
use crate::protocol::body::source::{BodySender, Fanout, StreamHandle, StreamSource};
use crate::protocol::body::stream::BodyStream;
use crate::protocol::body::upstream::{BufferConsumer, Upstream, Weighted};

/// One element of a multi-object body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPart {
    Data(Bytes),
    Field { name: String, value: String },
}

impl BodyPart {
    pub fn field<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        BodyPart::Field { name: name.into(), value: value.into() }
    }

    pub fn is_field(&self) -> bool {
        matches!(self, BodyPart::Field { .. })
    }
}

impl Release for BodyPart {
    fn release(&mut self) {
        if let BodyPart::Data(bytes) = self {
            bytes.release();
        }
    }
}

impl Weighted for BodyPart {
    fn weight(&self) -> u64 {
        match self {
            BodyPart::Data(bytes) => bytes.len() as u64,
            BodyPart::Field { name, value } => (name.len() + value.len()) as u64,
        }
    }
}

/// Form fields in arrival order; a name may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: Vec<(String, Vec<String>)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, values)) => values.push(value.into()),
            None => self.fields.push((name, vec![value.into()])),
        }
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.fields.iter().find(|(existing, _)| existing == name).map_or(&[], |(_, values)| values.as_slice())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().flat_map(|(name, values)| values.iter().map(move |value| (name.as_str(), value.as_str())))
    }

    /// Hands the fields to a form deserializer.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BodyError> {
        let pairs: Vec<(&str, &str)> = self.iter().collect();
        let encoded = serde_urlencoded::to_string(pairs).map_err(BodyError::form)?;
        serde_urlencoded::from_str(&encoded).map_err(BodyError::form)
    }
}

/// Result of collapsing a multi-object body into one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleValue<T> {
    Empty,
    One(T),
    Form(FormData),
}

enum Kind<T: Release> {
    Immediate(Claimable<Vec<T>>),
    Streaming(Claimable<StreamHandle<T>>),
}

/// A body delivering a sequence of objects, either already complete or still arriving.
pub struct MultiObjectBody<T: Release> {
    kind: Kind<T>,
}

impl<T: Release + Weighted + Clone + Send + 'static> MultiObjectBody<T> {
    pub fn immediate(items: Vec<T>) -> Self {
        Self { kind: Kind::Immediate(Claimable::new(items)) }
    }

    pub(crate) fn streaming(handle: StreamHandle<T>) -> Self {
        Self { kind: Kind::Streaming(Claimable::new(handle)) }
    }

    /// A second, independent consumer view of the same objects.
    pub fn split(&mut self, mode: SplitMode) -> Result<MultiObjectBody<T>, BodyError> {
        match &mut self.kind {
            Kind::Immediate(items) => Ok(Self::immediate(items.value()?.clone())),
            Kind::Streaming(handle) => {
                let (left, right) = split_handle(handle.claim()?, mode);
                *handle = Claimable::new(left);
                Ok(Self::streaming(right))
            }
        }
    }

    pub fn into_stream(mut self) -> Result<BodyStream<T>, BodyError> {
        match &mut self.kind {
            Kind::Immediate(items) => Ok(BodyStream::ready(items.claim()?)),
            Kind::Streaming(handle) => Ok(BodyStream::attach(handle.claim()?, None)),
        }
    }

    /// Waits for every object.
    pub async fn collect(self) -> Result<Vec<T>, BodyError>
    where
        T: Unpin,
    {
        let mut stream = self.into_stream()?;
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item?);
        }
        Ok(items)
    }
}

impl MultiObjectBody<BodyPart> {
    /// Collapses the body into a single value.
    ///
    /// - no parts: [`SingleValue::Empty`]
    /// - only form fields: [`SingleValue::Form`] with every field
    /// - exactly one part: [`SingleValue::One`]
    /// - only data parts: one data part with the concatenated content
    ///
    /// Data mixed with form fields cannot be collapsed.
    pub async fn single_value(self) -> Result<SingleValue<BodyPart>, BodyError> {
        coerce(self.collect().await?)
    }

    pub async fn decode_form<D: DeserializeOwned>(self) -> Result<D, BodyError> {
        match self.single_value().await? {
            SingleValue::Empty => FormData::new().decode(),
            SingleValue::Form(form) => form.decode(),
            SingleValue::One(BodyPart::Data(bytes)) => serde_urlencoded::from_bytes(&bytes).map_err(BodyError::form),
            SingleValue::One(BodyPart::Field { name, value }) => {
                let mut form = FormData::new();
                form.append(name, value);
                form.decode()
            }
        }
    }
}

fn coerce(mut parts: Vec<BodyPart>) -> Result<SingleValue<BodyPart>, BodyError> {
    if parts.is_empty() {
        return Ok(SingleValue::Empty);
    }

    if parts.iter().all(BodyPart::is_field) {
        let mut form = FormData::new();
        for part in parts {
            if let BodyPart::Field { name, value } = part {
                form.append(name, value);
            }
        }
        return Ok(SingleValue::Form(form));
    }

    if parts.len() == 1 {
        return Ok(parts.pop().map_or(SingleValue::Empty, SingleValue::One));
    }

    if parts.iter().any(BodyPart::is_field) {
        return Err(BodyError::form("body mixes form fields and raw data"));
    }

    let total = parts.iter().map(Weighted::weight).sum::<u64>();
    let mut buf = BytesMut::with_capacity(usize::try_from(total).unwrap_or(0));
    for part in parts {
        if let BodyPart::Data(bytes) = part {
            buf.extend_from_slice(&bytes);
        }
    }
    Ok(SingleValue::One(BodyPart::Data(buf.freeze())))
}

impl<T: Release> std::fmt::Debug for MultiObjectBody<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, claimed) = match &self.kind {
            Kind::Immediate(items) => ("immediate", items.is_claimed()),
            Kind::Streaming(handle) => ("streaming", handle.is_claimed()),
        };
        f.debug_struct("MultiObjectBody").field("kind", &kind).field("claimed", &claimed).finish()
    }
}

/// Installs a balancer and a fanout behind `handle`, returning the two new branches.
pub(crate) fn split_handle<T>(handle: StreamHandle<T>, mode: SplitMode) -> (StreamHandle<T>, StreamHandle<T>)
where
    T: Release + Clone + Send + 'static,
{
    let StreamHandle { source, upstream } = handle;
    let (left_upstream, right_upstream) = UpstreamBalancer::split(upstream, mode);
    let (left_source, right_source) = (StreamSource::new(), StreamSource::new());

    source.attach(Box::new(Fanout { left: Arc::clone(&left_source), right: Arc::clone(&right_source) }));

    (
        StreamHandle { source: left_source, upstream: left_upstream },
        StreamHandle { source: right_source, upstream: right_upstream },
    )
}

/// Decodes a complete `application/x-www-form-urlencoded` payload into field parts.
pub(crate) fn parse_form_fields(bytes: &[u8]) -> Result<Vec<BodyPart>, BodyError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes).map_err(BodyError::form)?;
    Ok(pairs.into_iter().map(|(name, value)| BodyPart::Field { name, value }).collect())
}

/// Turns raw chunks into data parts, one part per chunk.
pub(crate) struct DataParts {
    pub(crate) parts: BodySender<BodyPart>,
}

impl BufferConsumer<Bytes> for DataParts {
    fn add(&mut self, item: Bytes) {
        if !item.is_empty() {
            self.parts.add(BodyPart::Data(item));
        }
    }

    fn complete(&mut self) {
        self.parts.complete();
    }

    fn error(&mut self, error: BodyError) {
        self.parts.error(error);
    }
}

/// Splits a form body into fields as soon as each `&`-terminated field is complete.
///
/// The splitter asks for the whole body up front: form bodies are bounded by the connection's
/// body size limit.
pub(crate) struct FormFieldSplitter {
    pending: BytesMut,
    parts: BodySender<BodyPart>,
    failed: bool,
}

impl FormFieldSplitter {
    pub(crate) fn attach(handle: &StreamHandle<Bytes>, parts: BodySender<BodyPart>) {
        handle.upstream.start();
        handle.upstream.on_bytes_consumed(u64::MAX);
        handle.source.attach(Box::new(FormFieldSplitter { pending: BytesMut::new(), parts, failed: false }));
    }

    fn emit(&mut self, segment: &[u8]) {
        if segment.is_empty() || self.failed {
            return;
        }

        match parse_form_fields(segment) {
            Ok(fields) => {
                for field in fields {
                    self.parts.add(field);
                }
            }
            Err(e) => {
                self.failed = true;
                self.parts.error(e);
            }
        }
    }
}

impl BufferConsumer<Bytes> for FormFieldSplitter {
    fn add(&mut self, item: Bytes) {
        self.pending.extend_from_slice(&item);
        while let Some(position) = self.pending.iter().position(|b| *b == b'&') {
            let segment = self.pending.split_to(position + 1);
            self.emit(&segment[..position]);
        }
    }

    fn complete(&mut self) {
        let rest = self.pending.split();
        self.emit(&rest);
        if !self.failed {
            self.parts.complete();
        }
    }

    fn error(&mut self, error: BodyError) {
        self.failed = true;
        self.parts.error(error);
    }
}

/// Demand handle of a derived part stream: demand was already granted in full to the byte body,
/// only `start` and `discard` travel upstream.
pub(crate) struct DiscardOnly(pub(crate) crate::protocol::body::upstream::SharedUpstream);

impl Upstream for DiscardOnly {
    fn start(&self) {
        self.0.start();
    }

    fn on_bytes_consumed(&self, _bytes: u64) {}

    fn discard(&self) {
        self.0.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_rules() {
        assert_eq!(coerce(vec![]).unwrap(), SingleValue::Empty);

        let one = coerce(vec![BodyPart::Data(Bytes::from_static(b"x"))]).unwrap();
        assert_eq!(one, SingleValue::One(BodyPart::Data(Bytes::from_static(b"x"))));

        let joined =
            coerce(vec![BodyPart::Data(Bytes::from_static(b"ab")), BodyPart::Data(Bytes::from_static(b"cd"))]).unwrap();
        assert_eq!(joined, SingleValue::One(BodyPart::Data(Bytes::from_static(b"abcd"))));

        let form = coerce(vec![BodyPart::field("a", "1"), BodyPart::field("b", "2"), BodyPart::field("a", "3")]).unwrap();
        let SingleValue::Form(form) = form else { panic!("expected form") };
        assert_eq!(form.get_all("a"), ["1", "3"]);
        assert_eq!(form.get("b"), Some("2"));
        assert_eq!(form.len(), 2);

        let mixed = coerce(vec![BodyPart::field("a", "1"), BodyPart::Data(Bytes::from_static(b"x"))]);
        assert!(matches!(mixed, Err(BodyError::Form { .. })));
    }

    #[test]
    fn single_field_is_a_form() {
        let value = coerce(vec![BodyPart::field("a", "1")]).unwrap();
        assert!(matches!(value, SingleValue::Form(form) if form.get("a") == Some("1")));
    }

    #[test]
    fn form_data_keeps_insertion_order() {
        let mut form = FormData::new();
        form.append("z", "1");
        form.append("a", "2");
        form.append("z", "3");
        let pairs: Vec<_> = form.iter().collect();
        assert_eq!(pairs, vec![("z", "1"), ("z", "3"), ("a", "2")]);
    }

    #[tokio::test]
    async fn immediate_split_and_collect() {
        let mut body = MultiObjectBody::immediate(vec![BodyPart::field("a", "1")]);
        let other = body.split(SplitMode::Slowest).unwrap();
        assert_eq!(body.collect().await.unwrap(), other.collect().await.unwrap());
    }

    #[tokio::test]
    async fn splitter_handles_fields_across_chunks() {
        let (parts_sender, parts_source) = {
            let source = StreamSource::new();
            (BodySender::new(Arc::clone(&source)), source)
        };
        let mut splitter = FormFieldSplitter { pending: BytesMut::new(), parts: parts_sender, failed: false };
        splitter.add(Bytes::from_static(b"na"));
        splitter.add(Bytes::from_static(b"me=za%20va&ag"));
        splitter.add(Bytes::from_static(b"e=18"));
        splitter.complete();

        let body = MultiObjectBody::streaming(StreamHandle {
            source: parts_source,
            upstream: crate::protocol::body::upstream::noop_upstream(),
        });
        let parts = body.collect().await.unwrap();
        assert_eq!(parts, vec![BodyPart::field("name", "za va"), BodyPart::field("age", "18")]);
    }
}
