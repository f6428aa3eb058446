use std::sync::Arc;

use bytes::Bytes;

use crate::claim::{Claimable, Release};
use crate::protocol::BodyError;
use crate::protocol::body::balancer::SplitMode;
use crate::protocol::body::buffer::BufferFuture;
use crate::protocol::body::multi::{BodyPart, DataParts, DiscardOnly, FormFieldSplitter, MultiObjectBody, split_handle};
use crate::protocol::body::reader::BlockingReader;
use crate::protocol::body::source::{BodySender, StreamHandle, StreamSource, UnattachedRelease};
use crate::protocol::body::stream::BodyStream;
use crate::protocol::body::upstream::SharedUpstream;

/// A body whose content is still arriving.
///
/// Chunks that arrive before a consumer attaches are queued. Exactly one consumer may attach:
/// [`buffer`](Self::buffer), [`into_stream`](Self::into_stream), [`into_reader`](Self::into_reader),
/// or one of the multi-object conversions. [`split`](Self::split) must happen before that.
#[derive(Debug)]
pub struct StreamingBody {
    handle: Claimable<StreamHandle<Bytes>>,
    length: Option<u64>,
}

/// Creates a streaming body fed by the returned sender, with demand reported to `upstream`.
pub fn channel(upstream: SharedUpstream, length: Option<u64>) -> (StreamingBody, BodySender) {
    let source = StreamSource::new();
    let sender = BodySender::new(Arc::clone(&source));
    (StreamingBody::new(StreamHandle { source, upstream }, length), sender)
}

impl StreamingBody {
    pub(crate) fn new(handle: StreamHandle<Bytes>, length: Option<u64>) -> Self {
        Self { handle: Claimable::new(handle), length }
    }

    pub fn expected_length(&self) -> Option<u64> {
        self.length
    }

    /// Creates a second body that observes every chunk of this one.
    ///
    /// Both branches see the full chunk sequence in order, each at its own pace. Demand towards
    /// the producer is merged according to `mode`.
    pub fn split(&mut self, mode: SplitMode) -> Result<StreamingBody, BodyError> {
        let handle = self.handle.claim()?;
        let (left, right) = split_handle(handle, mode);
        self.handle = Claimable::new(left);
        Ok(StreamingBody::new(right, self.length))
    }

    /// Collects the whole body. The producer is granted unlimited demand.
    pub fn buffer(&mut self) -> BufferFuture {
        match self.handle.claim() {
            Ok(handle) => BufferFuture::collect(handle),
            Err(e) => BufferFuture::ready(Err(e)),
        }
    }

    pub fn into_stream(mut self) -> Result<BodyStream, BodyError> {
        let length = self.length;
        self.handle.claim().map(|handle| BodyStream::attach(handle, length))
    }

    pub fn into_reader(mut self) -> Result<BlockingReader, BodyError> {
        self.handle.claim().map(BlockingReader::attach)
    }

    /// Views the body as a stream of data parts, one per chunk.
    pub fn to_multi_object(&mut self) -> Result<MultiObjectBody<BodyPart>, BodyError> {
        let upstream = Arc::clone(&self.handle.prepare_claim()?.upstream);
        let parts = StreamSource::new();
        let derived = StreamHandle { source: Arc::clone(&parts), upstream: Arc::clone(&upstream) };

        let handle = self.handle.next(UnattachedRelease { handle: Some(derived) })?;
        handle.source.attach(Box::new(DataParts { parts: BodySender::new(Arc::clone(&parts)) }));

        Ok(MultiObjectBody::streaming(StreamHandle { source: parts, upstream }))
    }

    /// Decodes the body as `application/x-www-form-urlencoded` fields, emitted as they complete.
    pub fn to_form_fields(&mut self) -> Result<MultiObjectBody<BodyPart>, BodyError> {
        let upstream: SharedUpstream = Arc::new(DiscardOnly(Arc::clone(&self.handle.prepare_claim()?.upstream)));
        let parts = StreamSource::new();
        let derived = StreamHandle { source: Arc::clone(&parts), upstream: Arc::clone(&upstream) };

        let handle = self.handle.next(UnattachedRelease { handle: Some(derived) })?;
        FormFieldSplitter::attach(&handle, BodySender::new(Arc::clone(&parts)));

        Ok(MultiObjectBody::streaming(StreamHandle { source: parts, upstream }))
    }

    pub fn is_claimed(&self) -> bool {
        self.handle.is_claimed()
    }
}

impl Release for StreamingBody {
    fn release(&mut self) {
        self.handle.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::body::upstream::{BufferConsumer, MockUpstream, noop_upstream};
    use futures::StreamExt;
    use std::io::Read;

    #[tokio::test]
    async fn chunks_before_consumer_are_kept() {
        let (body, mut sender) = channel(noop_upstream(), None);
        sender.add(Bytes::from_static(b"hello "));
        sender.add(Bytes::from_static(b"world"));
        sender.complete();

        let mut stream = body.into_stream().unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"hello "));
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"world"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn buffer_requests_everything() {
        let mut upstream = MockUpstream::new();
        upstream.expect_start().times(1).return_const(());
        upstream.expect_on_bytes_consumed().withf(|n| *n == u64::MAX).times(1).return_const(());
        upstream.expect_discard().never();

        let (mut body, mut sender) = channel(Arc::new(upstream), Some(4));
        let future = body.buffer();
        sender.add(Bytes::from_static(b"ab"));
        sender.add(Bytes::from_static(b"cd"));
        sender.complete();

        let buffered = future.await.unwrap();
        assert_eq!(buffered.into_bytes().unwrap(), Bytes::from_static(b"abcd"));
        assert_eq!(body.buffer().await.unwrap_err(), BodyError::AlreadyClaimed);
    }

    #[test]
    fn dropping_unconsumed_body_discards() {
        let mut upstream = MockUpstream::new();
        upstream.expect_discard().times(1).return_const(());
        let (body, _sender) = channel(Arc::new(upstream), None);
        drop(body);
    }

    #[test]
    fn split_after_attach_fails() {
        let (mut body, _sender) = channel(noop_upstream(), None);
        let _future = body.buffer();
        assert_eq!(body.split(SplitMode::Slowest).unwrap_err(), BodyError::AlreadyClaimed);
    }

    #[test]
    fn blocking_reader_reads_across_threads() {
        let (body, mut sender) = channel(noop_upstream(), None);
        let mut reader = body.into_reader().unwrap();

        let producer = std::thread::spawn(move || {
            for chunk in [&b"abc"[..], b"def", b"g"] {
                std::thread::sleep(std::time::Duration::from_millis(5));
                sender.add(Bytes::copy_from_slice(chunk));
            }
            sender.complete();
        });

        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        producer.join().unwrap();
        assert_eq!(content, "abcdefg");
    }

    #[test]
    fn blocking_reader_reports_failure() {
        let (body, sender) = channel(noop_upstream(), None);
        let mut reader = body.into_reader().unwrap();
        drop(sender);

        let mut buf = [0u8; 8];
        let error = reader.read(&mut buf).unwrap_err();
        assert!(error.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn multi_object_parts() {
        let (mut body, mut sender) = channel(noop_upstream(), None);
        let parts = body.to_multi_object().unwrap();
        assert!(body.is_claimed());

        sender.add(Bytes::from_static(b"ab"));
        sender.add(Bytes::new());
        sender.add(Bytes::from_static(b"cd"));
        sender.complete();

        let parts = parts.collect().await.unwrap();
        assert_eq!(parts, vec![BodyPart::Data(Bytes::from_static(b"ab")), BodyPart::Data(Bytes::from_static(b"cd"))]);
    }

    #[tokio::test]
    async fn form_fields_decode_while_streaming() {
        #[derive(serde::Deserialize)]
        struct Login {
            name: String,
            age: u8,
        }

        let (mut body, mut sender) = channel(noop_upstream(), None);
        let fields = body.to_form_fields().unwrap();
        sender.add(Bytes::from_static(b"name=za"));
        sender.add(Bytes::from_static(b"va&age=1"));
        sender.add(Bytes::from_static(b"8"));
        sender.complete();

        let value = fields.single_value().await.unwrap();
        let crate::protocol::body::SingleValue::Form(form) = value else { panic!("expected form") };
        assert_eq!(form.get("name"), Some("zava"));

        let login: Login = form.decode().unwrap();
        assert_eq!(login.name, "zava");
        assert_eq!(login.age, 18);
    }

    #[test]
    fn releasing_unconsumed_derived_body_discards() {
        let mut upstream = MockUpstream::new();
        upstream.expect_discard().times(1..).return_const(());
        let (mut body, _sender) = channel(Arc::new(upstream), None);

        let parts = body.to_multi_object().unwrap();
        drop(parts);
        drop(body);
    }
}
