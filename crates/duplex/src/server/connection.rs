use std::collections::HashMap;
use std::sync::Arc;
use std::task::Poll;

use bytes::Bytes;
use futures::future::poll_fn;
use futures::{SinkExt, StreamExt};
use http::header::{CONNECTION, CONTENT_LENGTH, SEC_WEBSOCKET_VERSION};
use http::{HeaderValue, Method, Response, StatusCode, Version};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::config::ConnectionConfig;
use crate::connection::inbound::Inbound;
use crate::connection::outbound::{Outbound, OutgoingMessage, Written};
use crate::connection::owner::OwnerHandle;
use crate::handler::Handler;
use crate::protocol::body::{BoxError, OutgoingBody};
use crate::protocol::{
    HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseHead, SendError, has_token, response_has_body,
    status_forbids_body,
};
use crate::server::continuation::ContinueTracker;
use crate::server::upgrade::{OnUpgrade, PendingUpgrade, Upgraded};

/// A server connection: decodes requests, runs the handler for each of them on its own task, and
/// writes the responses back in request order.
///
/// Requests may be pipelined up to [`ConnectionConfig::max_pipelined`]. All connection state
/// lives in the task running [`process`](Self::process); handler results come back to it through
/// a command channel.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
#[derive(Debug)]
pub struct ServerConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    config: ConnectionConfig,
}

/// What the connection remembers about a request until its response is prepared.
struct Exchange {
    method: Method,
    version: Version,
    keep_alive: bool,
    websocket: bool,
    upgrade: Option<PendingUpgrade>,
}

struct HandlerResult {
    message_id: u64,
    result: Result<Response<OutgoingBody>, BoxError>,
}

enum Event {
    Written(Result<Written, SendError>),
    Handled(HandlerResult),
    Read(Option<Result<Message<(RequestHeader, PayloadSize)>, ParseError>>),
    Demand,
}

enum Exit {
    Closed,
    Upgrade(PendingUpgrade),
}

impl<R, W> ServerConnection<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W, config: ConnectionConfig) -> Self {
        let mut framed_write = FramedWrite::new(writer, ResponseEncoder::new());
        framed_write.set_backpressure_boundary(config.write_buffer_size);
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(&config), config.read_buffer_size),
            framed_write,
            config,
        }
    }

    pub async fn process<H>(self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler + 'static,
    {
        let Self { mut framed_read, mut framed_write, config } = self;

        let mut inbound = Inbound::new(&config);
        let notify = inbound.notify();
        let mut outbound = Outbound::<ResponseHead>::new();
        let (owner, mut handled) = OwnerHandle::channel();
        let mut exchanges: HashMap<u64, Exchange> = HashMap::new();
        let mut continuation = ContinueTracker::default();
        let mut upgrading: Option<(u64, PendingUpgrade)> = None;
        let mut next_message_id = 0u64;
        let mut in_flight = 0usize;
        let mut read_closed = false;
        // cleared after a request that ends the connection or asks for an upgrade
        let mut accept_heads = true;
        let mut paused_for: Option<u64> = None;

        debug!("connection start");
        let exit = loop {
            inbound.check_discard();
            let expecting_next = continuation.pending_message().filter(|id| outbound.next_message_mut(*id).is_some());
            if let Some(message_id) = expecting_next
                && let Some(message) = outbound.next_message_mut(message_id)
            {
                // the response may stream the request body back: it gets to ask for data first
                poll_fn(|cx| {
                    message.body.poll_peek(cx);
                    Poll::Ready(())
                })
                .await;
            }
            if let Some(message_id) = continuation.poll(|id| inbound.is_demanded(id), in_flight) {
                send_continue(&mut framed_write).await?;
                info!(message_id, "sent 100 continue");
            }
            if let Some(message_id) = expecting_next
                && !upgrading.as_ref().is_some_and(|(id, _)| *id == message_id)
                && continuation.on_response(message_id)
                && let Some(message) = outbound.next_message_mut(message_id)
            {
                debug!(message_id, "responding before 100 continue, connection will close");
                message.close = true;
                message.head.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
            }

            let can_read =
                !read_closed && if inbound.is_idle() { accept_heads && in_flight < config.max_pipelined } else { inbound.wants_read() };

            let event = select! {
                biased;
                written = poll_fn(|cx| outbound.poll_write(cx, &mut framed_write)) => Event::Written(written),
                Some(result) = handled.next() => Event::Handled(result),
                message = framed_read.next(), if can_read => Event::Read(message),
                () = notify.notified() => Event::Demand,
            };

            match event {
                Event::Written(Ok(written)) => {
                    in_flight -= 1;
                    inbound.abandon(written.message_id);

                    if upgrading.as_ref().is_some_and(|(message_id, _)| *message_id == written.message_id)
                        && let Some((_, pending)) = upgrading.take()
                    {
                        break Exit::Upgrade(pending);
                    }
                    if written.close {
                        break Exit::Closed;
                    }
                    if paused_for == Some(written.message_id) {
                        paused_for = None;
                        accept_heads = true;
                    }
                }

                Event::Written(Err(e)) => {
                    error!(cause = %e, "failed to write response, closing connection");
                    return Err(e.into());
                }

                Event::Handled(HandlerResult { message_id, result }) => {
                    let Some(mut exchange) = exchanges.remove(&message_id) else {
                        warn!(message_id, "response for an unknown request");
                        continue;
                    };

                    let (message, upgrade) = prepare_response(&mut exchange, result);
                    if let Some(pending) = upgrade {
                        upgrading = Some((message_id, pending));
                    }
                    if outbound.fulfill(message_id, message).is_err() {
                        warn!(message_id, "no response slot reserved");
                    }
                }

                Event::Read(Some(Ok(Message::Header((header, payload_size))))) => {
                    let message_id = next_message_id;
                    next_message_id += 1;

                    let body = match inbound.on_header(message_id, payload_size) {
                        Ok(body) => body,
                        Err(e) => return fail(&mut framed_write, in_flight, e).await,
                    };

                    if header.expects_continue() && !payload_size.is_empty() {
                        continuation.expect(message_id);
                    }

                    let mut exchange = Exchange {
                        method: header.method().clone(),
                        version: header.version(),
                        keep_alive: header.keep_alive(),
                        websocket: header.is_websocket_upgrade(),
                        upgrade: None,
                    };
                    if !exchange.keep_alive {
                        accept_heads = false;
                    }

                    let wants_upgrade = header.wants_upgrade();
                    let mut request = header.body(body);
                    if wants_upgrade {
                        let (pending, on_upgrade) = OnUpgrade::pair();
                        request.extensions_mut().insert(on_upgrade);
                        exchange.upgrade = Some(pending);
                        if accept_heads {
                            accept_heads = false;
                            paused_for = Some(message_id);
                        }
                    }

                    debug!(message_id, method = %exchange.method, uri = %request.uri(), "request received");
                    exchanges.insert(message_id, exchange);
                    outbound.reserve(message_id);
                    in_flight += 1;

                    let handler = Arc::clone(&handler);
                    let owner = owner.clone();
                    tokio::spawn(async move {
                        let result = handler.call(request).await.map(|response| response.map(Into::into)).map_err(Into::into);
                        if owner.submit(HandlerResult { message_id, result }).is_err() {
                            debug!(message_id, "connection closed before the response was ready");
                        }
                    });
                }

                Event::Read(Some(Ok(Message::Payload(item)))) => {
                    let current = inbound.current_message();
                    let terminal = item.is_terminal();
                    if let Err(e) = inbound.on_payload(item) {
                        return fail(&mut framed_write, in_flight, e).await;
                    }
                    if terminal && let Some(message_id) = current {
                        continuation.on_body_end(message_id);
                    }
                }

                Event::Read(Some(Err(e))) => {
                    inbound.on_transport_closed();
                    return fail(&mut framed_write, in_flight, e).await;
                }

                Event::Read(None) => {
                    debug!(in_flight, "peer closed its side");
                    read_closed = true;
                    inbound.on_transport_closed();
                }

                Event::Demand => {}
            }

            if read_closed && in_flight == 0 {
                break Exit::Closed;
            }
        };

        match exit {
            Exit::Closed => {
                info!("connection shutdown");
                Ok(())
            }
            Exit::Upgrade(pending) => {
                let read_buf = framed_read.read_buffer_mut().split();
                let upgraded = Upgraded {
                    reader: Box::new(framed_read.into_inner()),
                    writer: Box::new(framed_write.into_inner()),
                    read_buf,
                };
                info!("connection upgraded");
                if pending.send(upgraded).is_err() {
                    debug!("upgrade receiver dropped");
                }
                Ok(())
            }
        }
    }
}

/// Turns a handler result into the message to write, applying persistence and upgrade rules.
fn prepare_response(
    exchange: &mut Exchange,
    result: Result<Response<OutgoingBody>, BoxError>,
) -> (OutgoingMessage<ResponseHead>, Option<PendingUpgrade>) {
    let response = result.unwrap_or_else(|e| {
        error!(cause = %e, "handler failed");
        status_response(StatusCode::INTERNAL_SERVER_ERROR)
    });
    let (mut parts, mut body) = response.into_parts();
    parts.version = exchange.version;

    let mut upgrade = None;
    if parts.status == StatusCode::SWITCHING_PROTOCOLS {
        match exchange.upgrade.take() {
            Some(pending) if exchange.websocket => upgrade = Some(pending),
            _ => {
                warn!("upgrade handshake rejected");
                let (rejected, empty) = upgrade_required().into_parts();
                parts = rejected;
                parts.version = exchange.version;
                body = empty;
            }
        }
    }
    // dropping an unused upgrade declines it
    exchange.upgrade = None;

    let mut payload_size = body.payload_size();
    if !response_has_body(&exchange.method, parts.status) {
        if exchange.method == Method::HEAD
            && !status_forbids_body(parts.status)
            && !parts.headers.contains_key(CONTENT_LENGTH)
            && let Some(length) = payload_size.exact_length()
        {
            parts.headers.insert(CONTENT_LENGTH, length.into());
        }
        body = OutgoingBody::empty();
        payload_size = PayloadSize::Empty;
    }

    let mut close = !exchange.keep_alive || has_token(&parts.headers, CONNECTION, "close");
    if payload_size.is_chunked() && exchange.version == Version::HTTP_10 {
        payload_size = PayloadSize::UntilClose;
        close = true;
    }

    if upgrade.is_none() {
        if close {
            parts.headers.insert(CONNECTION, HeaderValue::from_static("close"));
        } else if exchange.version == Version::HTTP_10 {
            parts.headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }
    }

    let message = OutgoingMessage { head: Response::from_parts(parts, ()), payload_size, body, close, gate: None };
    (message, upgrade)
}

fn status_response(status: StatusCode) -> Response<OutgoingBody> {
    let mut response = Response::new(OutgoingBody::empty());
    *response.status_mut() = status;
    response
}

fn upgrade_required() -> Response<OutgoingBody> {
    let mut response = status_response(StatusCode::UPGRADE_REQUIRED);
    response.headers_mut().insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
    response
}

async fn send_continue<W: AsyncWrite + Unpin>(framed_write: &mut FramedWrite<W, ResponseEncoder>) -> Result<(), SendError> {
    let mut head = Response::new(());
    *head.status_mut() = StatusCode::CONTINUE;
    framed_write.send(Message::<_, Bytes>::Header((head, PayloadSize::Empty))).await
}

/// Answers a protocol error with a closing error response when no other response is owed, then
/// reports the error.
async fn fail<W: AsyncWrite + Unpin>(framed_write: &mut FramedWrite<W, ResponseEncoder>, in_flight: usize, e: ParseError) -> Result<(), HttpError> {
    error!(cause = %e, "can't receive next request, closing connection");
    if in_flight == 0 {
        let status = match e {
            ParseError::TooLargeBody { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ParseError::TooLargeHeader { .. } | ParseError::TooManyHeaders { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        let mut head = Response::new(());
        *head.status_mut() = status;
        head.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
        framed_write.feed(Message::<_, Bytes>::Header((head, PayloadSize::Empty))).await?;
        framed_write.send(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Eof)).await?;
    }
    Err(e.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::make_handler;
    use crate::protocol::body::ByteBody;
    use crate::server::UpgradeError;
    use http::Request;
    use indoc::indoc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    fn serve<H: Handler + 'static>(handler: H, config: ConnectionConfig) -> (DuplexStream, JoinHandle<Result<(), HttpError>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let task = tokio::spawn(ServerConnection::new(reader, writer, config).process(Arc::new(handler)));
        (client, task)
    }

    async fn read_all(client: &mut DuplexStream) -> String {
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn read_until(client: &mut DuplexStream, pattern: &str) -> String {
        let mut received = Vec::new();
        let mut buf = [0; 1024];
        while !String::from_utf8_lossy(&received).contains(pattern) {
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "closed before {pattern:?}: {}", String::from_utf8_lossy(&received));
            received.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(received).unwrap()
    }

    async fn exchange(client: &mut DuplexStream, requests: &str) -> String {
        client.write_all(requests.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();
        read_all(client).await
    }

    fn echo_path() -> impl Handler + 'static {
        make_handler(|request: Request<ByteBody>| async move {
            if request.uri().path() == "/slow" {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok::<_, BoxError>(Response::new(request.uri().path().to_string()))
        })
    }

    #[tokio::test]
    async fn pipelined_responses_keep_request_order() {
        let (mut client, task) = serve(echo_path(), ConnectionConfig::default());

        let requests = indoc! {"
            GET /slow HTTP/1.1\r
            Host: localhost\r
            \r
            GET /fast HTTP/1.1\r
            Host: localhost\r
            \r
        "};
        let response = exchange(&mut client, requests).await;

        let slow = response.find("/slow").unwrap();
        let fast = response.find("/fast").unwrap();
        assert!(slow < fast, "{response}");
        assert_eq!(response.matches("HTTP/1.1 200 OK").count(), 2);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unread_body_is_skipped_for_next_request() {
        let (mut client, task) = serve(echo_path(), ConnectionConfig::default());

        let requests = "POST /upload HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET /next HTTP/1.1\r\n\r\n";
        let response = exchange(&mut client, requests).await;

        assert!(response.find("/upload").unwrap() < response.find("/next").unwrap());
        assert!(!response.contains("hello"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn continue_sent_once_the_body_is_read() {
        let handler = make_handler(|request: Request<ByteBody>| async move {
            let mut body = request.into_body();
            let bytes = body.buffer().await?.into_bytes()?;
            Ok::<_, BoxError>(Response::new(bytes))
        });
        let (mut client, task) = serve(handler, ConnectionConfig::default());

        client
            .write_all(b"POST /upload HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 5\r\n\r\n")
            .await
            .unwrap();
        let expected = b"HTTP/1.1 100 Continue\r\n\r\n";
        let mut interim = vec![0; expected.len()];
        client.read_exact(&mut interim).await.unwrap();
        assert_eq!(&interim[..], &expected[..]);

        let response = exchange(&mut client, "hello").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("\r\n\r\nhello"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn continue_sent_before_streaming_the_body_back() {
        let handler = make_handler(|request: Request<ByteBody>| async move { Ok::<_, BoxError>(Response::new(request.into_body())) });
        let (mut client, task) = serve(handler, ConnectionConfig::default());

        client
            .write_all(b"POST /echo HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 5\r\n\r\n")
            .await
            .unwrap();
        let expected = b"HTTP/1.1 100 Continue\r\n\r\n";
        let mut interim = vec![0; expected.len()];
        client.read_exact(&mut interim).await.unwrap();
        assert_eq!(&interim[..], &expected[..]);

        let response = exchange(&mut client, "hello").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.contains("content-length: 5\r\n"));
        assert!(!response.contains("connection: close"));
        assert!(response.ends_with("\r\n\r\nhello"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn continue_deferred_behind_earlier_response() {
        let handler = make_handler(|request: Request<ByteBody>| async move {
            if request.uri().path() == "/slow" {
                tokio::time::sleep(Duration::from_millis(50)).await;
                return Ok::<_, BoxError>(Response::new(Bytes::from_static(b"/slow")));
            }
            let bytes = request.into_body().buffer().await?.into_bytes()?;
            Ok(Response::new(bytes))
        });
        let (mut client, task) = serve(handler, ConnectionConfig::default());

        let requests = indoc! {"
            GET /slow HTTP/1.1\r
            \r
            POST /upload HTTP/1.1\r
            Expect: 100-continue\r
            Content-Length: 5\r
            \r
        "};
        client.write_all(requests.as_bytes()).await.unwrap();
        let received = read_until(&mut client, "HTTP/1.1 100 Continue\r\n\r\n").await;
        assert!(received.find("/slow").unwrap() < received.find("100 Continue").unwrap(), "{received}");

        let rest = exchange(&mut client, "hello").await;
        assert!(rest.starts_with("HTTP/1.1 200 OK\r\n"), "{rest}");
        assert!(rest.ends_with("\r\n\r\nhello"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn response_before_continue_closes_connection() {
        let handler = make_handler(|_request: Request<ByteBody>| async move {
            let mut response = Response::new("too big");
            *response.status_mut() = StatusCode::EXPECTATION_FAILED;
            Ok::<_, BoxError>(response)
        });
        let (mut client, task) = serve(handler, ConnectionConfig::default());

        client
            .write_all(b"PUT /file HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 1000\r\n\r\n")
            .await
            .unwrap();
        // the server closes without waiting for the body
        let response = read_all(&mut client).await;

        assert!(response.starts_with("HTTP/1.1 417 Expectation Failed\r\n"));
        assert!(response.contains("connection: close\r\n"));
        assert!(!response.contains("100 Continue"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn http10_without_keep_alive_closes() {
        let (mut client, task) = serve(echo_path(), ConnectionConfig::default());

        client.write_all(b"GET /old HTTP/1.0\r\n\r\n").await.unwrap();
        let response = read_all(&mut client).await;

        assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(response.contains("connection: close\r\n"));
        assert!(response.ends_with("/old"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn http10_keep_alive_is_echoed() {
        let (mut client, task) = serve(echo_path(), ConnectionConfig::default());

        let response = exchange(&mut client, "GET /a HTTP/1.0\r\nConnection: keep-alive\r\n\r\nGET /b HTTP/1.0\r\n\r\n").await;

        assert_eq!(response.matches("connection: keep-alive\r\n").count(), 1);
        assert_eq!(response.matches("connection: close\r\n").count(), 1);
        assert!(response.ends_with("/b"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn oversized_body_answered_with_413() {
        let config = ConnectionConfig::builder().max_body_size(Some(4)).build();
        let (mut client, task) = serve(echo_path(), config);

        client.write_all(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n").await.unwrap();
        let response = read_all(&mut client).await;

        assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert!(matches!(task.await.unwrap(), Err(HttpError::RequestError { source: ParseError::TooLargeBody { .. } })));
    }

    #[tokio::test]
    async fn websocket_upgrade_hands_over_the_transport() {
        let handler = make_handler(|mut request: Request<ByteBody>| async move {
            let on_upgrade = request.extensions_mut().remove::<OnUpgrade>().ok_or("no upgrade")?;
            tokio::spawn(async move {
                let mut upgraded = on_upgrade.upgraded().await.unwrap();
                let mut data = upgraded.read_buf.to_vec();
                while data.len() < 4 {
                    let mut buf = [0; 16];
                    let n = upgraded.reader.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    data.extend_from_slice(&buf[..n]);
                }
                upgraded.writer.write_all(&data.to_ascii_uppercase()).await.unwrap();
                upgraded.writer.shutdown().await.unwrap();
            });

            let response = Response::builder()
                .status(StatusCode::SWITCHING_PROTOCOLS)
                .header(http::header::UPGRADE, "websocket")
                .header(CONNECTION, "Upgrade")
                .body(())?;
            Ok::<_, BoxError>(response)
        });
        let (mut client, task) = serve(handler, ConnectionConfig::default());

        let handshake = indoc! {"
            GET /chat HTTP/1.1\r
            Host: localhost\r
            Connection: Upgrade\r
            Upgrade: websocket\r
            Sec-WebSocket-Version: 13\r
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r
            \r
            ping"};
        client.write_all(handshake.as_bytes()).await.unwrap();
        let response = read_all(&mut client).await;

        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(!response.contains("content-length"));
        assert!(response.ends_with("\r\n\r\nPING"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unsupported_upgrade_answered_with_426() {
        let slot = Arc::new(parking_lot::Mutex::new(None));
        let handler = {
            let slot = Arc::clone(&slot);
            make_handler(move |mut request: Request<ByteBody>| {
                let slot = Arc::clone(&slot);
                async move {
                    let mut response = Response::new(());
                    if let Some(on_upgrade) = request.extensions_mut().remove::<OnUpgrade>() {
                        *slot.lock() = Some(on_upgrade);
                        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
                    }
                    Ok::<_, BoxError>(response)
                }
            })
        };
        let (mut client, task) = serve(handler, ConnectionConfig::default());

        let handshake = indoc! {"
            GET /chat HTTP/1.1\r
            Connection: Upgrade\r
            Upgrade: websocket\r
            Sec-WebSocket-Version: 8\r
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r
            \r
            GET /after HTTP/1.1\r
            \r
        "};
        let response = exchange(&mut client, handshake).await;

        assert!(response.starts_with("HTTP/1.1 426 Upgrade Required\r\n"));
        assert!(response.contains("sec-websocket-version: 13\r\n"));
        assert!(!response.contains("HTTP/1.1 101"));
        assert!(response.find("426").unwrap() < response.find("HTTP/1.1 200 OK").unwrap());
        task.await.unwrap().unwrap();

        let on_upgrade = slot.lock().take().unwrap();
        assert_eq!(on_upgrade.upgraded().await.unwrap_err(), UpgradeError::Declined);
    }
}
