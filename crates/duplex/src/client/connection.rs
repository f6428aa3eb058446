use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::channel::oneshot;
use futures::future::poll_fn;
use futures::{FutureExt, StreamExt};
use http::header::EXPECT;
use http::{Request, Response, StatusCode, Version};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, trace, warn};

use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::config::ConnectionConfig;
use crate::connection::inbound::Inbound;
use crate::connection::outbound::{Outbound, OutgoingMessage, Written};
use crate::connection::owner::OwnerHandle;
use crate::protocol::body::{ByteBody, OutgoingBody};
use crate::protocol::{HttpError, Message, ParseError, PayloadSize, RequestHead, ResponseHead, SendError, is_keep_alive};

type ResponseResult = Result<Response<ByteBody>, HttpError>;

#[derive(Debug)]
struct Command {
    request: Request<OutgoingBody>,
    sender: oneshot::Sender<ResponseResult>,
}

/// Sends requests over a [`ClientConnection`]. Cheap to clone.
///
/// The connection finishes its pending work and stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct SendRequest {
    owner: OwnerHandle<Command>,
}

impl SendRequest {
    /// Queues `request` and returns the future of its response.
    ///
    /// The future fails with [`SendError::Closed`] when the connection ends before the response
    /// head arrives.
    pub fn send<B: Into<OutgoingBody>>(&self, request: Request<B>) -> ResponseFuture {
        let (sender, receiver) = oneshot::channel();
        let command = Command { request: request.map(Into::into), sender };
        if self.owner.submit(command).is_err() {
            debug!("connection already closed, request dropped");
        }
        ResponseFuture { receiver }
    }

    pub fn is_closed(&self) -> bool {
        self.owner.is_closed()
    }
}

/// Resolves to the response head with its streaming body.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct ResponseFuture {
    receiver: oneshot::Receiver<ResponseResult>,
}

impl Future for ResponseFuture {
    type Output = ResponseResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(self.receiver.poll_unpin(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(oneshot::Canceled) => Poll::Ready(Err(SendError::Closed.into())),
        }
    }
}

/// A request waiting for its final response.
struct Waiter {
    message_id: u64,
    sender: oneshot::Sender<ResponseResult>,
    /// Releases the held body of an `Expect: 100-continue` request.
    gate: Option<oneshot::Sender<bool>>,
}

enum Event {
    Written(Result<Written, SendError>),
    Command(Option<Command>),
    Read(Option<Result<Message<(ResponseHead, PayloadSize)>, ParseError>>),
    Demand,
}

/// The client half of a connection.
#[derive(Debug)]
pub struct ClientConnection<R, W> {
    framed_read: FramedRead<R, ResponseDecoder>,
    framed_write: FramedWrite<W, RequestEncoder>,
    config: ConnectionConfig,
    commands: futures::channel::mpsc::UnboundedReceiver<Command>,
}

impl<R, W> ClientConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn handshake(reader: R, writer: W, config: ConnectionConfig) -> (SendRequest, Self) {
        let (owner, commands) = OwnerHandle::channel();
        let mut framed_write = FramedWrite::new(writer, RequestEncoder::new());
        framed_write.set_backpressure_boundary(config.write_buffer_size);
        let connection = Self {
            framed_read: FramedRead::with_capacity(reader, ResponseDecoder::new(&config), config.read_buffer_size),
            framed_write,
            config,
            commands,
        };
        (SendRequest { owner }, connection)
    }

    /// Drives the connection until the server closes it, a response asks to close it, or every
    /// [`SendRequest`] is gone and all responses were delivered.
    pub async fn run(self) -> Result<(), HttpError> {
        let Self { mut framed_read, mut framed_write, config, mut commands } = self;

        let mut inbound = Inbound::new(&config);
        let notify = inbound.notify();
        let mut outbound = Outbound::<RequestHead>::new();
        let mut waiters: VecDeque<Waiter> = VecDeque::new();
        let mut next_message_id = 0u64;
        let mut commands_done = false;
        // no more requests go out, the connection ends after the current response
        let mut closing = false;

        loop {
            inbound.check_discard();

            if closing && inbound.is_idle() {
                debug!(unanswered = waiters.len(), "connection closing");
                break;
            }
            if commands_done && waiters.is_empty() && outbound.is_empty() && inbound.is_idle() {
                break;
            }

            let can_read = if inbound.is_idle() { !waiters.is_empty() } else { inbound.wants_read() };

            let event = select! {
                biased;
                written = poll_fn(|cx| outbound.poll_write(cx, &mut framed_write)), if !closing => Event::Written(written),
                command = commands.next(), if !commands_done && !closing => Event::Command(command),
                message = framed_read.next(), if can_read => Event::Read(message),
                () = notify.notified() => Event::Demand,
            };

            match event {
                Event::Written(Ok(written)) => {
                    trace!(message_id = written.message_id, "request written");
                    if written.close {
                        closing = true;
                    }
                }

                Event::Written(Err(e)) => {
                    error!(cause = %e, "failed to write request, closing connection");
                    return Err(e.into());
                }

                Event::Command(None) => commands_done = true,

                Event::Command(Some(Command { request, sender })) => {
                    let message_id = next_message_id;
                    next_message_id += 1;

                    let (parts, body) = request.into_parts();
                    let head = Request::from_parts(parts, ());
                    let mut message = OutgoingMessage::new(head, body);

                    let mut gate = None;
                    if expects_continue(&message.head) && !message.payload_size.is_empty() {
                        let (release, hold) = oneshot::channel();
                        message.gate = Some(hold);
                        gate = Some(release);
                    }

                    debug!(message_id, method = %message.head.method(), uri = %message.head.uri(), "sending request");
                    framed_read.decoder_mut().push_request_method(message.head.method().clone());
                    outbound.push(message_id, message);
                    waiters.push_back(Waiter { message_id, sender, gate });
                }

                Event::Read(Some(Ok(Message::Header((head, payload_size))))) => {
                    let Some(front) = waiters.front_mut() else {
                        return Err(ParseError::unexpected_message("response without a pending request").into());
                    };

                    if head.status().is_informational() && head.status() != StatusCode::SWITCHING_PROTOCOLS {
                        if head.status() == StatusCode::CONTINUE
                            && let Some(gate) = front.gate.take()
                        {
                            trace!(message_id = front.message_id, "100 continue received");
                            let _ = gate.send(true);
                        }
                        // the interim response has no body, its terminal item is swallowed
                        inbound.on_header(front.message_id, PayloadSize::Empty)?;
                        continue;
                    }

                    let Some(waiter) = waiters.pop_front() else {
                        continue;
                    };
                    if let Some(gate) = waiter.gate {
                        debug!(message_id = waiter.message_id, status = %head.status(), "final response before 100 continue");
                        let _ = gate.send(false);
                    }

                    let body = inbound.on_header(waiter.message_id, payload_size)?;
                    if !is_keep_alive(head.version(), head.headers()) || head.status() == StatusCode::SWITCHING_PROTOCOLS {
                        closing = true;
                    }
                    if waiter.sender.send(Ok(head.map(|()| body))).is_err() {
                        debug!(message_id = waiter.message_id, "response future dropped");
                    }
                }

                Event::Read(Some(Ok(Message::Payload(item)))) => inbound.on_payload(item)?,

                Event::Read(Some(Err(e))) => {
                    error!(cause = %e, "can't receive response, closing connection");
                    inbound.on_transport_closed();
                    return Err(e.into());
                }

                Event::Read(None) => {
                    if !waiters.is_empty() {
                        warn!(unanswered = waiters.len(), "server closed the connection");
                    }
                    inbound.on_transport_closed();
                    break;
                }

                Event::Demand => {}
            }
        }

        Ok(())
    }
}

fn expects_continue(head: &RequestHead) -> bool {
    head.version() != Version::HTTP_10
        && head.headers().get(EXPECT).is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
}
