use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use http::{Request, Response, StatusCode};
use micro_duplex::config::ConnectionConfig;
use micro_duplex::handler::Handler;
use micro_duplex::protocol::body::{BoxError, ByteBody, OutgoingBody, SplitMode};
use micro_duplex::protocol::is_form_urlencoded;
use micro_duplex::server::{FileMetadata, ServerConnection, plan_file_response};
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(port = 8080, "start listening");
    let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let handler = Arc::new(DemoHandler { started: SystemTime::now() });
    let config = ConnectionConfig::builder().max_body_size(Some(1024 * 1024)).build();
    loop {
        let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let handler = Arc::clone(&handler);
        let config = config.clone();
        tokio::spawn(async move {
            let (reader, writer) = tcp_stream.into_split();
            let connection = ServerConnection::new(reader, writer, config);
            match connection.process(handler).await {
                Ok(()) => info!(%remote_addr, "finished process, connection shutdown"),
                Err(e) => error!(%remote_addr, cause = %e, "service has error, connection shutdown"),
            }
        });
    }
}

const PAGE: &str = "Hello World!\r\n";

struct DemoHandler {
    started: SystemTime,
}

struct Page<'a>(&'a DemoHandler);

impl FileMetadata for Page<'_> {
    fn length(&self) -> u64 {
        PAGE.len() as u64
    }

    fn last_modified(&self) -> Option<SystemTime> {
        Some(self.0.started)
    }
}

#[async_trait]
impl Handler for DemoHandler {
    type RespBody = OutgoingBody;
    type Error = BoxError;

    async fn call(&self, request: Request<ByteBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        let (parts, mut body) = request.into_parts();
        info!(method = %parts.method, path = parts.uri.path(), "request");

        match parts.uri.path() {
            // streams the request body back while counting it on a second branch
            "/echo" => {
                let mut counted = body.split(SplitMode::Slowest)?;
                tokio::spawn(async move {
                    match counted.buffer().await {
                        Ok(bytes) => info!(length = bytes.length(), "echo body received"),
                        Err(e) => warn!(cause = %e, "echo body failed"),
                    }
                });
                Ok(Response::new(body.into()))
            }

            "/form" if is_form_urlencoded(&parts.headers) => {
                let fields: HashMap<String, String> = body.decode_form().await?;
                let mut names: Vec<_> = fields.keys().cloned().collect();
                names.sort();
                Ok(Response::new(OutgoingBody::full(names.join(","))))
            }

            "/page" => {
                let plan = plan_file_response(&parts.method, &parts.headers, &Page(self));
                let content = plan
                    .byte_range()
                    .and_then(|range| PAGE.get(usize::try_from(range.start).ok()?..usize::try_from(range.end).ok()?))
                    .unwrap_or_default();
                let mut response = Response::new(OutgoingBody::full(content));
                plan.apply(&mut response);
                Ok(response)
            }

            _ => {
                let mut response = Response::new(OutgoingBody::empty());
                *response.status_mut() = StatusCode::NOT_FOUND;
                Ok(response)
            }
        }
    }
}
