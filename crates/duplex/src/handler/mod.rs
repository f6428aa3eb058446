//! Request handler traits and utilities.
//!
//! A [`Handler`] receives a request whose body is a [`ByteBody`] and produces a response whose
//! body converts into an [`OutgoingBody`]. [`make_handler`] turns an async function into one.
//!
//! # Example
//!
//! ```no_run
//! use http::{Request, Response};
//! use micro_duplex::handler::make_handler;
//! use micro_duplex::protocol::body::{BoxError, ByteBody};
//!
//! async fn echo(request: Request<ByteBody>) -> Result<Response<ByteBody>, BoxError> {
//!     Ok(Response::new(request.into_body()))
//! }
//!
//! let handler = make_handler(echo);
//! ```

use std::future::Future;

use async_trait::async_trait;
use http::{Request, Response};

use crate::protocol::body::{BoxError, ByteBody, OutgoingBody};

#[async_trait]
pub trait Handler: Send + Sync {
    type RespBody: Into<OutgoingBody> + Send;
    type Error: Into<BoxError> + Send;

    async fn call(&self, req: Request<ByteBody>) -> Result<Response<Self::RespBody>, Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<RespBody, Err, F, Fut> Handler for HandlerFn<F>
where
    RespBody: Into<OutgoingBody> + Send,
    Err: Into<BoxError> + Send,
    F: Fn(Request<ByteBody>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send,
{
    type RespBody = RespBody;
    type Error = Err;

    async fn call(&self, req: Request<ByteBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        (self.f)(req).await
    }
}

pub fn make_handler<F, RespBody, Err, Ret>(f: F) -> HandlerFn<F>
where
    RespBody: Into<OutgoingBody>,
    Err: Into<BoxError>,
    Ret: Future<Output = Result<Response<RespBody>, Err>>,
    F: Fn(Request<ByteBody>) -> Ret,
{
    HandlerFn { f }
}
