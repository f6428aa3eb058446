use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid http status")]
    InvalidStatus,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("body size {size} exceed the limit {max_size}")]
    TooLargeBody { size: u64, max_size: u64 },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("unexpected message: {reason}")]
    UnexpectedMessage { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn too_large_body(size: u64, max_size: u64) -> Self {
        Self::TooLargeBody { size, max_size }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn unexpected_message<S: ToString>(str: S) -> Self {
        Self::UnexpectedMessage { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("connection closed before the message was written")]
    Closed,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Errors observed by body consumers.
///
/// `AlreadyClaimed` is the only kind raised for a second claim of the same body, whichever
/// operation attempted it, so callers can match on it to detect "body already consumed".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    #[error("body has already been claimed")]
    AlreadyClaimed,

    #[error("body has been discarded")]
    Discarded,

    #[error("body exceed the limit {max_size}")]
    TooLarge { max_size: u64 },

    #[error("connection closed before the body completed")]
    Closed,

    #[error("invalid form body: {reason}")]
    Form { reason: String },

    #[error("upstream error: {reason}")]
    Upstream { reason: String },
}

impl BodyError {
    pub fn form<S: ToString>(str: S) -> Self {
        Self::Form { reason: str.to_string() }
    }

    pub fn upstream<S: ToString>(str: S) -> Self {
        Self::Upstream { reason: str.to_string() }
    }
}

impl From<&ParseError> for BodyError {
    fn from(e: &ParseError) -> Self {
        match e {
            ParseError::TooLargeBody { max_size, .. } => BodyError::TooLarge { max_size: *max_size },
            e => BodyError::upstream(e),
        }
    }
}
