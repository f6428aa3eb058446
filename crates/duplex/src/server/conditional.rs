//! Conditional and partial responses for file-like resources.
//!
//! [`plan_file_response`] looks at `If-Modified-Since` and `Range` and decides between a
//! `304 Not Modified`, a full `200` and a single-range `206`. Range handling is
//! narrow: unit `bytes`, one `start-end` range inside the resource, `GET` only. Anything else,
//! including open, suffix, reversed and out-of-bounds ranges, falls back to the full resource
//! without an error.

use std::ops::Range;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, IF_MODIFIED_SINCE, LAST_MODIFIED, RANGE};
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode};
use tracing::trace;

/// What a file responder knows about the resource it serves.
pub trait FileMetadata {
    fn length(&self) -> u64;

    fn last_modified(&self) -> Option<SystemTime>;
}

impl FileMetadata for std::fs::Metadata {
    fn length(&self) -> u64 {
        self.len()
    }

    fn last_modified(&self) -> Option<SystemTime> {
        self.modified().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileResponsePlan {
    /// The client copy is current, no body is written.
    NotModified { last_modified: Option<SystemTime> },

    Full { length: u64, last_modified: Option<SystemTime> },

    Partial { start: u64, length: u64, total: u64, last_modified: Option<SystemTime> },
}

/// Decides how to answer `method` with `request_headers` for `file`.
pub fn plan_file_response<F: FileMetadata + ?Sized>(method: &Method, request_headers: &HeaderMap, file: &F) -> FileResponsePlan {
    let total = file.length();
    let last_modified = file.last_modified();

    if (method == Method::GET || method == Method::HEAD)
        && let Some(last_modified) = last_modified
        && let Some(since) = request_headers.get(IF_MODIFIED_SINCE).and_then(|v| v.to_str().ok())
        && let Ok(since) = httpdate::parse_http_date(since)
        && unix_seconds(since) == unix_seconds(last_modified)
    {
        trace!("resource not modified");
        return FileResponsePlan::NotModified { last_modified: Some(last_modified) };
    }

    if method == Method::GET
        && let Some(range) = request_headers.get(RANGE).and_then(|v| v.to_str().ok()).and_then(|v| parse_range(v, total))
    {
        return FileResponsePlan::Partial { start: range.start, length: range.end - range.start, total, last_modified };
    }

    FileResponsePlan::Full { length: total, last_modified }
}

impl FileResponsePlan {
    pub fn status(&self) -> StatusCode {
        match self {
            FileResponsePlan::NotModified { .. } => StatusCode::NOT_MODIFIED,
            FileResponsePlan::Full { .. } => StatusCode::OK,
            FileResponsePlan::Partial { .. } => StatusCode::PARTIAL_CONTENT,
        }
    }

    /// Byte range of the resource to send, `None` for no body.
    pub fn byte_range(&self) -> Option<Range<u64>> {
        match *self {
            FileResponsePlan::NotModified { .. } => None,
            FileResponsePlan::Full { length, .. } => Some(0..length),
            FileResponsePlan::Partial { start, length, .. } => Some(start..start + length),
        }
    }

    /// Sets status and the metadata headers on `response`.
    pub fn apply<B>(&self, response: &mut Response<B>) {
        *response.status_mut() = self.status();
        let headers = response.headers_mut();

        let last_modified = match *self {
            FileResponsePlan::NotModified { last_modified }
            | FileResponsePlan::Full { last_modified, .. }
            | FileResponsePlan::Partial { last_modified, .. } => last_modified,
        };
        if let Some(last_modified) = last_modified
            && let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(last_modified))
        {
            headers.insert(LAST_MODIFIED, value);
        }

        match *self {
            FileResponsePlan::NotModified { .. } => {
                headers.remove(CONTENT_LENGTH);
            }
            FileResponsePlan::Full { length, .. } => {
                headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
                headers.insert(CONTENT_LENGTH, length.into());
            }
            FileResponsePlan::Partial { start, length, total, .. } => {
                headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
                headers.insert(CONTENT_LENGTH, length.into());
                let content_range = format!("bytes {}-{}/{}", start, start + length - 1, total);
                if let Ok(value) = HeaderValue::from_str(&content_range) {
                    headers.insert(CONTENT_RANGE, value);
                }
            }
        }
    }
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs()
}

/// A single `bytes=start-end` range within the resource, returned end exclusive.
fn parse_range(value: &str, total: u64) -> Option<Range<u64>> {
    let spec = value.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }

    let (start, end) = spec.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = end.trim().parse::<u64>().ok()?;
    (start <= end && end < total).then_some(start..end + 1)
}
