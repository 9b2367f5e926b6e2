//! Outbound response sink.
//!
//! Every request gets one [`ResponseWriter`]. Handlers that take over delivery
//! write to it directly (and call [`Request::finalize`](crate::Request::finalize));
//! otherwise the dispatcher fills it from the pipeline's result. Once the
//! pipeline is done the server turns it into a hyper response.
//!
//! The status line is committed once. Header changes after that point are
//! ignored, the same way they would be on a socket that already sent them.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tokio::io::AsyncWrite;
use tracing::warn;

/// A header name or value that is not valid HTTP.
#[derive(Debug, thiserror::Error)]
#[error("invalid header `{name}`")]
pub struct InvalidHeader {
    name: String,
}

/// Buffers the status, headers and body of one response.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    headers: HeaderMap,
    status: Option<StatusCode>,
    status_writes: usize,
    body: Vec<u8>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn status(&self) -> Option<StatusCode> { self.status }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Whether the status line has been committed.
    pub fn is_committed(&self) -> bool {
        self.status.is_some()
    }

    /// How many times a status was written, including ignored repeats.
    pub fn status_writes(&self) -> usize {
        self.status_writes
    }

    /// Replaces every value of `name` with `value`.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), InvalidHeader> {
        let (name, value) = parse_header(name, value)?;
        self.insert_header(name, value);
        Ok(())
    }

    /// Appends `value` to the values of `name`.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<(), InvalidHeader> {
        let (name, value) = parse_header(name, value)?;
        if !self.is_committed() {
            self.headers.append(name, value);
        }
        Ok(())
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !self.is_committed() {
            self.headers.insert(name, value);
        }
    }

    /// Commits the status line. Only the first call takes effect.
    pub fn write_status(&mut self, status: StatusCode) {
        self.status_writes += 1;
        match self.status {
            None => self.status = Some(status),
            Some(sent) => warn!(sent = sent.as_u16(), ignored = status.as_u16(), "superfluous status write"),
        }
    }

    /// Appends body bytes, committing `200 OK` first if no status was written.
    pub fn write(&mut self, data: &[u8]) {
        if !self.is_committed() {
            self.write_status(StatusCode::OK);
        }
        self.body.extend_from_slice(data);
    }

    pub(crate) fn into_response(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), InvalidHeader> {
    let invalid = || InvalidHeader { name: name.to_owned() };
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
    let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
    Ok((name, value))
}

impl AsyncWrite for ResponseWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.get_mut().write(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
