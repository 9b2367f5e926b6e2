//! Response bodies and the [`Response`] envelope.
//!
//! A handler's successful result is either a full [`Response`] (status,
//! headers and content) or bare [`Content`], which is sent as `200 OK`.
//! [`Content`] is a closed set of body shapes; the entity encoder has exactly
//! one arm for each.

use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::writer::ResponseWriter;

/// Header name / value pairs, applied in order.
pub type Headers = Vec<(String, String)>;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Entity::bytes`] and [`Entity::reader`].
pub enum ContentType {
    Csv,          // text/csv
    Html,         // text/html
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Text,         // text/plain
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::Html        => "text/html",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain",
            Self::Xml         => "application/xml",
        }
    }
}

impl From<ContentType> for String {
    fn from(ct: ContentType) -> String {
        ct.as_str().to_owned()
    }
}

// ── Entity ────────────────────────────────────────────────────────────────────

/// A content-typed byte stream, read once when the response is encoded.
pub struct Entity {
    content_type: String,
    source: Source,
}

enum Source {
    Buffer(Bytes),
    Reader(Pin<Box<dyn AsyncRead + Send>>),
}

impl Entity {
    /// An in-memory entity.
    pub fn bytes(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self { content_type: content_type.into(), source: Source::Buffer(body.into()) }
    }

    /// An entity that passes through whatever `reader` yields.
    ///
    /// The response is buffered: `reader` is drained to EOF before anything
    /// reaches the client, so it must be finite. Endless streams such as
    /// server-sent events are not supported.
    pub fn reader<R>(content_type: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self { content_type: content_type.into(), source: Source::Reader(Box::pin(reader)) }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Streams the entity into `w`, returning the number of bytes copied.
    pub(crate) async fn copy_to(self, w: &mut ResponseWriter) -> io::Result<u64> {
        match self.source {
            Source::Buffer(bytes) => {
                w.write(&bytes);
                Ok(bytes.len() as u64)
            }
            Source::Reader(mut reader) => tokio::io::copy(&mut reader, w).await,
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Buffer(b) => format!("{} bytes", b.len()),
            Source::Reader(_) => "reader".to_owned(),
        };
        f.debug_struct("Entity")
            .field("content_type", &self.content_type)
            .field("source", &source)
            .finish()
    }
}

// ── Content ───────────────────────────────────────────────────────────────────

/// A value that can be marshaled to JSON.
///
/// Implemented for every `Serialize` type; exists so [`Content`] can hold
/// arbitrary values behind one trait object.
pub trait Structured: Send + Sync {
    fn to_json(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T: Serialize + Send + Sync> Structured for T {
    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// The body of a response.
pub enum Content {
    /// No body; only the status line is written.
    Empty,
    /// Nothing is written, not even the status.
    #[deprecated(note = "call `Request::finalize` and write to the `ResponseWriter` directly")]
    Suppressed,
    /// Streamed verbatim with the entity's content type.
    Entity(Entity),
    /// JSON that is already encoded.
    Json(Bytes),
    /// Marshaled to JSON when the response is encoded.
    Structured(Box<dyn Structured>),
}

impl Content {
    pub fn json<T: Serialize + Send + Sync + 'static>(value: T) -> Self {
        Self::Structured(Box::new(value))
    }

    pub fn raw_json(bytes: impl Into<Bytes>) -> Self {
        Self::Json(bytes.into())
    }
}

impl From<Entity> for Content {
    fn from(e: Entity) -> Self {
        Self::Entity(e)
    }
}

impl fmt::Debug for Content {
    #[allow(deprecated)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty         => f.write_str("Empty"),
            Self::Suppressed    => f.write_str("Suppressed"),
            Self::Entity(e)     => f.debug_tuple("Entity").field(e).finish(),
            Self::Json(b)       => write!(f, "Json({} bytes)", b.len()),
            Self::Structured(_) => f.write_str("Structured"),
        }
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// A status, headers and content, sent verbatim by the dispatcher.
///
/// ```rust
/// use restline::StatusCode;
/// use restline::{Content, ContentType, Entity, Response};
///
/// Response::new(StatusCode::CREATED, Content::json(vec![1, 2, 3]))
///     .header("location", "/items/3");
///
/// Response::new(StatusCode::OK, Entity::bytes(ContentType::Xml, "<ok/>"));
///
/// Response::redirect("/login");
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    content: Content,
}

impl Response {
    pub fn new(status: StatusCode, content: impl Into<Content>) -> Self {
        Self { status, headers: Vec::new(), content: content.into() }
    }

    /// `200 OK` with `content`.
    pub fn ok(content: impl Into<Content>) -> Self {
        Self::new(StatusCode::OK, content)
    }

    /// `302 Found` pointing at `location`, with no body.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::new(StatusCode::FOUND, Content::Empty).header("location", location)
    }

    /// Sets a header, replacing any earlier value for the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn content(&self) -> &Content { &self.content }

    pub fn into_parts(self) -> (StatusCode, Headers, Content) {
        (self.status, self.headers, self.content)
    }
}

/// A successful pipeline result.
#[derive(Debug)]
pub enum Reply {
    Response(Response),
    Content(Content),
}

impl From<Response> for Reply {
    fn from(r: Response) -> Self { Self::Response(r) }
}

impl From<Content> for Reply {
    fn from(c: Content) -> Self { Self::Content(c) }
}

impl From<Entity> for Reply {
    fn from(e: Entity) -> Self { Self::Content(Content::Entity(e)) }
}
