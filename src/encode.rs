//! Entity encoding: turning a status and [`Content`] into bytes on the writer.
//!
//! [`EntityEncoder`] is the single seam a host can replace. The dispatcher
//! applies response headers before calling it; the encoder decides the
//! content type, commits the status and writes the body.

use std::io;

use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode, Uri};

use crate::entity::Content;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::writer::{InvalidHeader, ResponseWriter};

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("could not write entity: {source}; in response to: {method} {uri}; {written} bytes written")]
    Write {
        method: Method,
        uri: Uri,
        written: usize,
        #[source]
        source: io::Error,
    },
    #[error("could not marshal entity: {source}; in response to: {method} {uri}")]
    Marshal {
        method: Method,
        uri: Uri,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Header(#[from] InvalidHeader),
}

/// Writes a response body.
pub trait EntityEncoder: Send + Sync + 'static {
    fn encode<'a>(
        &'a self,
        w: &'a mut ResponseWriter,
        req: &'a Request,
        status: StatusCode,
        content: Content,
    ) -> BoxFuture<'a, Result<(), EncodeError>>;
}

/// JSON for values, verbatim bytes for entities.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultEncoder;

impl EntityEncoder for DefaultEncoder {
    fn encode<'a>(
        &'a self,
        w: &'a mut ResponseWriter,
        req: &'a Request,
        status: StatusCode,
        content: Content,
    ) -> BoxFuture<'a, Result<(), EncodeError>> {
        Box::pin(encode(w, req, status, content))
    }
}

/// The default encoding, usable from custom encoders that only want to
/// handle some shapes themselves.
///
/// A value that fails to marshal, or an entity whose content type is not a
/// valid header value, commits `500 Internal Server Error` whatever `status`
/// was. A failure after the status is committed cannot
/// change it; the error is returned for the caller to report.
pub async fn encode(
    w: &mut ResponseWriter,
    req: &Request,
    status: StatusCode,
    content: Content,
) -> Result<(), EncodeError> {
    #[allow(deprecated)]
    match content {
        Content::Empty => w.write_status(status),

        Content::Suppressed => {}

        Content::Entity(entity) => {
            if let Err(e) = w.set_header(CONTENT_TYPE.as_str(), entity.content_type()) {
                w.write_status(StatusCode::INTERNAL_SERVER_ERROR);
                return Err(e.into());
            }
            w.write_status(status);
            let before = w.body().len();
            entity.copy_to(w).await.map_err(|source| EncodeError::Write {
                method: req.method().clone(),
                uri: req.uri().clone(),
                written: w.body().len() - before,
                source,
            })?;
        }

        Content::Json(bytes) => {
            w.insert_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            w.write_status(status);
            w.write(&bytes);
        }

        Content::Structured(value) => {
            let data = match value.to_json() {
                Ok(data) => data,
                Err(source) => {
                    w.write_status(StatusCode::INTERNAL_SERVER_ERROR);
                    return Err(EncodeError::Marshal {
                        method: req.method().clone(),
                        uri: req.uri().clone(),
                        source,
                    });
                }
            };
            w.insert_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            w.write_status(status);
            w.write(&data);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use bytes::Bytes;
    use tokio::io::{AsyncRead, ReadBuf};

    use super::*;
    use crate::entity::{ContentType, Entity};

    fn request() -> Request {
        Request::new(http::Request::builder().uri("/things").body(Bytes::new()).unwrap(), None)
    }

    async fn run(status: StatusCode, content: Content) -> (ResponseWriter, Result<(), EncodeError>) {
        let mut w = ResponseWriter::new();
        let result = DefaultEncoder.encode(&mut w, &request(), status, content).await;
        (w, result)
    }

    #[tokio::test]
    async fn empty_writes_status_only() {
        let (w, result) = run(StatusCode::NO_CONTENT, Content::Empty).await;
        result.unwrap();
        assert_eq!(w.status(), Some(StatusCode::NO_CONTENT));
        assert!(w.body().is_empty());
        assert!(w.headers().get(CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    #[allow(deprecated)]
    async fn suppressed_writes_nothing() {
        let (w, result) = run(StatusCode::OK, Content::Suppressed).await;
        result.unwrap();
        assert_eq!(w.status_writes(), 0);
    }

    #[tokio::test]
    async fn entity_is_streamed_with_its_content_type() {
        let entity = Entity::bytes(ContentType::Text, "hello");
        let (w, result) = run(StatusCode::ACCEPTED, entity.into()).await;
        result.unwrap();
        assert_eq!(w.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(w.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(w.body(), b"hello");
    }

    #[tokio::test]
    async fn raw_json_is_written_verbatim() {
        let (w, result) = run(StatusCode::OK, Content::raw_json(r#"{"a": 1}"#)).await;
        result.unwrap();
        assert_eq!(w.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(w.body(), br#"{"a": 1}"#);
    }

    #[tokio::test]
    async fn structured_is_marshaled() {
        let (w, result) = run(StatusCode::CREATED, Content::json(serde_json::json!({"id": 7}))).await;
        result.unwrap();
        assert_eq!(w.status(), Some(StatusCode::CREATED));
        assert_eq!(w.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(w.body(), br#"{"id":7}"#);
    }

    #[tokio::test]
    async fn marshal_failure_forces_500() {
        // JSON object keys must be strings.
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple key");
        let (w, result) = run(StatusCode::CREATED, Content::json(bad)).await;
        assert!(matches!(result, Err(EncodeError::Marshal { .. })));
        assert_eq!(w.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(w.body().is_empty());
    }

    #[tokio::test]
    async fn bad_content_type_forces_500() {
        let entity = Entity::bytes("text/plain\n", "down");
        let (w, result) = run(StatusCode::SERVICE_UNAVAILABLE, entity.into()).await;
        assert!(matches!(result, Err(EncodeError::Header(_))));
        assert_eq!(w.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(w.headers().get(CONTENT_TYPE).is_none());
        assert!(w.body().is_empty());
    }

    /// Yields some bytes, then fails.
    struct Broken(bool);

    impl AsyncRead for Broken {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            if self.0 {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "source went away")));
            }
            self.0 = true;
            buf.put_slice(b"partial");
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn stream_failure_is_reported_after_commit() {
        let entity = Entity::reader("application/octet-stream", Broken(false));
        let (w, result) = run(StatusCode::OK, entity.into()).await;
        match result {
            Err(EncodeError::Write { written, ref method, .. }) => {
                assert_eq!(written, 7);
                assert_eq!(*method, Method::GET);
            }
            other => panic!("expected write error, got {other:?}"),
        }
        assert_eq!(w.status(), Some(StatusCode::OK));
        assert_eq!(w.status_writes(), 1);
    }
}
