//! The [`Handler`] capability and its function adapter.
//!
//! # How handlers are stored
//!
//! A [`Pipeline`] holds handlers of *different* concrete types in one list,
//! so every handler is type-erased behind `Arc<dyn Handler>`. Handlers borrow
//! the response writer and the request for the duration of the call, which
//! is why `serve_request` returns an explicitly boxed future tied to those
//! borrows instead of being an `async fn`:
//!
//! ```text
//! fn auth<'a>(w, req, next) -> BoxFuture<'a, Outcome>   ← user writes this
//!        ↓ pipeline.add(handler_fn(auth))
//! Arc::new(HandlerFn(auth))                            ← stored as BoxedHandler
//!        ↓
//! head.serve_request(w, req, rest)   at request time   ← one vtable dispatch
//! ```
//!
//! A handler may mutate the request, write to the response writer (and then
//! [`finalize`](crate::Request::finalize) the request), hand the request to
//! the rest of the pipeline by calling `next.next(w, req)`, or stop and
//! return its own outcome.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;

use crate::entity::{Content, Entity, Reply, Response};
use crate::error::BoxError;
use crate::pipeline::Pipeline;
use crate::request::Request;
use crate::writer::ResponseWriter;

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` is required because the async runtime must be able to poll
/// the future in-place. `Send` lets tokio move it across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler produces.
///
/// `Ok(None)` means nothing handled the request and nothing failed.
pub type Outcome = Result<Option<Reply>, BoxError>;

/// A unit of request processing.
pub trait Handler: Send + Sync + 'static {
    fn serve_request<'a>(
        &'a self,
        w: &'a mut ResponseWriter,
        req: &'a mut Request,
        next: Pipeline,
    ) -> BoxFuture<'a, Outcome>;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

// ── Function handlers ─────────────────────────────────────────────────────────

/// Wraps a function or closure as a [`Handler`].
///
/// ```rust
/// use restline::{handler_fn, reply, Content, Pipeline};
///
/// let hello = handler_fn(|_w, req, _next| {
///     Box::pin(async move {
///         let name = req.param("name").unwrap_or("world").to_owned();
///         reply(Content::json(format!("hello, {name}")))
///     })
/// });
///
/// let pipeline = Pipeline::new().add(hello);
/// assert_eq!(pipeline.len(), 1);
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut ResponseWriter, &'a mut Request, Pipeline) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    HandlerFn(f)
}

/// Handler returned by [`handler_fn`].
pub struct HandlerFn<F>(F);

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut ResponseWriter, &'a mut Request, Pipeline) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    fn serve_request<'a>(
        &'a self,
        w: &'a mut ResponseWriter,
        req: &'a mut Request,
        next: Pipeline,
    ) -> BoxFuture<'a, Outcome> {
        (self.0)(w, req, next)
    }
}

// ── IntoReply ─────────────────────────────────────────────────────────────────

/// Conversion into a successful [`Outcome`] value.
pub trait IntoReply {
    fn into_reply(self) -> Option<Reply>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Option<Reply> { Some(self) }
}

impl IntoReply for Response {
    fn into_reply(self) -> Option<Reply> { Some(Reply::Response(self)) }
}

impl IntoReply for Content {
    fn into_reply(self) -> Option<Reply> { Some(Reply::Content(self)) }
}

impl IntoReply for Entity {
    fn into_reply(self) -> Option<Reply> { Some(Reply::Content(Content::Entity(self))) }
}

/// A status with no body.
impl IntoReply for StatusCode {
    fn into_reply(self) -> Option<Reply> { Response::new(self, Content::Empty).into_reply() }
}

/// Nothing handled, nothing failed.
impl IntoReply for () {
    fn into_reply(self) -> Option<Reply> { None }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Option<Reply> { self.and_then(IntoReply::into_reply) }
}

/// `Ok(value.into_reply())`, the usual last line of a handler.
pub fn reply(value: impl IntoReply) -> Outcome {
    Ok(value.into_reply())
}
