//! # restline
//!
//! Handler pipelines for HTTP services behind a reverse proxy.
//!
//! A request flows through a [`Pipeline`]: an immutable list of
//! [`Handler`]s where each one receives the rest of the list as its
//! continuation. Middleware calls the continuation, inspects what comes
//! back, or stops early. Whatever the pipeline returns, a value or an
//! error, is turned into exactly one response:
//!
//! - a [`Response`] is sent with its own status and headers
//! - bare [`Content`] is sent as `200 OK`
//! - an [`Error`] becomes its status with a JSON body, or an HTML page for
//!   clients that ask for `text/html`
//! - any other error becomes a `500` with the same shapes
//!
//! Every response carries an `X-Request-Id` header with the request's
//! time-ordered UUID.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use restline::{handler_fn, reply, Config, Content, Context, Error, Method, Server, Service, StatusCode};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!
//!     let users = Context::new("/users")
//!         .handle(Method::GET, "/{id}", handler_fn(|_w, req, _next| Box::pin(async move {
//!             match req.param("id") {
//!                 Some("0") => Err(Error::msg(StatusCode::NOT_FOUND, "no such user").into()),
//!                 Some(id) => reply(Content::json(serde_json::json!({ "id": id }))),
//!                 None => reply(StatusCode::BAD_REQUEST),
//!             }
//!         })));
//!
//!     let app = Service::new(&config).unwrap().mount(users);
//!
//!     Server::from_config(&config).unwrap().serve(app).await.unwrap();
//! }
//! ```

mod config;
mod dispatch;
mod encode;
mod entity;
mod error;
mod handler;
mod pipeline;
mod request;
mod router;
mod server;
mod service;
mod trace;
mod writer;

pub mod middleware;

pub use config::{Config, ConfigError};
pub use encode::{encode, DefaultEncoder, EncodeError, EntityEncoder};
pub use entity::{Content, ContentType, Entity, Headers, Reply, Response, Structured};
pub use error::{BoxError, Detail, Error, ErrorBody, ErrorDetail, FieldError, FieldViolation, Item};
pub use handler::{handler_fn, reply, BoxFuture, BoxedHandler, Handler, HandlerFn, IntoReply, Outcome};
pub use http::{Method, StatusCode};
pub use pipeline::Pipeline;
pub use request::{Attrs, Request};
pub use server::{ServeError, Server};
pub use service::{App, Context, Service};
pub use trace::{LogSink, Trace, TraceSink};
pub use writer::{InvalidHeader, ResponseWriter};
