//! Build phase and serving phase.
//!
//! A [`Service`] is assembled once at startup: service-wide middleware,
//! route groups ([`Context`]), an optional custom encoder. [`Service::freeze`]
//! turns it into an [`App`], an immutable snapshot that every connection
//! shares. Nothing about an `App` can change after it is built.
//!
//! ```rust
//! use restline::{handler_fn, reply, Config, Content, Context, Method, Service};
//!
//! let users = Context::new("/users")
//!     .handle(Method::GET, "/{id}", handler_fn(|_w, req, _next| Box::pin(async move {
//!         let id = req.param("id").unwrap_or_default().to_owned();
//!         reply(Content::json(serde_json::json!({ "id": id })))
//!     })));
//!
//! let app = Service::new(&Config::default()).unwrap().mount(users).freeze();
//! assert_eq!(app.routes(), ["GET /users/{id}"]);
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use tracing::debug;

use crate::config::{Config, ConfigError, Settings};
use crate::dispatch::Dispatcher;
use crate::encode::{DefaultEncoder, EntityEncoder};
use crate::error::{BoxError, Error};
use crate::handler::{BoxFuture, Handler, Outcome};
use crate::pipeline::Pipeline;
use crate::request::{Attrs, Request};
use crate::router::{Lookup, Route, Router};
use crate::writer::ResponseWriter;

// ── Context ───────────────────────────────────────────────────────────────────

/// A group of routes under a common base path, sharing middleware.
///
/// A route's pipeline is the context's pipeline at the moment the route is
/// registered, plus the route handler. Middleware added afterwards does not
/// reach routes that are already registered.
pub struct Context {
    base: String,
    pipeline: Pipeline,
    routes: Vec<(Method, String, Route)>,
}

impl Context {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into(), pipeline: Pipeline::new(), routes: Vec::new() }
    }

    /// Appends middleware for routes registered from now on.
    pub fn use_handler(mut self, handler: impl Handler) -> Self {
        self.pipeline = self.pipeline.add(handler);
        self
    }

    pub fn handle(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.register(method, path, handler, None)
    }

    /// Like [`handle`](Context::handle); every request on this route starts
    /// out with `attrs` as its attributes.
    pub fn handle_with(self, method: Method, path: &str, handler: impl Handler, attrs: Attrs) -> Self {
        self.register(method, path, handler, Some(attrs))
    }

    fn register(mut self, method: Method, path: &str, handler: impl Handler, attrs: Option<Attrs>) -> Self {
        let route = Route { pipeline: self.pipeline.add(handler), attrs };
        let full = join_path(&self.base, path);
        self.routes.push((method, full, route));
        self
    }
}

fn join_path(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (base.is_empty(), path.is_empty()) {
        (_, true) if !base.is_empty() => base.to_owned(),
        (_, true) => "/".to_owned(),
        _ => format!("{base}/{path}"),
    }
}

// ── Service ───────────────────────────────────────────────────────────────────

/// The mutable build phase of an [`App`].
pub struct Service {
    config: Config,
    settings: Settings,
    encoder: Arc<dyn EntityEncoder>,
    pipeline: Pipeline,
    router: Router,
}

impl Service {
    /// Compiles `config`. Fails if a trace pattern is not a valid regex.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            config: config.clone(),
            settings: config.compile()?,
            encoder: Arc::new(DefaultEncoder),
            pipeline: Pipeline::new(),
            router: Router::default(),
        })
    }

    /// Replaces the default JSON / entity encoder.
    pub fn with_encoder(mut self, encoder: Arc<dyn EntityEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Appends service-wide middleware. It runs before route lookup, so it
    /// sees every request, matched or not.
    pub fn use_handler(mut self, handler: impl Handler) -> Self {
        self.pipeline = self.pipeline.add(handler);
        self
    }

    /// Registers every route of `ctx`.
    ///
    /// # Panics
    ///
    /// Panics if a route path is invalid or conflicts with one already
    /// registered for the same method.
    pub fn mount(mut self, ctx: Context) -> Self {
        for (method, path, route) in ctx.routes {
            self.router.insert(method, &path, route);
        }
        self
    }

    /// Registers a single route at the root, with no context middleware.
    pub fn route(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.mount(Context::new("").handle(method, path, handler))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ends the build phase.
    pub fn freeze(self) -> App {
        let routes = self.router.listing().to_vec();
        if self.config.debug {
            for route in &routes {
                debug!("{}: route: {route}", self.settings.name);
            }
        }
        let pipeline = self.pipeline.add(RouteHandler { router: self.router });
        App {
            inner: Arc::new(Inner {
                pipeline,
                dispatcher: Dispatcher::new(self.settings, self.encoder),
                routes,
            }),
        }
    }
}

impl From<Service> for App {
    fn from(service: Service) -> Self {
        service.freeze()
    }
}

/// Final handler of the service pipeline: finds the route and runs its
/// pipeline.
struct RouteHandler {
    router: Router,
}

impl Handler for RouteHandler {
    fn serve_request<'a>(
        &'a self,
        w: &'a mut ResponseWriter,
        req: &'a mut Request,
        _next: Pipeline,
    ) -> BoxFuture<'a, Outcome> {
        match self.router.lookup(req.method(), req.path()) {
            Lookup::Found(route, params) => {
                req.set_params(params);
                if let Some(attrs) = &route.attrs {
                    req.put_attributes(attrs.clone());
                }
                route.pipeline.next(w, req)
            }
            Lookup::MethodNotAllowed(allowed) => {
                let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
                let err = Error::from_status(StatusCode::METHOD_NOT_ALLOWED).with_header("allow", allow);
                Box::pin(async move { Outcome::Err(BoxError::from(err)) })
            }
            Lookup::NotFound => {
                Box::pin(async { Outcome::Err(BoxError::from(Error::msg(StatusCode::NOT_FOUND, "not found"))) })
            }
        }
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

/// A frozen service, cheap to clone and safe to share across connections.
#[derive(Clone)]
pub struct App {
    inner: Arc<Inner>,
}

struct Inner {
    pipeline: Pipeline,
    dispatcher: Dispatcher,
    routes: Vec<String>,
}

impl App {
    /// Runs one request through the service and returns the response.
    ///
    /// `peer` is the socket address the request came from, if known.
    pub async fn handle(&self, req: http::Request<Bytes>, peer: Option<SocketAddr>) -> http::Response<Full<Bytes>> {
        let dispatcher = &self.inner.dispatcher;
        let mut req = Request::new(req, peer);
        let mut w = ResponseWriter::new();

        let traced = dispatcher.trace_request(&req);
        let outcome = self.inner.pipeline.next(&mut w, &mut req).await;
        if req.is_finalized() {
            return w.into_response();
        }

        dispatcher.send_response(&mut w, &req, outcome).await;
        debug!(
            service = dispatcher.name(),
            request_id = req.id(),
            elapsed = ?req.elapsed(),
            method = %req.method(),
            resource = %req.resource(),
            status = w.status().map_or(200, |s| s.as_u16()),
            "request"
        );
        if traced {
            dispatcher.trace_response(&w);
        }
        w.into_response()
    }

    /// Answers a request that never reached the pipeline, e.g. because its
    /// body could not be read.
    pub(crate) async fn reject(
        &self,
        req: http::Request<Bytes>,
        peer: Option<SocketAddr>,
        err: Error,
    ) -> http::Response<Full<Bytes>> {
        let req = Request::new(req, peer);
        let mut w = ResponseWriter::new();
        self.inner.dispatcher.send_response(&mut w, &req, Err(err.into())).await;
        w.into_response()
    }

    /// Registered routes as `METHOD path`, in registration order.
    pub fn routes(&self) -> &[String] {
        &self.inner.routes
    }
}
