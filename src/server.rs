//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`; no new connections are made.
//! 2. Letting every in-flight connection task run to completion.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! # Timeouts
//!
//! The read timeout bounds how long a client may take to send request
//! headers (HTTP/1). The idle timeout bounds how long a kept-alive
//! connection may wait for its next request: on HTTP/1 it is added to the
//! header-read allowance, on HTTP/2 it drives keep-alive pings and closes
//! connections whose peer stops answering. The write timeout bounds how long
//! the service may take to produce a response; when it fires the connection
//! is dropped. None of them reaches into the pipeline: a handler is never
//! interrupted, only abandoned.
//!
//! Request bodies are buffered before dispatch. Bodies larger than the
//! configured limit are answered with `413 Payload Too Large`.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::time::error::Elapsed;
use tracing::{error, info};

use crate::config::{Config, ConfigError, DEFAULT_MAX_BODY_BYTES};
use crate::error::{BoxError, Error};
use crate::service::App;

/// The listener could not be bound or stopped accepting.
#[derive(Debug, thiserror::Error)]
#[error("server error: {0}")]
pub struct ServeError(#[from] io::Error);

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
    max_body: Option<usize>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use restline::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().unwrap_or_else(|_| panic!("invalid socket address `{addr}`"));
        Self {
            addr,
            read_timeout: None,
            write_timeout: None,
            idle_timeout: None,
            max_body: Some(DEFAULT_MAX_BODY_BYTES),
        }
    }

    /// Endpoint, timeouts and body limit from `config`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            addr: config.endpoint_addr()?,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            idle_timeout: config.idle_timeout(),
            max_body: config.max_body_bytes(),
        })
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Largest request body accepted. 0 removes the limit.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body = (limit > 0).then_some(limit);
        self
    }

    /// Serves `app` until SIGTERM or Ctrl-C, then drains in-flight
    /// connections and returns.
    pub async fn serve(self, app: impl Into<App>) -> Result<(), ServeError> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), stopping when `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, app: impl Into<App>, signal: F) -> Result<(), ServeError>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener(listener, app, signal).await
    }

    /// Serves on an already bound listener. The configured address is
    /// ignored.
    pub async fn serve_listener<F>(self, listener: TcpListener, app: impl Into<App>, signal: F) -> Result<(), ServeError>
    where
        F: Future<Output = ()>,
    {
        let app: App = app.into();
        let addr = listener.local_addr()?;
        let write_timeout = self.write_timeout;
        let max_body = self.max_body;

        let mut builder = ConnBuilder::new(TokioExecutor::new());
        if let Some(timeout) = header_timeout(self.read_timeout, self.idle_timeout) {
            builder.http1().timer(TokioTimer::new()).header_read_timeout(timeout);
        }
        if let Some(idle) = self.idle_timeout {
            builder
                .http2()
                .timer(TokioTimer::new())
                .keep_alive_interval(idle)
                .keep_alive_timeout(idle);
        }

        info!(%addr, "listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting even when
                // more connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = app.clone();
                    let builder = builder.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let app = app.clone();
                            async move { dispatch(app, req, peer, write_timeout, max_body).await }
                        });

                        if let Err(e) = builder.serve_connection(io, svc).await {
                            error!(%peer, "connection error: {e}");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("stopped");
        Ok(())
    }
}

/// HTTP/1 header-read allowance. hyper starts this timer as soon as a
/// connection is ready for its next request, so it also covers idle time.
fn header_timeout(read: Option<Duration>, idle: Option<Duration>) -> Option<Duration> {
    match (read, idle) {
        (Some(read), Some(idle)) => Some(read + idle),
        (read, idle) => read.or(idle),
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers the body and hands the request to the app. Returning an error
/// makes hyper drop the connection.
async fn dispatch(
    app: App,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
    write_timeout: Option<Duration>,
    max_body: Option<usize>,
) -> Result<http::Response<Full<Bytes>>, Elapsed> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let work = respond(app, req, peer, max_body);
    let result = match write_timeout {
        Some(limit) => tokio::time::timeout(limit, work).await,
        None => Ok(work.await),
    };
    if result.is_err() {
        error!(%peer, "{method} {uri}: no response within the write timeout");
    }
    result
}

async fn respond(
    app: App,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
    max_body: Option<usize>,
) -> http::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    match Limited::new(body, max_body.unwrap_or(usize::MAX)).collect().await {
        Ok(collected) => app.handle(http::Request::from_parts(parts, collected.to_bytes()), Some(peer)).await,
        Err(e) => {
            let err = body_error(e);
            app.reject(http::Request::from_parts(parts, Bytes::new()), Some(peer), err).await
        }
    }
}

/// `413` for an oversized body, `400` for anything else that stopped it
/// being read.
fn body_error(e: BoxError) -> Error {
    if e.downcast_ref::<LengthLimitError>().is_some() {
        Error::new(StatusCode::PAYLOAD_TOO_LARGE, e)
    } else {
        Error::new(StatusCode::BAD_REQUEST, e)
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by the Kubernetes control
/// plane) and **SIGINT** (Ctrl-C, for local dev). On Windows only Ctrl-C is
/// available.
///
/// # Panics
///
/// Panics if the signal handlers cannot be installed.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
