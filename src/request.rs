//! Incoming HTTP request wrapper.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::ACCEPT;
use http::request::Parts;
use http::{HeaderMap, Method, StatusCode, Uri};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;
use crate::trace::{Trace, TraceSink};

/// Request attributes: route defaults plus whatever handlers add.
pub type Attrs = HashMap<String, Value>;

/// An inbound request as seen by the pipeline.
///
/// Besides the HTTP parts and the (already buffered) body, a request carries
/// a time-ordered unique id, a bag of attributes, the traces handlers have
/// attached to it, and the finalized latch.
///
/// The id and start time are fixed at creation. Attributes can be added or
/// overwritten but never removed. Once [`finalize`](Request::finalize) is
/// called the dispatcher will not send a response for this request.
pub struct Request {
    id: String,
    parts: Parts,
    body: Bytes,
    remote_addr: String,
    params: HashMap<String, String>,
    attrs: Option<Attrs>,
    traces: Vec<Trace>,
    tracer: Option<Box<dyn TraceSink>>,
    finalized: bool,
    started: Instant,
}

impl Request {
    /// Wraps `req`. `peer` is the socket address the request arrived from;
    /// `X-Forwarded-For` and then `X-Origin-IP` take precedence over it.
    pub fn new(req: http::Request<Bytes>, peer: Option<SocketAddr>) -> Self {
        let (parts, body) = req.into_parts();
        let remote_addr = forwarded_addr(&parts.headers)
            .or_else(|| peer.map(|p| p.to_string()))
            .unwrap_or_default();
        Self {
            id: Uuid::now_v7().to_string(),
            parts,
            body,
            remote_addr,
            params: HashMap::new(),
            attrs: None,
            traces: Vec::new(),
            tracer: None,
            finalized: false,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> &str { &self.remote_addr }
    pub fn started(&self) -> Instant { self.started }
    pub fn elapsed(&self) -> Duration { self.started.elapsed() }

    /// Decodes the body as JSON. A malformed body is a `400 Bad Request`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::new(StatusCode::BAD_REQUEST, e))
    }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// Typed request extensions, shared with the underlying `http` request.
    pub fn extensions(&self) -> &http::Extensions { &self.parts.extensions }
    pub fn extensions_mut(&mut self) -> &mut http::Extensions { &mut self.parts.extensions }

    // ── Attributes ────────────────────────────────────────────────────────────

    /// All attributes, or `None` if none were ever set.
    pub fn attrs(&self) -> Option<&Attrs> {
        self.attrs.as_ref()
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.as_ref()?.get(key)
    }

    /// Merges `attrs` into the request's attributes; keys already present
    /// are overwritten.
    pub fn put_attributes(&mut self, attrs: Attrs) {
        match &mut self.attrs {
            Some(existing) => existing.extend(attrs),
            None => self.attrs = Some(attrs),
        }
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attrs.get_or_insert_with(Attrs::new).insert(key.into(), value.into());
    }

    // ── Traces ────────────────────────────────────────────────────────────────

    /// Appends a trace, mirroring it to the attached sink if there is one.
    pub fn trace(&mut self, trace: Trace) {
        if let Some(sink) = self.tracer.as_mut() {
            match trace.err() {
                None => sink.record(trace.text()),
                Some(err) => {
                    sink.record_error(&format!("[ERR] {err}"));
                    sink.set_error();
                }
            }
        }
        self.traces.push(trace);
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn set_tracer(&mut self, sink: Box<dyn TraceSink>) {
        self.tracer = Some(sink);
    }

    pub fn tracer(&self) -> Option<&dyn TraceSink> {
        self.tracer.as_deref()
    }

    // ── Finalization ──────────────────────────────────────────────────────────

    /// Marks the response as delivered by a handler. There is no way back.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    // ── Negotiation ───────────────────────────────────────────────────────────

    /// The path, plus the query string when there is one. Used in log lines.
    pub fn resource(&self) -> String {
        match self.parts.uri.query() {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path(), q),
            _ => self.path().to_owned(),
        }
    }

    /// Whether `content_type` appears literally in the `Accept` header.
    ///
    /// This is a membership test on the comma-separated list, not media-range
    /// matching: `text/*` or `text/html;q=0.9` do not accept `text/html`.
    pub fn accepts(&self, content_type: &str) -> bool {
        self.parts
            .headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|h| h.split(',').any(|p| p.trim().eq_ignore_ascii_case(content_type)))
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.parts.method)
            .field("uri", &self.parts.uri)
            .field("finalized", &self.finalized)
            .finish_non_exhaustive()
    }
}

fn forwarded_addr(headers: &HeaderMap) -> Option<String> {
    ["x-forwarded-for", "x-origin-ip"]
        .into_iter()
        .filter_map(|name| headers.get(name)?.to_str().ok())
        .find(|v| !v.is_empty())
        .map(str::to_owned)
}
