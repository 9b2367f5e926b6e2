//! Per-request diagnostic traces.
//!
//! A [`Trace`] is an immutable, timestamped record of either a message or an
//! error. Handlers attach traces to a [`Request`](crate::Request) as it moves
//! through the pipeline; the request keeps them in append order and, when a
//! [`TraceSink`] is attached, mirrors each one to it as it arrives.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use serde_json::Value;
use tracing::{error, info};

use crate::error::BoxError;

/// A timestamped message or error, with optional free-form context.
#[derive(Clone, Debug)]
pub struct Trace {
    when: SystemTime,
    kind: Kind,
    context: Option<Value>,
}

#[derive(Clone, Debug)]
enum Kind {
    Message(String),
    Error(Arc<dyn std::error::Error + Send + Sync>),
}

impl Trace {
    /// A non-error trace.
    pub fn message(message: impl Into<String>) -> Self {
        Self { when: SystemTime::now(), kind: Kind::Message(message.into()), context: None }
    }

    /// An error trace.
    pub fn error(err: impl Into<BoxError>) -> Self {
        Self { when: SystemTime::now(), kind: Kind::Error(Arc::from(err.into())), context: None }
    }

    /// Attaches free-form context to the trace.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn timestamp(&self) -> SystemTime { self.when }
    pub fn context(&self) -> Option<&Value> { self.context.as_ref() }

    /// The message of a message trace. Error traces have an empty message.
    pub fn text(&self) -> &str {
        match &self.kind {
            Kind::Message(m) => m,
            Kind::Error(_) => "",
        }
    }

    /// The error of an error trace, `None` for message traces.
    pub fn err(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match &self.kind {
            Kind::Message(_) => None,
            Kind::Error(e) => Some(e.as_ref()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, Kind::Error(_))
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Message(m) => f.write_str(m),
            Kind::Error(e) => write!(f, "[ERR] {e}"),
        }
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// External receiver for a request's traces.
///
/// Message traces arrive through [`record`](TraceSink::record). Error traces
/// arrive through [`record_error`](TraceSink::record_error), immediately
/// followed by [`set_error`](TraceSink::set_error) so sinks that aggregate
/// trace health can flag the whole request.
pub trait TraceSink: Send + Sync {
    fn record(&mut self, line: &str);
    fn record_error(&mut self, line: &str);
    fn set_error(&mut self);
    fn is_errored(&self) -> bool;
}

/// A [`TraceSink`] that forwards traces to `tracing`, tagged with the id of
/// the request they belong to.
#[derive(Debug)]
pub struct LogSink {
    request_id: String,
    errored: bool,
}

impl LogSink {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self { request_id: request_id.into(), errored: false }
    }
}

impl TraceSink for LogSink {
    fn record(&mut self, line: &str) {
        info!(request_id = %self.request_id, "{line}");
    }

    fn record_error(&mut self, line: &str) {
        error!(request_id = %self.request_id, "{line}");
    }

    fn set_error(&mut self) {
        self.errored = true;
    }

    fn is_errored(&self) -> bool {
        self.errored
    }
}
