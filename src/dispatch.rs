//! Turning a pipeline's outcome into a response.
//!
//! Success: a [`Response`](crate::Response) is sent as-is; bare content is
//! sent as `200 OK`; no result at all is an empty `200 OK`.
//!
//! Failure: an [`Error`] keeps its status, headers and detail. Any other
//! error becomes a `500` whose message is the error's text. Statuses outside
//! `200..500` are logged as errors, the rest at debug level. Clients that
//! list `text/html` in `Accept` get an HTML page, everyone else gets the
//! JSON [`ErrorBody`](crate::ErrorBody).
//!
//! Every dispatched response carries `X-Request-Id`.

use std::fmt::Write as _;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue, USER_AGENT};
use http::{HeaderMap, StatusCode};
use tracing::{debug, error};

use crate::config::Settings;
use crate::encode::EntityEncoder;
use crate::entity::{Content, ContentType, Entity, Reply};
use crate::error::{BoxError, Detail, Error, Item};
use crate::handler::Outcome;
use crate::request::Request;
use crate::writer::ResponseWriter;

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub(crate) struct Dispatcher {
    settings: Settings,
    encoder: Arc<dyn EntityEncoder>,
}

impl Dispatcher {
    pub(crate) fn new(settings: Settings, encoder: Arc<dyn EntityEncoder>) -> Self {
        Self { settings, encoder }
    }

    pub(crate) fn name(&self) -> &str {
        &self.settings.name
    }

    pub(crate) async fn send_response(&self, w: &mut ResponseWriter, req: &Request, outcome: Outcome) {
        if let Ok(id) = HeaderValue::from_str(req.id()) {
            w.insert_header(X_REQUEST_ID, id);
        }
        match outcome {
            Ok(reply) => self.send_success(w, req, reply).await,
            Err(err) => self.send_error(w, req, err).await,
        }
    }

    async fn send_success(&self, w: &mut ResponseWriter, req: &Request, reply: Option<Reply>) {
        let (status, headers, content) = match reply {
            Some(Reply::Response(r)) => r.into_parts(),
            Some(Reply::Content(c)) => (StatusCode::OK, Vec::new(), c),
            None => (StatusCode::OK, Vec::new(), Content::Empty),
        };
        self.send_entity(w, req, status, &headers, content).await;
    }

    async fn send_error(&self, w: &mut ResponseWriter, req: &Request, err: BoxError) {
        let err = match err.downcast::<Error>() {
            Ok(e) => *e,
            Err(other) => Error::msg(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };

        let mut line = format!("{}: [{}] {}", self.settings.name, req.id(), err);
        if let Some(detail) = err.detail() {
            line.push('\n');
            line.push_str(&format_detail(detail));
        }
        let status = err.status();
        if status.as_u16() < 200 || status.as_u16() >= 500 {
            error!(status = status.as_u16(), "{line}");
        } else {
            debug!(status = status.as_u16(), "{line}");
        }

        let content = if req.accepts("text/html") {
            Content::Entity(html_error(&err))
        } else {
            Content::json(err.body())
        };
        self.send_entity(w, req, status, err.headers(), content).await;
    }

    async fn send_entity(
        &self,
        w: &mut ResponseWriter,
        req: &Request,
        status: StatusCode,
        headers: &[(String, String)],
        content: Content,
    ) {
        for (name, value) in headers {
            if let Err(e) = w.add_header(name, value) {
                error!("{}: [{}] {e}", self.settings.name, req.id());
            }
        }
        if let Some(ua) = &self.settings.user_agent {
            if let Err(e) = w.add_header(USER_AGENT.as_str(), ua) {
                error!("{}: {e}", self.settings.name);
            }
        }
        if let Err(e) = self.encoder.encode(w, req, status, content).await {
            error!("{}: {e}", self.settings.name);
        }
    }

    // ── Trace dumps ───────────────────────────────────────────────────────────

    /// Dumps the request if its path matches a trace pattern. Returns whether
    /// it did, so the caller knows to dump the response too.
    pub(crate) fn trace_request(&self, req: &Request) -> bool {
        let Some(pattern) = self.settings.trace_pattern(req.path()) else {
            return false;
        };
        debug!(
            "{}: [{}] (trace:{}) {} {}",
            self.settings.name,
            req.remote_addr(),
            pattern,
            req.method(),
            req.resource(),
        );

        let mut dump = String::new();
        for name in req.headers().keys() {
            let values = req.headers().get_all(name);
            if self.settings.is_suppressed(name.as_str()) {
                let _ = writeln!(dump, "{name}: <{} suppressed>", values.iter().count());
            } else {
                let _ = writeln!(dump, "{name}: {}", join_values(values.iter()));
            }
        }
        dump.push('\n');
        if !req.body().is_empty() {
            dump.push_str(&String::from_utf8_lossy(req.body()));
            dump.push('\n');
        }
        debug!("{}\n-", indent(&dump, "> "));
        true
    }

    pub(crate) fn trace_response(&self, w: &ResponseWriter) {
        let status = w.status().unwrap_or(StatusCode::OK);
        let mut dump = format!("HTTP/1.1 {} {}\n", status.as_u16(), status.canonical_reason().unwrap_or_default());
        dump.push_str(&format_headers(w.headers()));
        dump.push('\n');
        if !w.body().is_empty() {
            dump.push_str(&String::from_utf8_lossy(w.body()));
            dump.push('\n');
        }
        debug!("{}\n#", indent(&dump, "< "));
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// An HTML page describing `err`.
pub(crate) fn html_error(err: &Error) -> Entity {
    let status = err.status();
    let mut page = String::from("<html><body>");
    let _ = write!(page, "<h1>{} {}</h1>", status.as_u16(), status.canonical_reason().unwrap_or_default());
    let _ = write!(page, "<p>{}</p>", html_escape(&err.message()));

    match err.detail() {
        Some(Detail::Map(entries)) => {
            page.push_str("<table>");
            for (k, v) in entries {
                let _ = write!(
                    page,
                    "<tr><td><strong>{}</strong></td><td>{}</td></tr>",
                    html_escape(k),
                    html_escape(v),
                );
            }
            page.push_str("</table>");
        }
        Some(Detail::List(items)) => {
            page.push_str("<table>");
            for item in items {
                match item {
                    Item::Field { field, message } => {
                        let _ = write!(
                            page,
                            "<tr><td><strong><code>{}</code></strong></td><td>{}</td></tr>",
                            html_escape(field),
                            html_escape(message),
                        );
                    }
                    Item::Value(v) => {
                        let _ = write!(page, "<tr><td>{}</td></tr>", html_escape(v));
                    }
                }
            }
            page.push_str("</table>");
        }
        None => {}
    }

    page.push_str("</body></html>");
    Entity::bytes(ContentType::Html, page)
}

/// One `  - ` line per detail entry, for log output.
pub(crate) fn format_detail(detail: &Detail) -> String {
    let mut out = String::new();
    match detail {
        Detail::Map(entries) => {
            for (k, v) in entries {
                let _ = writeln!(out, "  - {k}: {v}");
            }
        }
        Detail::List(items) => {
            for item in items {
                let _ = match item {
                    Item::Field { field, message } => writeln!(out, "  - {field}: {message}"),
                    Item::Value(v) => writeln!(out, "  - {v}"),
                };
            }
        }
    }
    out
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&#34;")
        .replace('\'', "&#39;")
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines().map(|l| format!("{prefix}{l}")).collect::<Vec<_>>().join("\n")
}

fn join_values<'a>(values: impl Iterator<Item = &'a HeaderValue>) -> String {
    values.map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()).collect::<Vec<_>>().join(", ")
}

fn format_headers(headers: &HeaderMap) -> String {
    let mut out = String::new();
    for name in headers.keys() {
        let _ = writeln!(out, "{name}: {}", join_values(headers.get_all(name).iter()));
    }
    out
}
