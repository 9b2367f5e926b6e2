//! Built-in middleware.
//!
//! Middleware is an ordinary [`Handler`] that calls its continuation. These
//! cover the cross-cutting concerns most services want on every route; add
//! them with [`Service::use_handler`](crate::Service::use_handler) or
//! [`Context::use_handler`](crate::Context::use_handler).

use crate::handler::{BoxFuture, Handler, Outcome};
use crate::pipeline::Pipeline;
use crate::request::{Attrs, Request};
use crate::trace::LogSink;
use crate::writer::ResponseWriter;

/// Merges fixed attributes into every request, then continues.
pub struct Attributes(pub Attrs);

impl Handler for Attributes {
    fn serve_request<'a>(
        &'a self,
        w: &'a mut ResponseWriter,
        req: &'a mut Request,
        next: Pipeline,
    ) -> BoxFuture<'a, Outcome> {
        req.put_attributes(self.0.clone());
        Box::pin(async move { next.next(w, req).await })
    }
}

/// Mirrors every trace a request collects to the log, tagged with the
/// request id.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tracing;

impl Handler for Tracing {
    fn serve_request<'a>(
        &'a self,
        w: &'a mut ResponseWriter,
        req: &'a mut Request,
        next: Pipeline,
    ) -> BoxFuture<'a, Outcome> {
        if req.tracer().is_none() {
            let sink = LogSink::new(req.id());
            req.set_tracer(Box::new(sink));
        }
        Box::pin(async move { next.next(w, req).await })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::Value;

    use super::*;
    use crate::trace::Trace;

    fn request() -> Request {
        Request::new(http::Request::builder().uri("/").body(Bytes::new()).unwrap(), None)
    }

    #[tokio::test]
    async fn attributes_reach_downstream_handlers() {
        let check = crate::handler::handler_fn(|_w, req, _next| {
            let tenant = req.attr("tenant").cloned();
            Box::pin(async move {
                assert_eq!(tenant, Some(Value::from("acme")));
                Outcome::Ok(None)
            })
        });
        let p = Pipeline::new()
            .add(Attributes(Attrs::from([("tenant".to_owned(), Value::from("acme"))])))
            .add(check);

        let mut w = ResponseWriter::new();
        let mut req = request();
        p.next(&mut w, &mut req).await.unwrap();
        assert_eq!(req.attrs().map(|a| a.len()), Some(1));
    }

    #[tokio::test]
    async fn tracing_attaches_a_log_sink() {
        let fail = crate::handler::handler_fn(|_w, req, _next| {
            req.trace(Trace::error("lookup failed"));
            Box::pin(async { Outcome::Ok(None) })
        });
        let p = Pipeline::new().add(Tracing).add(fail);

        let mut w = ResponseWriter::new();
        let mut req = request();
        p.next(&mut w, &mut req).await.unwrap();
        assert!(req.tracer().is_some_and(|t| t.is_errored()));
    }
}
