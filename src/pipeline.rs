//! Chain-of-responsibility dispatch.
//!
//! A [`Pipeline`] is an immutable list of handlers. [`Pipeline::add`] returns
//! a new pipeline and leaves the receiver untouched, so route pipelines built
//! from a shared prefix never observe each other's additions and can be read
//! from every worker thread without locking.
//!
//! [`Pipeline::next`] runs the first handler and hands it the rest of the
//! list as its continuation. The continuation is an ordinary value: a
//! middleware can call it, skip it, or inspect what it returns.
//!
//! ```rust
//! use restline::{handler_fn, Pipeline};
//!
//! let auth = handler_fn(|w, req, next| Box::pin(async move {
//!     if req.header("authorization").is_none() {
//!         return Err(restline::Error::from_status(restline::StatusCode::UNAUTHORIZED).into());
//!     }
//!     next.next(w, req).await
//! }));
//!
//! let base = Pipeline::new().add(auth);
//! let longer = base.add(Pipeline::new());
//! assert_eq!(base.len(), 1);
//! assert_eq!(longer.len(), 1);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, Handler, Outcome};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// An ordered, copy-on-append sequence of handlers.
///
/// Cloning is one reference-count increment; the continuation handed to a
/// handler shares storage with the pipeline it came from.
#[derive(Clone, Default)]
pub struct Pipeline {
    handlers: Arc<[BoxedHandler]>,
    offset: usize,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this pipeline with `handler` appended.
    ///
    /// If `handler` is itself a pipeline its handlers are appended one by
    /// one, so pipelines never nest.
    pub fn add<H: Handler>(&self, handler: H) -> Pipeline {
        let mut handlers = self.handlers().to_vec();
        match (&handler as &dyn Any).downcast_ref::<Pipeline>() {
            Some(p) => handlers.extend(p.handlers().iter().cloned()),
            None => handlers.push(Arc::new(handler)),
        }
        Pipeline { handlers: handlers.into(), offset: 0 }
    }

    pub fn len(&self) -> usize {
        self.handlers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers().is_empty()
    }

    /// Runs the first handler with the remainder as its continuation.
    /// An empty pipeline yields `Ok(None)`.
    pub fn next<'a>(&self, w: &'a mut ResponseWriter, req: &'a mut Request) -> BoxFuture<'a, Outcome> {
        let Some(head) = self.handlers().first().cloned() else {
            return Box::pin(async { Outcome::Ok(None) });
        };
        let rest = Pipeline { handlers: Arc::clone(&self.handlers), offset: self.offset + 1 };
        Box::pin(async move { head.serve_request(w, req, rest).await })
    }

    fn handlers(&self) -> &[BoxedHandler] {
        &self.handlers[self.offset..]
    }
}

/// A pipeline used as a handler runs its own handlers and ignores the
/// continuation it is given.
impl Handler for Pipeline {
    fn serve_request<'a>(
        &'a self,
        w: &'a mut ResponseWriter,
        req: &'a mut Request,
        _next: Pipeline,
    ) -> BoxFuture<'a, Outcome> {
        self.next(w, req)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("len", &self.len()).finish()
    }
}
