//! Radix-tree route table.
//!
//! One tree per HTTP method, O(path-length) lookup via [`matchit`]. Each
//! leaf holds the route's pipeline and the attributes it seeds requests
//! with. Pattern matching ends here; everything after the lookup is the
//! pipeline's business.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::pipeline::Pipeline;
use crate::request::Attrs;

/// What a matched route contributes to a request.
#[derive(Debug)]
pub(crate) struct Route {
    pub(crate) pipeline: Pipeline,
    pub(crate) attrs: Option<Attrs>,
}

pub(crate) enum Lookup {
    Found(Arc<Route>, HashMap<String, String>),
    /// The path exists under other methods.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

#[derive(Default)]
pub(crate) struct Router {
    routes: HashMap<Method, MatchitRouter<Arc<Route>>>,
    listing: Vec<String>,
}

impl Router {
    /// Registers `route` for a method + path pair.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern or conflicts with an existing
    /// route for the same method. Routes are registered at startup, so this
    /// surfaces immediately.
    pub(crate) fn insert(&mut self, method: Method, path: &str, route: Route) {
        self.routes
            .entry(method.clone())
            .or_default()
            .insert(path, Arc::new(route))
            .unwrap_or_else(|e| panic!("invalid route `{method} {path}`: {e}"));
        self.listing.push(format!("{method} {path}"));
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Lookup {
        if let Some(matched) = self.routes.get(method).and_then(|tree| tree.at(path).ok()) {
            let params = matched.params.iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found(Arc::clone(matched.value), params);
        }

        let mut allowed: Vec<Method> = self.routes.iter()
            .filter(|(m, tree)| *m != method && tree.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();
        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Lookup::MethodNotAllowed(allowed)
    }

    /// Registered routes as `METHOD path`, in registration order.
    pub(crate) fn listing(&self) -> &[String] {
        &self.listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Route {
        Route { pipeline: Pipeline::new(), attrs: None }
    }

    #[test]
    fn finds_route_with_params() {
        let mut r = Router::default();
        r.insert(Method::GET, "/users/{id}", route());
        match r.lookup(&Method::GET, "/users/42") {
            Lookup::Found(_, params) => assert_eq!(params.get("id").map(String::as_str), Some("42")),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn reports_other_methods() {
        let mut r = Router::default();
        r.insert(Method::PUT, "/users/{id}", route());
        r.insert(Method::DELETE, "/users/{id}", route());
        match r.lookup(&Method::GET, "/users/42") {
            Lookup::MethodNotAllowed(m) => assert_eq!(m, [Method::DELETE, Method::PUT]),
            _ => panic!("expected method not allowed"),
        }
    }

    #[test]
    fn unknown_path_is_not_found() {
        let mut r = Router::default();
        r.insert(Method::GET, "/users", route());
        assert!(matches!(r.lookup(&Method::GET, "/orders"), Lookup::NotFound));
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_route_panics() {
        let mut r = Router::default();
        r.insert(Method::GET, "/users/{id}", route());
        r.insert(Method::GET, "/users/{name}", route());
    }

    #[test]
    fn listing_keeps_registration_order() {
        let mut r = Router::default();
        r.insert(Method::POST, "/b", route());
        r.insert(Method::GET, "/a", route());
        assert_eq!(r.listing(), ["POST /b", "GET /a"]);
    }
}
