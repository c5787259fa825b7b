//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. The router is itself an
//! [`Endpoint`], so it can sit underneath middleware as the downstream handler.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxFuture, BoxedEndpoint, Endpoint, Handler, Outcome};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup; wrap it in middleware or pass it straight to
/// [`Server::serve`](crate::Server::serve).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedEndpoint>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax — `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use faultgate::{Request, Response, Router};
    /// # use http::Method;
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics on an invalid or conflicting route pattern. Routes are fixed at
    /// startup, so this is a programming error.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_endpoint())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedEndpoint, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let endpoint = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((endpoint, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl Endpoint for Router {
    fn call(&self, mut req: Request) -> BoxFuture<Outcome> {
        match self.lookup(&req.method, &req.path) {
            Some((endpoint, params)) => {
                req.params = params;
                endpoint.call(req)
            }
            None => Box::pin(async { Ok(Response::status(StatusCode::NOT_FOUND)) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn echo_id(req: Request) -> String {
        req.param("id").unwrap_or("none").to_owned()
    }

    #[tokio::test]
    async fn params_reach_the_handler() {
        let router = Router::new().get("/users/{id}", echo_id);
        let res = router.call(Request::new(Method::GET, "/users/42")).await.unwrap();
        assert_eq!(res.body().as_bytes().unwrap().as_ref(), b"42");
    }

    async fn echo_body(req: Request) -> String {
        String::from_utf8_lossy(req.body()).into_owned()
    }

    #[tokio::test]
    async fn methods_have_separate_trees() {
        let router = Router::new()
            .get("/users/{id}", echo_id)
            .post("/users/{id}", echo_body);

        let req = Request::new(Method::POST, "/users/42").with_body("created");
        let res = router.call(req).await.unwrap();
        assert_eq!(res.body().as_bytes().unwrap().as_ref(), b"created");

        let res = router.call(Request::new(Method::GET, "/users/42")).await.unwrap();
        assert_eq!(res.body().as_bytes().unwrap().as_ref(), b"42");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let router = Router::new().get("/users/{id}", echo_id);
        let res = router.call(Request::new(Method::POST, "/users/42")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }
}
