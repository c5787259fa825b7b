//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types in one map, so each is
//! erased behind the [`Endpoint`] trait object. Middleware is an `Endpoint`
//! too: it owns the `Endpoint` it wraps and calls it like any handler.
//!
//! ```text
//! async fn hello(req: Request) -> Result<Response, Fault> { … }   ← user writes this
//!        ↓ router.on(Method::GET, "/", hello)
//! hello.into_endpoint()                        ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                   ← stored as BoxedEndpoint
//!        ↓
//! endpoint.call(req)  at request time          ← one vtable dispatch
//!        ↓
//! Box::pin(async { hello(req).await.into_outcome() })  ← BoxFuture<Outcome>
//! ```
//!
//! Per request that is one virtual call and one boxed future. Middleware
//! adds one more of each per layer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::fault::Fault;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Outcome ───────────────────────────────────────────────────────────────────

/// What a handler produces: a response, or the fault that prevented one.
pub type Outcome = Result<Response, Fault>;

/// A heap-allocated, type-erased future resolving to `T`.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Conversion of a handler's return value into an [`Outcome`].
///
/// Anything that is [`IntoResponse`] always succeeds; a `Result` whose error
/// converts into a [`Fault`] fails with that fault.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl<R: IntoResponse> IntoOutcome for R {
    fn into_outcome(self) -> Outcome {
        Ok(self.into_response())
    }
}

impl<R, E> IntoOutcome for Result<R, E>
where
    R: IntoResponse,
    E: Into<Fault>,
{
    fn into_outcome(self) -> Outcome {
        self.map(IntoResponse::into_response).map_err(Into::into)
    }
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// Object-safe dispatch interface: one request in, one outcome out.
///
/// Implemented by wrapped handler functions, by [`Router`](crate::Router),
/// and by middleware. [`Server::serve`](crate::Server::serve) accepts any of them.
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture<Outcome>;
}

/// A type-erased endpoint shared across concurrent requests.
pub type BoxedEndpoint = Arc<dyn Endpoint>;

impl<E: Endpoint + ?Sized> Endpoint for Arc<E> {
    fn call(&self, req: Request) -> BoxFuture<Outcome> {
        (**self).call(req)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoOutcome
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self) -> BoxedEndpoint;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_endpoint(self) -> BoxedEndpoint {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` into the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> Endpoint for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Outcome> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

/// Wraps a handler function as a standalone [`BoxedEndpoint`], e.g. to put
/// middleware directly around one function.
pub fn endpoint(handler: impl Handler) -> BoxedEndpoint {
    handler.into_endpoint()
}
