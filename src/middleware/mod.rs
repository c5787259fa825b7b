//! Middleware layer.
//!
//! Middleware is an [`Endpoint`](crate::Endpoint) that owns the endpoint it
//! wraps. It sees the request before the handler does and the outcome after.
//!
//! Built in:
//! - [`ExceptionMiddleware`] — turns downstream faults into inline error
//!   bodies, redirects, or controlled rethrows, and audits them.

pub mod classify;
pub mod compose;
mod exception;

pub use classify::{PathClassifier, RoutePrefix, classify};
pub use compose::{ResponseDirective, compose};
pub use exception::{ExceptionMiddleware, ExceptionMiddlewareBuilder};
