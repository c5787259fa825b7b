//! # faultgate
//!
//! Exception handling for HTTP services, on a minimal hyper-based host.
//!
//! ## The contract
//!
//! A handler that fails does not get to decide what the client sees. The
//! [`ExceptionMiddleware`](middleware::ExceptionMiddleware) does, from two
//! facts fixed at startup and one per request:
//!
//! - **Environment** — [`Environment::Diagnostic`] shows details,
//!   [`Environment::Operational`] hides them.
//! - **API prefixes** — a request under one of them is answered inline
//!   (`500`, `text/html`); any other request is a page.
//!
//! | Request | Diagnostic | Operational |
//! |---|---|---|
//! | API | 500 with file, method, line | 500 `Internal server error` |
//! | page | fault passed upstream | 302 to the error page |
//!
//! Optionally every fault is written to an audit [`LogSink`](audit::LogSink)
//! on a detached task that never delays the response.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use faultgate::middleware::ExceptionMiddleware;
//! use faultgate::{Environment, Fault, Request, Response, Router, Server, fault};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), faultgate::Error> {
//!     let app = Router::new()
//!         .get("/api/orders/{id}", get_order)
//!         .get("/error",           error_page);
//!
//!     let app = ExceptionMiddleware::builder(app)
//!         .environment(Environment::Operational)
//!         .api_prefixes(["/api"])
//!         .error_page("/error")
//!         .build();
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn get_order(req: Request) -> Result<Response, Fault> {
//!     let id: u64 = req.param("id").unwrap_or("").parse()?;
//!     Err(fault!("order {id} is archived"))
//! }
//!
//! async fn error_page(_req: Request) -> &'static str {
//!     "Something went wrong."
//! }
//! ```

mod config;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod audit;
pub mod fault;
pub mod middleware;

pub use config::{Environment, HandlerConfig};
pub use error::{Error, SinkError};
pub use fault::{Fault, FaultInfo, FaultKind};
pub use handler::{BoxFuture, BoxedEndpoint, Endpoint, Handler, IntoOutcome, Outcome, endpoint};
pub use request::{Identity, Request};
pub use response::{Body, ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
