//! Minimal faultgate example — a page, an API, and the exception middleware.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!   FAULTGATE_ENVIRONMENT=diagnostic cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/API/ApiError        # 500, detail table or redacted
//!   curl -i http://localhost:3000/Home/Broken         # 302 to /Home/Error (operational)
//!   curl -i http://localhost:3000/API/orders/abc      # `?` on a parse error
//!   curl -i -H 'x-user: alice' http://localhost:3000/API/ApiError

use faultgate::audit::TracingSink;
use faultgate::middleware::ExceptionMiddleware;
use faultgate::{
    BoxFuture, Endpoint, Fault, HandlerConfig, Identity, Outcome, Request, Response, Router,
    Server, fault,
};

#[tokio::main]
async fn main() -> Result<(), faultgate::Error> {
    tracing_subscriber::fmt::init();

    let config = HandlerConfig {
        api_prefixes: vec!["/API/".to_owned()],
        error_page: "/Home/Error".to_owned(),
        log_exceptions: true,
        ..HandlerConfig::default()
    }
    .with_process_env("FAULTGATE")?;

    let app = Router::new()
        .get("/Home/Index",      index)
        .get("/Home/Error",      error_page)
        .get("/Home/Broken",     broken_page)
        .get("/API/ApiError",    api_error)
        .get("/API/orders/{id}", get_order);

    // FAULTGATE_LOG_FILE picks a JSON-lines file; otherwise records go to
    // the log.
    let mut app = ExceptionMiddleware::builder(app).config(&config);
    if config.log_file.is_none() {
        app = app.sink(TracingSink);
    }
    let app = app.build();

    Server::bind("0.0.0.0:3000")?
        .serve(HeaderIdentity(app))
        .await
}

/// Stand-in for real authentication: trusts an `x-user` header.
struct HeaderIdentity<E>(E);

impl<E: Endpoint> Endpoint for HeaderIdentity<E> {
    fn call(&self, mut req: Request) -> BoxFuture<Outcome> {
        let identity = match req.header("x-user") {
            Some(name) => Identity::named(name),
            None => Identity::anonymous(),
        };
        req.set_identity(identity);
        self.0.call(req)
    }
}

async fn index(_req: Request) -> &'static str {
    "Home"
}

async fn error_page(_req: Request) -> &'static str {
    "An error occurred while processing your request."
}

async fn broken_page(_req: Request) -> Result<Response, Fault> {
    Err(fault!("Testing the exception handler from a page"))
}

// GET /API/ApiError
async fn api_error(_req: Request) -> Result<Response, Fault> {
    Err(fault!("Testing the exception handler from a Web API method"))
}

// GET /API/orders/{id}
//
// A non-numeric id fails the parse; `?` turns it into a fault.
async fn get_order(req: Request) -> Result<Response, Fault> {
    let id: u64 = req.param("id").unwrap_or("").parse()?;
    Ok(Response::json(format!(r#"{{"id":{id},"status":"shipped"}}"#).into_bytes()))
}
