//! The exception middleware: catches downstream faults and decides what the
//! client sees.
//!
//! ```text
//! call ─► snapshot caller ─► downstream ─┬─ Ok(full body) ─────────────► response
//!                                        ├─ Ok(stream) ─► watch stream ► response
//!                                        └─ Err / panic
//!                                              │
//!                         locate ─► audit (detached) ─► classify ─► compose
//!                                                                     │
//!                                        inline 500 │ 302 redirect │ Err(fault) upstream
//! ```
//!
//! A streamed body that fails after its headers went out cannot be replaced.
//! That fault is logged and audited, and the stream error is passed on so the
//! transport aborts the connection.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{error, warn};

use super::classify::PathClassifier;
use super::compose::compose;
use crate::audit::{AuditLogger, CallerSnapshot, JsonLinesSink, LogSink};
use crate::config::{DEFAULT_LOG_TIMEOUT, Environment, HandlerConfig};
use crate::fault::panic::{install_hook, into_fault};
use crate::fault::{Fault, FaultInfo, locate};
use crate::handler::{BoxFuture, BoxedEndpoint, Endpoint, Outcome};
use crate::request::Request;
use crate::response::Response;

/// Wraps a downstream [`Endpoint`] and resolves every fault it raises into an
/// inline error body, a redirect, or a controlled rethrow.
///
/// ```rust,no_run
/// use faultgate::middleware::ExceptionMiddleware;
/// use faultgate::audit::JsonLinesSink;
/// use faultgate::{Environment, Router, Server};
///
/// # async fn run(app: Router) -> Result<(), faultgate::Error> {
/// let app = ExceptionMiddleware::builder(app)
///     .environment(Environment::Operational)
///     .api_prefixes(["/API/"])
///     .error_page("/Home/Error")
///     .log_exceptions(true)
///     .sink(JsonLinesSink::new("exceptions.jsonl"))
///     .build();
///
/// Server::bind("0.0.0.0:3000")?.serve(app).await
/// # }
/// ```
pub struct ExceptionMiddleware {
    downstream: BoxedEndpoint,
    policy: Arc<Policy>,
}

/// Everything fixed at construction, shared read-only by every request.
struct Policy {
    environment: Environment,
    classifier: PathClassifier,
    error_page: String,
    host_root: String,
    log_exceptions: bool,
    audit: Option<AuditLogger>,
}

impl ExceptionMiddleware {
    pub fn builder(downstream: impl Endpoint) -> ExceptionMiddlewareBuilder {
        ExceptionMiddlewareBuilder {
            downstream: Arc::new(downstream),
            environment: Environment::default(),
            api_prefixes: Vec::new(),
            error_page: HandlerConfig::default().error_page,
            host_root: String::new(),
            log_exceptions: false,
            sink: None,
            log_timeout: DEFAULT_LOG_TIMEOUT,
        }
    }

    /// Builds the middleware straight from a loaded configuration.
    pub fn from_config(downstream: impl Endpoint, config: &HandlerConfig) -> Self {
        Self::builder(downstream).config(config).build()
    }

    pub fn environment(&self) -> Environment {
        self.policy.environment
    }

    pub fn classifier(&self) -> &PathClassifier {
        &self.policy.classifier
    }
}

impl Endpoint for ExceptionMiddleware {
    fn call(&self, req: Request) -> BoxFuture<Outcome> {
        // Read before the request moves downstream; the audit task never
        // sees the request itself.
        let caller = CallerSnapshot::of(&req);
        let path = req.path().to_owned();
        let policy = Arc::clone(&self.policy);

        // Two places to panic: while the downstream builds its future (plain
        // fn bodies, eager middleware) and while that future is polled. Each
        // needs its own catch.
        let started = panic::catch_unwind(AssertUnwindSafe(|| self.downstream.call(req)));

        Box::pin(async move {
            let outcome = match started {
                Ok(fut) => AssertUnwindSafe(fut)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(into_fault(payload))),
                Err(payload) => Err(into_fault(payload)),
            };

            match outcome {
                Ok(res) => Ok(Policy::watch_stream(&policy, res, caller, path)),
                Err(fault) => policy.resolve(fault, caller, &path),
            }
        })
    }
}

impl Policy {
    fn resolve(&self, fault: Fault, caller: CallerSnapshot, path: &str) -> Outcome {
        let info = locate(&fault, &self.host_root);
        error!(
            %path,
            file = %info.source_file,
            method = %info.qualified_method(),
            line = info.line_number,
            kind = ?fault.kind(),
            "unhandled fault: {}",
            fault.message()
        );

        self.audit(caller, &fault, info.clone());

        let is_api = self.classifier.is_api(path);
        match compose(is_api, self.environment, &info, fault.message(), &self.error_page).into_response() {
            Some(res) => Ok(res),
            None => Err(fault),
        }
    }

    /// Streamed bodies can fail after the status line is sent; those faults
    /// get the log-only path.
    fn watch_stream(policy: &Arc<Self>, res: Response, caller: CallerSnapshot, path: String) -> Response {
        if !res.body().is_stream() {
            return res;
        }
        let policy = Arc::clone(policy);
        res.map_body(move |body| {
            body.inspect_fault(move |fault| policy.log_only(fault, caller, &path))
        })
    }

    fn log_only(&self, fault: &Fault, caller: CallerSnapshot, path: &str) {
        let info = locate(fault, &self.host_root);
        error!(
            %path,
            file = %info.source_file,
            method = %info.qualified_method(),
            line = info.line_number,
            "fault after response started, aborting: {}",
            fault.message()
        );
        self.audit(caller, fault, info);
    }

    fn audit(&self, caller: CallerSnapshot, fault: &Fault, info: FaultInfo) {
        if !self.log_exceptions {
            return;
        }
        match &self.audit {
            Some(logger) => {
                logger.log_async(caller, fault, info);
            }
            None => warn!("exception logging is enabled but no log sink is configured"),
        }
    }
}

/// Builder for [`ExceptionMiddleware`]. Obtain via [`ExceptionMiddleware::builder`].
pub struct ExceptionMiddlewareBuilder {
    downstream: BoxedEndpoint,
    environment: Environment,
    api_prefixes: Vec<String>,
    error_page: String,
    host_root: String,
    log_exceptions: bool,
    sink: Option<Arc<dyn LogSink>>,
    log_timeout: Duration,
}

impl ExceptionMiddlewareBuilder {
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// API base paths, in match order.
    pub fn api_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.api_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn error_page(mut self, path: impl Into<String>) -> Self {
        self.error_page = path.into();
        self
    }

    pub fn host_root(mut self, root: impl Into<String>) -> Self {
        self.host_root = root.into();
        self
    }

    pub fn log_exceptions(mut self, enabled: bool) -> Self {
        self.log_exceptions = enabled;
        self
    }

    pub fn sink(self, sink: impl LogSink) -> Self {
        self.shared_sink(Arc::new(sink))
    }

    pub fn shared_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Upper bound on one record write.
    pub fn log_timeout(mut self, timeout: Duration) -> Self {
        self.log_timeout = timeout;
        self
    }

    /// Applies every field of `config`. A configured `log_file` installs a
    /// [`JsonLinesSink`]; the file is not touched until the first fault.
    pub fn config(mut self, config: &HandlerConfig) -> Self {
        self.environment = config.environment;
        self.api_prefixes = config.api_prefixes.clone();
        self.error_page = config.error_page.clone();
        self.host_root = config.host_root.clone();
        self.log_exceptions = config.log_exceptions;
        self.log_timeout = config.log_timeout();
        if let Some(path) = &config.log_file {
            self.sink = Some(Arc::new(JsonLinesSink::new(path)));
        }
        self
    }

    pub fn build(self) -> ExceptionMiddleware {
        install_hook();

        for raw in &self.api_prefixes {
            if raw.trim().trim_matches('/').is_empty() {
                warn!(prefix = %raw, "blank API prefix classifies every request as API");
            }
        }

        let audit = self.sink.map(|sink| AuditLogger::new(sink, self.log_timeout));
        ExceptionMiddleware {
            downstream: self.downstream,
            policy: Arc::new(Policy {
                environment: self.environment,
                classifier: PathClassifier::new(&self.api_prefixes),
                error_page: self.error_page,
                host_root: self.host_root,
                log_exceptions: self.log_exceptions,
                audit,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::handler::endpoint;
    use crate::request::Identity;
    use bytes::Bytes;
    use futures_util::stream;
    use http::{Method, StatusCode};

    async fn fails(_req: Request) -> Result<Response, Fault> {
        Err(crate::fault!("order <{}> not found", 7))
    }

    async fn panics(_req: Request) -> Response {
        let orders: Vec<u32> = Vec::new();
        Response::text(orders[3].to_string())
    }

    async fn fine(_req: Request) -> Response {
        Response::text("ok")
    }

    async fn breaks_midway(_req: Request) -> Response {
        let chunks = stream::iter([Ok(Bytes::from("partial")), Err(Fault::new("disk gone"))]);
        Response::builder().stream(crate::ContentType::Text, chunks)
    }

    fn get(path: &str) -> Request {
        Request::new(Method::GET, path)
    }

    fn middleware(handler: BoxedEndpoint, env: Environment) -> ExceptionMiddleware {
        ExceptionMiddleware::builder(handler)
            .environment(env)
            .api_prefixes(["/API/"])
            .error_page("/Home/Error")
            .build()
    }

    #[tokio::test]
    async fn success_passes_through() {
        let mw = middleware(endpoint(fine), Environment::Operational);
        let res = mw.call(get("/api/x")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn operational_api_fault_is_redacted() {
        let mw = middleware(endpoint(fails), Environment::Operational);
        let res = mw.call(get("/api/orders/7")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.header("content-type"), Some("text/html"));
        assert_eq!(res.body().as_bytes().unwrap().as_ref(), b"Internal server error");
    }

    #[tokio::test]
    async fn diagnostic_api_fault_shows_details() {
        let mw = middleware(endpoint(fails), Environment::Diagnostic);
        let res = mw.call(get("/API/orders/7")).await.unwrap();
        let body = String::from_utf8(res.body().as_bytes().unwrap().to_vec()).unwrap();
        assert!(body.contains("order &lt;7&gt; not found"));
        assert!(body.contains("exception::tests::fails()"));
        assert!(body.contains("/middleware/exception.rs"));
    }

    #[tokio::test]
    async fn operational_page_fault_redirects() {
        let mw = middleware(endpoint(fails), Environment::Operational);
        let res = mw.call(get("/Home/Orders")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("/Home/Error"));
    }

    #[tokio::test]
    async fn diagnostic_page_fault_is_rethrown_unchanged() {
        let mw = middleware(endpoint(fails), Environment::Diagnostic);
        let fault = mw.call(get("/Home/Orders")).await.unwrap_err();
        assert_eq!(fault.message(), "order <7> not found");
        assert_eq!(fault.site().unwrap().function(), Some("fails"));
    }

    #[tokio::test]
    async fn panics_are_caught_like_faults() {
        let mw = middleware(endpoint(panics), Environment::Diagnostic);
        let res = mw.call(get("/api/orders")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8(res.body().as_bytes().unwrap().to_vec()).unwrap();
        assert!(body.contains("index out of bounds"));
    }

    #[tokio::test]
    async fn faults_are_audited_with_the_caller_snapshot() {
        let sink = MemorySink::new();
        let mw = ExceptionMiddleware::builder(endpoint(fails))
            .api_prefixes(["/api"])
            .log_exceptions(true)
            .sink(sink.clone())
            .build();

        let req = get("/api/orders/7")
            .with_remote_addr("10.0.0.9:4000".parse().unwrap())
            .with_identity(Identity::named("carol"));
        mw.call(req).await.unwrap();

        for _ in 0..50 {
            if !sink.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_name(), "carol");
        assert_eq!(records[0].client_ip(), "10.0.0.9");
        assert_eq!(records[0].message(), "order <7> not found");
    }

    #[tokio::test]
    async fn logging_disabled_writes_nothing() {
        let sink = MemorySink::new();
        let mw = ExceptionMiddleware::builder(endpoint(fails))
            .log_exceptions(false)
            .sink(sink.clone())
            .build();
        mw.call(get("/x")).await.unwrap();
        tokio::task::yield_now().await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn logging_without_sink_still_answers() {
        let mw = ExceptionMiddleware::builder(endpoint(fails)).log_exceptions(true).build();
        let res = mw.call(get("/x")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn stream_failure_is_logged_not_rewritten() {
        let sink = MemorySink::new();
        let mw = ExceptionMiddleware::builder(endpoint(breaks_midway))
            .environment(Environment::Operational)
            .api_prefixes(["/api"])
            .log_exceptions(true)
            .sink(sink.clone())
            .build();

        let res = mw.call(get("/api/export")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);

        let fault = res.into_body().collect().await.unwrap_err();
        assert_eq!(fault.message(), "disk gone");

        for _ in 0..50 {
            if !sink.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(sink.records()[0].message(), "disk gone");
    }

    #[test]
    fn config_is_applied() {
        let cfg = HandlerConfig {
            environment: Environment::Diagnostic,
            api_prefixes: vec!["v1/".to_owned()],
            ..HandlerConfig::default()
        };
        let mw = ExceptionMiddleware::from_config(endpoint(fine), &cfg);
        assert_eq!(mw.environment(), Environment::Diagnostic);
        assert!(mw.classifier().is_api("/V1/users"));
    }
}
