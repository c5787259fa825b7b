//! End-to-end behaviour of the exception middleware sitting on a router.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use faultgate::audit::{ExceptionRecord, JsonLinesSink, LogSink, MemorySink};
use faultgate::middleware::ExceptionMiddleware;
use faultgate::{
    BoxFuture, Endpoint, Environment, Fault, HandlerConfig, Identity, Request, Response, Router,
    SinkError, fault,
};
use http::{Method, StatusCode};

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn api_error(_req: Request) -> Result<Response, Fault> {
    Err(fault!("Testing the API exception handler"))
}

async fn page_error(_req: Request) -> Result<Response, Fault> {
    Err(fault!("Testing the page exception handler"))
}

async fn parse_id(req: Request) -> Result<Response, Fault> {
    let id: u32 = req.param("id").unwrap_or("").parse()?;
    Ok(Response::text(id.to_string()))
}

async fn error_page(_req: Request) -> &'static str {
    "Sorry, something went wrong."
}

fn app() -> Router {
    Router::new()
        .get("/API/ApiError", api_error)
        .get("/API/items/{id}", parse_id)
        .get("/Home/Broken", page_error)
        .get("/Home/Error", error_page)
}

fn get(path: &str) -> Request {
    Request::new(Method::GET, path)
}

fn body_text(res: &Response) -> String {
    String::from_utf8(res.body().as_bytes().expect("full body").to_vec()).unwrap()
}

async fn wait_for(sink: &MemorySink, n: usize) {
    for _ in 0..200 {
        if sink.len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("sink never reached {n} records");
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Takes a long time to write anything.
struct SlowSink {
    delay: Duration,
    started: Arc<AtomicUsize>,
}

impl LogSink for SlowSink {
    fn append(&self, _record: ExceptionRecord) -> BoxFuture<Result<(), SinkError>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(())
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn operational_posture_hides_details() {
    let mw = ExceptionMiddleware::builder(app())
        .environment(Environment::Operational)
        .api_prefixes(["/API/"])
        .error_page("/Home/Error")
        .build();

    let res = mw.call(get("/API/ApiError")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.header("content-type"), Some("text/html"));
    assert_eq!(body_text(&res), "Internal server error");

    let res = mw.call(get("/Home/Broken")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::FOUND);
    assert_eq!(res.header("location"), Some("/Home/Error"));
    assert_eq!(body_text(&res), "");
}

#[tokio::test]
async fn diagnostic_posture_shows_api_details_and_rethrows_pages() {
    let mw = ExceptionMiddleware::builder(app())
        .environment(Environment::Diagnostic)
        .api_prefixes(["API"])
        .build();

    let res = mw.call(get("/api/apierror")).await;
    // Route lookup is case-sensitive, classification is not: this is a 404
    // from the router, not a fault.
    assert_eq!(res.unwrap().status_code(), StatusCode::NOT_FOUND);

    let res = mw.call(get("/API/ApiError")).await.unwrap();
    let body = body_text(&res);
    assert!(body.contains("Testing the API exception handler"));
    assert!(body.contains("api_error()"));
    assert!(body.contains("/pipeline.rs"));
    assert!(body.contains("<td>Line Number:</td>"));

    let fault = mw.call(get("/Home/Broken")).await.unwrap_err();
    assert_eq!(fault.message(), "Testing the page exception handler");
}

#[tokio::test]
async fn converted_errors_keep_their_message() {
    let mw = ExceptionMiddleware::builder(app())
        .environment(Environment::Diagnostic)
        .api_prefixes(["/API"])
        .build();

    let res = mw.call(get("/API/items/seven")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(&res).contains("invalid digit found in string"));

    let res = mw.call(get("/API/items/7")).await.unwrap();
    assert_eq!(body_text(&res), "7");
}

#[tokio::test]
async fn slow_sink_does_not_delay_the_response() {
    let started = Arc::new(AtomicUsize::new(0));
    let mw = ExceptionMiddleware::builder(app())
        .environment(Environment::Operational)
        .api_prefixes(["/API/"])
        .log_exceptions(true)
        .sink(SlowSink { delay: Duration::from_secs(3), started: Arc::clone(&started) })
        .log_timeout(Duration::from_secs(10))
        .build();

    let t0 = Instant::now();
    let res = mw.call(get("/API/ApiError")).await.unwrap();
    let elapsed = t0.elapsed();

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(elapsed < Duration::from_millis(500), "response took {elapsed:?}");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_faults_are_all_recorded() {
    let sink = MemorySink::new();
    let mw = Arc::new(
        ExceptionMiddleware::builder(app())
            .api_prefixes(["/API/"])
            .log_exceptions(true)
            .sink(sink.clone())
            .build(),
    );

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..16_u16 {
        let mw = Arc::clone(&mw);
        tasks.spawn(async move {
            let req = get("/API/ApiError")
                .with_remote_addr(format!("10.0.0.{i}:8080").parse().unwrap())
                .with_identity(Identity::named(format!("user{i}")));
            mw.call(req).await.map(|r| r.status_code())
        });
    }
    while let Some(res) = tasks.join_next().await {
        assert_eq!(res.unwrap().unwrap(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    wait_for(&sink, 16).await;
    let records = sink.records();
    let mut ids: Vec<_> = records.iter().map(ExceptionRecord::id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert!(records.iter().all(|r| r.user_name().starts_with("user")));
}

#[tokio::test]
async fn unauthenticated_unplaceable_caller_is_unknown() {
    let sink = MemorySink::new();
    let mw = ExceptionMiddleware::builder(app())
        .log_exceptions(true)
        .sink(sink.clone())
        .build();

    mw.call(get("/Home/Broken")).await.unwrap();
    wait_for(&sink, 1).await;

    let rec = &sink.records()[0];
    assert_eq!(rec.user_name(), "Unknown");
    assert_eq!(rec.client_ip(), "Unknown");
    assert_eq!(rec.message(), "Testing the page exception handler");
    assert!(rec.method().ends_with("page_error()"));
}

#[tokio::test]
async fn unreachable_file_sink_only_fails_at_log_time() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = HandlerConfig {
        log_exceptions: true,
        log_file: Some(dir.path().join("no/such/dir/exceptions.jsonl")),
        api_prefixes: vec!["/API/".to_owned()],
        ..HandlerConfig::default()
    };

    let mw = ExceptionMiddleware::from_config(app(), &cfg);
    let res = mw.call(get("/API/ApiError")).await.unwrap();
    assert_eq!(body_text(&res), "Internal server error");
}

#[tokio::test]
async fn file_sink_from_config_persists_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exceptions.jsonl");
    let cfg = HandlerConfig::from_toml_str(&format!(
        r#"
        environment    = "production"
        api_prefixes   = ["/API/"]
        error_page     = "/Home/Error"
        log_exceptions = true
        log_file       = {path:?}
        "#
    ))
    .unwrap();

    let mw = ExceptionMiddleware::from_config(app(), &cfg);
    let res = mw.call(get("/Home/Broken")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::FOUND);

    let mut text = String::new();
    for _ in 0..200 {
        text = std::fs::read_to_string(&path).unwrap_or_default();
        if !text.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let rec: ExceptionRecord = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(rec.message(), "Testing the page exception handler");

    // The path handed to the sink is the configured one.
    assert_eq!(JsonLinesSink::new(&path).path(), path.as_path());
}
