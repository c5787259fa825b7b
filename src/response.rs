//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Build a [`Response`] in your handler and return it. Bodies are either
//! complete up front ([`Body::full`]) or streamed ([`Body::stream`]). A
//! streamed body may fail after the status line is already on the wire; see
//! [`ExceptionMiddleware`](crate::middleware::ExceptionMiddleware) for what
//! happens then.

use std::convert::Infallible;
use std::fmt;

use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue, LOCATION};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;

use crate::error::Error;
use crate::fault::Fault;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    EventStream,  // text/event-stream
    Html,         // text/html
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// A response body.
pub struct Body {
    kind: BodyKind,
}

enum BodyKind {
    Full(Bytes),
    Stream(BoxStream<'static, Result<Bytes, Fault>>),
}

impl Body {
    pub fn empty() -> Self {
        Self::full(Bytes::new())
    }

    pub fn full(bytes: impl Into<Bytes>) -> Self {
        Self { kind: BodyKind::Full(bytes.into()) }
    }

    /// A body produced chunk by chunk. An `Err` chunk aborts the response.
    pub fn stream<S>(chunks: S) -> Self
    where
        S: Stream<Item = Result<Bytes, Fault>> + Send + 'static,
    {
        Self { kind: BodyKind::Stream(chunks.boxed()) }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.kind, BodyKind::Stream(_))
    }

    /// The bytes of a full body. `None` for streams.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.kind {
            BodyKind::Full(b) => Some(b),
            BodyKind::Stream(_) => None,
        }
    }

    /// Runs `on_fault` against the first failing chunk of a streamed body.
    /// Later failures pass through unobserved. Full bodies cannot fail and
    /// are returned untouched.
    pub(crate) fn inspect_fault<F>(self, on_fault: F) -> Self
    where
        F: FnOnce(&Fault) + Send + 'static,
    {
        match self.kind {
            BodyKind::Full(_) => self,
            BodyKind::Stream(s) => {
                // A consumer may keep polling after an error; the hook must
                // not see the same failure twice.
                let mut pending = Some(on_fault);
                Self::stream(s.inspect_err(move |f| {
                    if let Some(on_fault) = pending.take() {
                        on_fault(f);
                    }
                }))
            }
        }
    }

    /// Drains the body into memory.
    pub async fn collect(self) -> Result<Bytes, Fault> {
        match self.kind {
            BodyKind::Full(b) => Ok(b),
            BodyKind::Stream(mut s) => {
                let mut buf = Vec::new();
                while let Some(chunk) = s.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.into())
            }
        }
    }

    /// A failing chunk becomes [`Error::BodyAborted`]. Hyper then resets the
    /// connection instead of finishing the response.
    pub(crate) fn into_http(self) -> UnsyncBoxBody<Bytes, Error> {
        match self.kind {
            BodyKind::Full(b) => Full::new(b).map_err(|never: Infallible| match never {}).boxed_unsync(),
            BodyKind::Stream(s) => {
                let frames = s
                    .map_ok(Frame::data)
                    .map_err(|f| Error::BodyAborted(f.message().to_owned()));
                StreamBody::new(frames).boxed_unsync()
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BodyKind::Full(b) => f.debug_tuple("Body::Full").field(&b.len()).finish(),
            BodyKind::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK, no custom headers needed)
///
/// ```rust
/// use faultgate::Response;
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use faultgate::Response;
/// use http::StatusCode;
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: http::HeaderMap,
    pub(crate) body: Body,
}

impl Response {
    /// `200 OK` — `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK` — `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: http::HeaderMap::new(), body: Body::empty() }
    }

    /// `302 Found` pointing at `location`, no body.
    pub fn redirect(location: &str) -> Self {
        Self::builder()
            .status(StatusCode::FOUND)
            .header(LOCATION.as_str(), location)
            .no_body()
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: http::HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &http::HeaderMap { &self.headers }
    pub fn body(&self) -> &Body { &self.body }
    pub fn into_body(self) -> Body { self.body }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub(crate) fn map_body(mut self, f: impl FnOnce(Body) -> Body) -> Self {
        self.body = f(self.body);
        self
    }

    pub(crate) fn into_http(self) -> http::Response<UnsyncBoxBody<Bytes, Error>> {
        let mut res = http::Response::new(self.body.into_http());
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: http::HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Adds a header. Invalid names or values are dropped with a warning.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(n), Ok(v)) => { self.headers.append(n, v); }
            _ => tracing::warn!(header = name, "dropping invalid response header"),
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish(ContentType::Json, Body::full(body))
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text, Body::full(body.into()))
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type, Body::full(body.into()))
    }

    /// Terminate with a streamed body.
    pub fn stream<S>(self, content_type: ContentType, chunks: S) -> Response
    where
        S: Stream<Item = Result<Bytes, Fault>> + Send + 'static,
    {
        self.finish(content_type, Body::stream(chunks))
    }

    /// Terminate with no body (e.g. `204 No Content`, `302 Found`).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Body::empty() }
    }

    fn finish(mut self, content_type: ContentType, body: Body) -> Response {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        Response { status: self.status, headers: self.headers, body }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn builder_sets_content_type_first() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/42")
            .bytes(ContentType::Html, "<p>hi</p>");
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.header("content-type"), Some("text/html"));
        assert_eq!(res.header("location"), Some("/users/42"));
    }

    #[test]
    fn invalid_header_is_dropped() {
        let res = Response::builder().header("bad header", "x").no_body();
        assert!(res.headers().is_empty());
    }

    #[test]
    fn redirect_has_location_and_no_body() {
        let res = Response::redirect("/Home/Error");
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("/Home/Error"));
        assert_eq!(res.body().as_bytes().map(Bytes::len), Some(0));
    }

    #[tokio::test]
    async fn stream_body_collects_until_fault() {
        let ok = Body::stream(stream::iter([Ok(Bytes::from("a")), Ok(Bytes::from("b"))]));
        assert_eq!(ok.collect().await.unwrap(), Bytes::from("ab"));

        let broken = Body::stream(stream::iter([Ok(Bytes::from("a")), Err(Fault::bare("cut"))]));
        assert_eq!(broken.collect().await.unwrap_err().message(), "cut");
    }

    #[tokio::test]
    async fn failing_stream_aborts_the_wire_body() {
        let res = Response::builder().stream(
            ContentType::Text,
            stream::iter([Ok(Bytes::from("partial")), Err(Fault::bare("disk gone"))]),
        );
        let wire = res.into_http();
        assert_eq!(wire.status(), StatusCode::OK);

        let err = BodyExt::collect(wire.into_body()).await.unwrap_err();
        assert!(matches!(&err, Error::BodyAborted(msg) if msg == "disk gone"));
    }

    #[tokio::test]
    async fn fault_hook_fires_once_per_stream() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let body = Body::stream(stream::iter([
            Err(Fault::bare("first")),
            Err(Fault::bare("second")),
            Ok(Bytes::from("tail")),
        ]))
        .inspect_fault(move |f| {
            assert_eq!(f.message(), "first");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let BodyKind::Stream(mut chunks) = body.kind else { panic!("expected a stream") };
        while chunks.next().await.is_some() {}
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn full_body_is_not_a_stream() {
        let body = Body::full("hello");
        assert!(!body.is_stream());
        assert_eq!(body.as_bytes().unwrap().as_ref(), b"hello");
    }
}
