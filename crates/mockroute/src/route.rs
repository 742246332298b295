//! Route declarations
//!
//! A [`Route`] describes one endpoint the client under test is expected to
//! call: which requests it answers, what it answers with, and which checks
//! must hold. Routes are configured with chained setters and then handed to
//! [`MockServerBuilder::add`](crate::MockServerBuilder::add). The builder
//! takes ownership, so a route cannot be reconfigured once the server runs.

use crate::check::{self, CallBound, FinalCheck, RuntimeCheck};
use crate::request::InboundRequest;
use bytes::Bytes;
use http::{Method, StatusCode};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// `text/html`, the default response content type.
pub const HTML: &str = "text/html";

/// `application/json`
pub const JSON: &str = "application/json";

type BodyGenerator = dyn Fn() -> String + Send + Sync;

/// Where a route's response body comes from.
#[derive(Clone, Default)]
pub enum ResponseBody {
    /// The same bytes on every call.
    Fixed(Bytes),
    /// Produced anew on every call.
    Generated(Arc<BodyGenerator>),
    #[default]
    Empty,
}

impl ResponseBody {
    fn resolve(&self) -> Bytes {
        match self {
            ResponseBody::Fixed(bytes) => bytes.clone(),
            ResponseBody::Generated(generate) => Bytes::from(generate()),
            ResponseBody::Empty => Bytes::new(),
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Fixed(bytes) => f.debug_tuple("Fixed").field(bytes).finish(),
            ResponseBody::Generated(_) => f.write_str("Generated(..)"),
            ResponseBody::Empty => f.write_str("Empty"),
        }
    }
}

/// The response a route produced for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
}

#[derive(Debug, Default)]
struct RouteState {
    call_count: usize,
    failed: bool,
    diagnostics: Vec<String>,
}

/// An expected endpoint with a canned response and attached checks.
///
/// By default a route answers `GET` requests on every path (`/` prefix) with
/// `200 OK`, `text/html` and an empty body.
///
/// ```rust
/// use mockroute::Route;
///
/// let route = Route::new()
///     .get("/health")
///     .body("OK")
///     .assert_called_at_least(1);
///
/// assert_eq!(route.path_prefix(), "/health");
/// ```
#[derive(Debug)]
pub struct Route {
    method: Method,
    path_prefix: String,
    status: StatusCode,
    content_type: String,
    body: ResponseBody,
    runtime_checks: Vec<RuntimeCheck>,
    final_checks: Vec<FinalCheck>,
    state: Mutex<RouteState>,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path_prefix: "/".to_string(),
            status: StatusCode::OK,
            content_type: HTML.to_string(),
            body: ResponseBody::Empty,
            runtime_checks: Vec::new(),
            final_checks: Vec::new(),
            state: Mutex::new(RouteState::default()),
        }
    }
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    /// Method the route answers. Custom verbs are built with
    /// `Method::from_bytes(b"PURGE")`.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Path prefix the route answers.
    ///
    /// Matching is by prefix, so `/` catches everything. With any-order
    /// dispatch the first declared match wins, so declare catch-alls last.
    pub fn path(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into();
        self
    }

    /// Answers `GET` requests under `prefix`.
    pub fn get(self, prefix: impl Into<String>) -> Self {
        self.method(Method::GET).path(prefix)
    }

    /// Answers `HEAD` requests under `prefix`.
    pub fn head(self, prefix: impl Into<String>) -> Self {
        self.method(Method::HEAD).path(prefix)
    }

    /// Answers `POST` requests under `prefix`.
    pub fn post(self, prefix: impl Into<String>) -> Self {
        self.method(Method::POST).path(prefix)
    }

    /// Answers `PUT` requests under `prefix`.
    pub fn put(self, prefix: impl Into<String>) -> Self {
        self.method(Method::PUT).path(prefix)
    }

    /// Answers `PATCH` requests under `prefix`.
    pub fn patch(self, prefix: impl Into<String>) -> Self {
        self.method(Method::PATCH).path(prefix)
    }

    /// Answers `DELETE` requests under `prefix`.
    pub fn delete(self, prefix: impl Into<String>) -> Self {
        self.method(Method::DELETE).path(prefix)
    }

    /// Response status code. Defaults to `200 OK`.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Response `Content-Type`. Defaults to [`HTML`].
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Fixed response body. Takes precedence over [`body_fn`](Self::body_fn)
    /// whichever is set first.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::Fixed(body.into());
        self
    }

    /// Fixed JSON body, also setting the content type to `application/json`.
    pub fn json(self, body: Value) -> Self {
        self.content_type(JSON).body(body.to_string())
    }

    /// Generates the body on every call. Ignored if a fixed body is set.
    pub fn body_fn<F>(mut self, generate: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        if !matches!(self.body, ResponseBody::Fixed(_)) {
            self.body = ResponseBody::Generated(Arc::new(generate));
        }
        self
    }

    /// Adds a check run against every request this route answers.
    pub fn runtime_check(mut self, check: RuntimeCheck) -> Self {
        self.runtime_checks.push(check);
        self
    }

    /// Adds a check run against the call count when the server closes.
    pub fn final_check(mut self, check: FinalCheck) -> Self {
        self.final_checks.push(check);
        self
    }

    /// The route must be called a number of times within `bound`.
    pub fn assert_called(self, bound: CallBound) -> Self {
        self.final_check(FinalCheck::calls(bound))
    }

    /// The route must be called exactly `n` times.
    pub fn assert_called_exactly(self, n: usize) -> Self {
        self.assert_called(CallBound::Exactly(n))
    }

    /// The route must be called at least `n` times.
    pub fn assert_called_at_least(self, n: usize) -> Self {
        self.assert_called(CallBound::AtLeast(n))
    }

    /// The route must be called at most `n` times.
    pub fn assert_called_at_most(self, n: usize) -> Self {
        self.assert_called(CallBound::AtMost(n))
    }

    /// The route must be called exactly once.
    pub fn assert_called_once(self) -> Self {
        self.assert_called_exactly(1)
    }

    /// The route must not be called at all.
    pub fn assert_never_called(self) -> Self {
        self.assert_called_exactly(0)
    }

    /// Every request must carry `name: value`.
    pub fn assert_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.runtime_check(RuntimeCheck::header(name, value))
    }

    /// Every request must be sent with this `Content-Type`.
    pub fn assert_content_type(self, content_type: impl Into<String>) -> Self {
        self.assert_header(http::header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Every request body must satisfy `predicate`.
    pub fn assert_body<F>(self, predicate: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.runtime_check(RuntimeCheck::body(predicate))
    }

    /// Every request body must equal `expected` byte for byte.
    pub fn assert_body_eq(self, expected: impl Into<String>) -> Self {
        let expected = expected.into();
        self.assert_body(move |body| body == expected.as_bytes())
    }

    /// Every request body must be JSON equal to `expected`, ignoring
    /// whitespace and key order.
    pub fn assert_body_json(self, expected: Value) -> Self {
        self.assert_body(move |body| {
            serde_json::from_slice::<Value>(body)
                .map(|actual| actual == expected)
                .unwrap_or(false)
        })
    }

    pub fn http_method(&self) -> &Method {
        &self.method
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn runtime_checks(&self) -> &[RuntimeCheck] {
        &self.runtime_checks
    }

    pub fn final_checks(&self) -> &[FinalCheck] {
        &self.final_checks
    }

    /// Number of requests this route has answered so far.
    ///
    /// Prefer a call-count assertion; this is for ad hoc inspection.
    pub fn call_count(&self) -> usize {
        self.state().call_count
    }

    pub fn has_failed(&self) -> bool {
        self.state().failed
    }

    /// Failure messages recorded so far, in the order they happened.
    pub fn diagnostics(&self) -> Vec<String> {
        self.state().diagnostics.clone()
    }

    /// True if this route answers `method` on `path`.
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        &self.method == method && path.starts_with(self.path_prefix.as_str())
    }

    /// Answers a request: counts the call, runs every runtime check and
    /// resolves the response body.
    pub fn handle(&self, req: &InboundRequest) -> MockResponse {
        let verdict = check::run_runtime_checks(&self.runtime_checks, req);

        {
            let mut state = self.state();
            state.call_count += 1;
            if verdict.failed {
                state.failed = true;
                for message in &verdict.diagnostics {
                    tracing::warn!(route = %self, "{}", message);
                }
                state.diagnostics.extend(verdict.diagnostics);
            }
        }

        MockResponse {
            status: self.status,
            content_type: self.content_type.clone(),
            body: self.body.resolve(),
        }
    }

    /// Runs every final check against the current call count and returns
    /// whether the route has failed overall.
    ///
    /// Calling it again re-evaluates the same checks. A diagnostic already
    /// recorded is not recorded twice.
    pub fn run_final_checks(&self) -> bool {
        let mut state = self.state();
        let verdict = check::run_final_checks(&self.final_checks, state.call_count);

        if verdict.failed {
            state.failed = true;
            for message in verdict.diagnostics {
                if !state.diagnostics.contains(&message) {
                    tracing::warn!(route = %self, "{}", message);
                    state.diagnostics.push(message);
                }
            }
        }
        state.failed
    }

    fn state(&self) -> MutexGuard<'_, RouteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path_prefix)
    }
}
