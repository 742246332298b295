//! Runtime and final checks
//!
//! A check turns a piece of evidence into a [`CheckOutcome`]. Runtime checks
//! look at each request a route answers. Final checks look at the route's call
//! count once the server has stopped. Results only ever accumulate: once a
//! route has failed it stays failed.

use crate::request::InboundRequest;
use std::fmt;
use std::sync::Arc;

/// Result of evaluating one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    /// Failed, with a human-readable diagnostic.
    Fail(String),
}

impl CheckOutcome {
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    /// `Pass` when `ok` holds, otherwise `Fail` with the lazily built message.
    pub fn from_bool(ok: bool, message: impl FnOnce() -> String) -> Self {
        if ok {
            Self::Pass
        } else {
            Self::Fail(message())
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

type RuntimeCheckFn = dyn Fn(&InboundRequest) -> CheckOutcome + Send + Sync;
type FinalCheckFn = dyn Fn(usize) -> CheckOutcome + Send + Sync;

/// A check evaluated against every request matched to a route.
#[derive(Clone)]
pub struct RuntimeCheck {
    name: String,
    check: Arc<RuntimeCheckFn>,
}

impl RuntimeCheck {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&InboundRequest) -> CheckOutcome + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// The request must carry `name: value` exactly.
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();

        Self::new(format!("header {}", name), move |req| match req.header(&name) {
            Some(actual) if actual == value => CheckOutcome::Pass,
            Some(actual) => CheckOutcome::fail(format!(
                "Expecting header {} to be {:?}, got {:?}",
                name, value, actual
            )),
            None => CheckOutcome::fail(format!(
                "Expecting header {} to be {:?}, header is missing",
                name, value
            )),
        })
    }

    /// The request body must satisfy `predicate`.
    ///
    /// Fails when the body could not be read as well as when the predicate
    /// returns false.
    pub fn body<F>(predicate: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        Self::new("body", move |req| match req.body() {
            Ok(body) => CheckOutcome::from_bool(predicate(&body[..]), || {
                format!(
                    "Request body rejected by predicate: {:?}",
                    String::from_utf8_lossy(&body[..])
                )
            }),
            Err(err) => CheckOutcome::fail(format!("Unable to read body from request: {}", err)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, req: &InboundRequest) -> CheckOutcome {
        (self.check)(req)
    }
}

impl fmt::Debug for RuntimeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeCheck").field("name", &self.name).finish()
    }
}

/// Bound on how many times a route may be called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallBound {
    Exactly(usize),
    AtLeast(usize),
    AtMost(usize),
}

impl CallBound {
    pub fn is_satisfied_by(self, count: usize) -> bool {
        match self {
            CallBound::Exactly(n) => count == n,
            CallBound::AtLeast(n) => count >= n,
            CallBound::AtMost(n) => count <= n,
        }
    }

    pub fn check(self, count: usize) -> CheckOutcome {
        CheckOutcome::from_bool(self.is_satisfied_by(count), || {
            format!(
                "Expecting route to be called {}, called {} time(s)",
                self, count
            )
        })
    }
}

impl fmt::Display for CallBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallBound::Exactly(n) => write!(f, "exactly {} time(s)", n),
            CallBound::AtLeast(n) => write!(f, "at least {} time(s)", n),
            CallBound::AtMost(n) => write!(f, "at most {} time(s)", n),
        }
    }
}

/// A check evaluated once at teardown against the final call count.
///
/// Final checks must be pure predicates over the count so that running them
/// twice gives the same answer.
#[derive(Clone)]
pub struct FinalCheck {
    name: String,
    check: Arc<FinalCheckFn>,
}

impl FinalCheck {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(usize) -> CheckOutcome + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn calls(bound: CallBound) -> Self {
        Self::new(format!("called {}", bound), move |count| bound.check(count))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, call_count: usize) -> CheckOutcome {
        (self.check)(call_count)
    }
}

impl fmt::Debug for FinalCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalCheck").field("name", &self.name).finish()
    }
}

/// Aggregated outcome of a batch of checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub failed: bool,
    pub diagnostics: Vec<String>,
}

impl Verdict {
    fn record(&mut self, outcome: CheckOutcome) {
        if let CheckOutcome::Fail(message) = outcome {
            self.failed = true;
            self.diagnostics.push(message);
        }
    }
}

/// Runs every runtime check against `req`. Never stops at the first failure.
pub fn run_runtime_checks(checks: &[RuntimeCheck], req: &InboundRequest) -> Verdict {
    let mut verdict = Verdict::default();
    for check in checks {
        verdict.record(check.evaluate(req));
    }
    verdict
}

/// Runs every final check against `call_count`. Never stops at the first failure.
pub fn run_final_checks(checks: &[FinalCheck], call_count: usize) -> Verdict {
    let mut verdict = Verdict::default();
    for check in checks {
        verdict.record(check.evaluate(call_count));
    }
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, Method};

    fn request_with(headers: HeaderMap, body: &'static str) -> InboundRequest {
        InboundRequest::new(Method::POST, "/submit", headers, Bytes::from(body))
    }

    #[test]
    fn call_bounds_compare_counts() {
        assert!(CallBound::Exactly(3).is_satisfied_by(3));
        assert!(!CallBound::Exactly(3).is_satisfied_by(2));
        assert!(CallBound::AtLeast(1).is_satisfied_by(5));
        assert!(!CallBound::AtLeast(1).is_satisfied_by(0));
        assert!(CallBound::AtMost(2).is_satisfied_by(0));
        assert!(!CallBound::AtMost(2).is_satisfied_by(3));
    }

    #[test]
    fn call_bound_failure_names_expected_and_actual() {
        let outcome = CallBound::AtLeast(2).check(1);
        assert_eq!(
            outcome,
            CheckOutcome::fail("Expecting route to be called at least 2 time(s), called 1 time(s)")
        );
    }

    #[test]
    fn header_check_reports_mismatch_and_missing() {
        let check = RuntimeCheck::header("x-api-key", "secret");

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        assert!(check.evaluate(&request_with(headers, "")).is_pass());

        let mut wrong = HeaderMap::new();
        wrong.insert("x-api-key", "guess".parse().unwrap());
        let outcome = check.evaluate(&request_with(wrong, ""));
        assert!(matches!(outcome, CheckOutcome::Fail(ref m) if m.contains("guess")));

        let outcome = check.evaluate(&request_with(HeaderMap::new(), ""));
        assert!(matches!(outcome, CheckOutcome::Fail(ref m) if m.contains("missing")));
    }

    #[test]
    fn body_check_fails_on_unreadable_body() {
        let check = RuntimeCheck::body(|_| true);
        let req = InboundRequest::with_unreadable_body(
            Method::POST,
            "/submit",
            HeaderMap::new(),
            "connection reset",
        );

        let outcome = check.evaluate(&req);
        assert!(matches!(outcome, CheckOutcome::Fail(ref m) if m.contains("connection reset")));
    }

    #[test]
    fn body_check_applies_predicate() {
        let check = RuntimeCheck::body(|body| body.starts_with(b"{"));

        assert!(check
            .evaluate(&request_with(HeaderMap::new(), "{\"a\":1}"))
            .is_pass());
        assert!(!check
            .evaluate(&request_with(HeaderMap::new(), "plain"))
            .is_pass());
    }

    #[test]
    fn verdict_visits_every_check() {
        let checks = vec![
            FinalCheck::calls(CallBound::Exactly(1)),
            FinalCheck::calls(CallBound::AtLeast(5)),
            FinalCheck::calls(CallBound::AtMost(0)),
        ];

        let verdict = run_final_checks(&checks, 2);
        assert!(verdict.failed);
        assert_eq!(verdict.diagnostics.len(), 3);

        let verdict = run_final_checks(&checks[..1], 1);
        assert_eq!(verdict, Verdict::default());
    }

    #[test]
    fn runtime_verdict_collects_all_failures() {
        let checks = vec![
            RuntimeCheck::header("accept", "application/json"),
            RuntimeCheck::body(|body| body.is_empty()),
            RuntimeCheck::new("always", |_| CheckOutcome::Pass),
        ];

        let verdict = run_runtime_checks(&checks, &request_with(HeaderMap::new(), "data"));
        assert!(verdict.failed);
        assert_eq!(verdict.diagnostics.len(), 2);
    }
}
