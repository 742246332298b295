//! Teardown reporting

use crate::dispatch::UnmatchedReason;
use crate::route::Route;
use http::Method;
use std::fmt;

/// A problem noticed by the server itself rather than by a route check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// A request that no route answered.
    UnmatchedRequest {
        method: Method,
        path: String,
        reason: UnmatchedReason,
    },
    /// A request whose body could not be read.
    BodyRead {
        method: Method,
        path: String,
        error: String,
    },
    /// A route whose configured response could not be turned into HTTP,
    /// e.g. because its content type is not a valid header value.
    InvalidResponse { route: String, error: String },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::UnmatchedRequest {
                method,
                path,
                reason,
            } => write!(f, "Unexpected endpoint called: {} {} ({})", method, path, reason),
            Failure::BodyRead {
                method,
                path,
                error,
            } => write!(f, "Unable to read the request body of {} {}: {}", method, path, error),
            Failure::InvalidResponse { route, error } => {
                write!(f, "Route {} produced an invalid response: {}", route, error)
            }
        }
    }
}

/// Final state of one declared route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSummary {
    pub method: Method,
    pub path_prefix: String,
    pub call_count: usize,
    pub failed: bool,
    pub diagnostics: Vec<String>,
}

impl RouteSummary {
    pub(crate) fn of(route: &Route, failed: bool) -> Self {
        Self {
            method: route.http_method().clone(),
            path_prefix: route.path_prefix().to_string(),
            call_count: route.call_count(),
            failed,
            diagnostics: route.diagnostics(),
        }
    }
}

/// Aggregate result of a test run, produced when the server is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub routes: Vec<RouteSummary>,
    pub failures: Vec<Failure>,
}

impl TeardownReport {
    /// True when no route failed and the server recorded no failures.
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.routes.iter().all(|r| !r.failed)
    }

    pub fn failed_routes(&self) -> impl Iterator<Item = &RouteSummary> {
        self.routes.iter().filter(|r| r.failed)
    }

    /// Panics with the full report unless the run passed.
    #[track_caller]
    pub fn assert_passed(&self) {
        if !self.passed() {
            panic!("mock server expectations not met\n{}", self);
        }
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            return write!(f, "all {} route(s) passed", self.routes.len());
        }

        for failure in &self.failures {
            writeln!(f, "- {}", failure)?;
        }

        for route in self.failed_routes() {
            writeln!(
                f,
                "- route {} {} failed after {} call(s)",
                route.method, route.path_prefix, route.call_count
            )?;
            for message in &route.diagnostics {
                writeln!(f, "    {}", message)?;
            }
        }

        Ok(())
    }
}
