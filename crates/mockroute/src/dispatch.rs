//! Route selection
//!
//! The [`Dispatcher`] picks at most one declared route for each inbound
//! request, according to a [`DispatchPolicy`].

use crate::error::MockError;
use crate::route::Route;
use http::Method;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

/// How inbound requests are paired with declared routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Routes must be called one after another, in declaration order.
    ///
    /// Every request consumes the next slot, matched or not. A retry or an
    /// unexpected extra call therefore shifts every following expected call
    /// out of its slot, and each of them is reported as unmatched.
    Ordered,
    /// Routes may be called in any order. The first declared route that
    /// matches answers.
    #[default]
    AnyOrder,
}

impl FromStr for DispatchPolicy {
    type Err = MockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ordered" => Ok(Self::Ordered),
            "any" | "any_order" | "any-order" => Ok(Self::AnyOrder),
            other => Err(MockError::Config(format!("unknown dispatch policy `{}`", other))),
        }
    }
}

impl<'de> Deserialize<'de> for DispatchPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Why a request was not paired with a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmatchedReason {
    /// No declared route accepts this method and path.
    NoRouteMatched,
    /// Ordered dispatch: every declared route has already been consumed.
    OrderExhausted,
    /// Ordered dispatch: the route in the current slot does not accept this
    /// request. The slot is consumed anyway.
    OutOfOrder { slot: usize, expected: String },
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchedReason::NoRouteMatched => f.write_str("no declared route matches"),
            UnmatchedReason::OrderExhausted => f.write_str("all ordered routes already consumed"),
            UnmatchedReason::OutOfOrder { slot, expected } => {
                write!(f, "expected {} at position {}", expected, slot)
            }
        }
    }
}

/// Outcome of dispatching one request.
#[derive(Debug)]
pub enum Dispatch<'a> {
    Matched { index: usize, route: &'a Route },
    Unmatched(UnmatchedReason),
}

impl<'a> Dispatch<'a> {
    pub fn route(&self) -> Option<&'a Route> {
        match self {
            Dispatch::Matched { route, .. } => Some(*route),
            Dispatch::Unmatched(_) => None,
        }
    }
}

/// Selects the route answering each request.
///
/// Safe to share between connection tasks: the ordered cursor is read and
/// advanced under a single lock.
#[derive(Debug)]
pub struct Dispatcher {
    routes: Arc<[Arc<Route>]>,
    policy: DispatchPolicy,
    cursor: Mutex<usize>,
}

impl Dispatcher {
    pub fn new(routes: Vec<Route>, policy: DispatchPolicy) -> Self {
        Self {
            routes: routes.into_iter().map(Arc::new).collect(),
            policy,
            cursor: Mutex::new(0),
        }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    pub fn routes(&self) -> &Arc<[Arc<Route>]> {
        &self.routes
    }

    /// Next ordered slot. Equal to the route count once every slot is used.
    pub fn cursor(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dispatch(&self, method: &Method, path: &str) -> Dispatch<'_> {
        match self.policy {
            DispatchPolicy::AnyOrder => self.dispatch_any(method, path),
            DispatchPolicy::Ordered => self.dispatch_ordered(method, path),
        }
    }

    fn dispatch_any(&self, method: &Method, path: &str) -> Dispatch<'_> {
        self.routes
            .iter()
            .enumerate()
            .find(|(_, route)| route.matches(method, path))
            .map(|(index, route)| Dispatch::Matched {
                index,
                route: route.as_ref(),
            })
            .unwrap_or(Dispatch::Unmatched(UnmatchedReason::NoRouteMatched))
    }

    fn dispatch_ordered(&self, method: &Method, path: &str) -> Dispatch<'_> {
        let slot = {
            let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
            if *cursor >= self.routes.len() {
                return Dispatch::Unmatched(UnmatchedReason::OrderExhausted);
            }
            let slot = *cursor;
            *cursor += 1;
            slot
        };

        let route = self.routes[slot].as_ref();
        if route.matches(method, path) {
            Dispatch::Matched { index: slot, route }
        } else {
            Dispatch::Unmatched(UnmatchedReason::OutOfOrder {
                slot,
                expected: route.to_string(),
            })
        }
    }
}
