//! Embeddable mock HTTP endpoint for testing HTTP clients
//!
//! Declare the routes a client is expected to call, start a [`MockServer`],
//! point the client at it, then close the server to find out whether every
//! expectation was met.
//!
//! ```rust,no_run
//! use mockroute::{MockServer, Route, JSON};
//! use serde_json::json;
//!
//! # async fn demo() -> mockroute::Result<()> {
//! let server = MockServer::builder()
//!     .ordered()
//!     .add(
//!         Route::new()
//!             .post("/login")
//!             .assert_content_type(JSON)
//!             .json(json!({"token": "abc"}))
//!             .assert_called_once(),
//!     )
//!     .add(Route::new().get("/profile").assert_header("authorization", "Bearer abc"))
//!     .run()
//!     .await?;
//!
//! // ... exercise the client against server.url() ...
//!
//! server.verify().await;
//! # Ok(())
//! # }
//! ```

pub mod check;
pub mod config;
pub mod debug;
pub mod dispatch;
pub mod error;
pub mod report;
pub mod request;
pub mod route;
pub mod server;

pub use check::{CallBound, CheckOutcome, FinalCheck, RuntimeCheck};
pub use config::ServerConfig;
pub use debug::DebugFlags;
pub use dispatch::{Dispatch, DispatchPolicy, Dispatcher, UnmatchedReason};
pub use error::{MockError, Result};
pub use http::{Method, StatusCode};
pub use report::{Failure, RouteSummary, TeardownReport};
pub use request::InboundRequest;
pub use route::{MockResponse, ResponseBody, Route, HTML, JSON};
pub use server::{MockServer, MockServerBuilder};
