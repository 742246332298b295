use crate::config::ServerConfig;
use crate::debug::DebugFlags;
use crate::dispatch::{Dispatch, DispatchPolicy, Dispatcher};
use crate::error::{MockError, Result};
use crate::report::{Failure, RouteSummary, TeardownReport};
use crate::request::InboundRequest;
use crate::route::{MockResponse, Route};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// A mock HTTP server answering declared routes.
///
/// ```rust,no_run
/// use mockroute::{MockServer, Route};
///
/// # async fn demo() -> mockroute::Result<()> {
/// let server = MockServer::builder()
///     .add(Route::new().get("/").body("OK...").assert_called_at_least(1))
///     .run()
///     .await?;
///
/// // ... drive the client under test against server.url() ...
///
/// let report = server.close().await?;
/// report.assert_passed();
/// # Ok(())
/// # }
/// ```
pub struct MockServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    serve_task: Option<JoinHandle<()>>,
}

/// Collects routes and settings before the server starts.
#[derive(Debug, Default)]
pub struct MockServerBuilder {
    config: ServerConfig,
    routes: Vec<Route>,
}

impl MockServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            routes: Vec::new(),
        }
    }

    /// Builder seeded from the `MOCKROUTE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::with_config(ServerConfig::from_env()?))
    }

    /// Listen on a specific address instead of a random local port.
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.addr = addr;
        self
    }

    /// Routes must be called in the order they were added.
    pub fn ordered(mut self) -> Self {
        self.config.policy = DispatchPolicy::Ordered;
        self
    }

    /// Routes may be called in any order. This is the default.
    pub fn any_order(mut self) -> Self {
        self.config.policy = DispatchPolicy::AnyOrder;
        self
    }

    pub fn debug(mut self, flags: DebugFlags) -> Self {
        self.config.debug = flags;
        self
    }

    pub fn add(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    /// Binds the listener and starts serving in the background.
    ///
    /// Returns only once the socket is bound, so requests can be sent as soon
    /// as this resolves.
    pub async fn run(self) -> Result<MockServer> {
        let bind_addr = self.config.addr;
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| MockError::Bind {
                addr: bind_addr,
                source,
            })?;
        let addr = listener.local_addr().map_err(MockError::LocalAddr)?;

        let route_count = self.routes.len();
        let shared = Arc::new(Shared::new(
            Dispatcher::new(self.routes, self.config.policy),
            self.config.debug,
        ));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let serve_task = tokio::spawn(serve(listener, shared.clone(), shutdown_rx));

        info!(
            addr = %addr,
            policy = ?self.config.policy,
            routes = route_count,
            "Mock server listening"
        );

        Ok(MockServer {
            addr,
            shared,
            shutdown_tx: Some(shutdown_tx),
            serve_task: Some(serve_task),
        })
    }
}

impl MockServer {
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL clients should connect to, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn base_url(&self) -> String {
        self.url()
    }

    /// Full URL for `path`, which should start with `/`.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.url(), path)
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.shared.dispatcher.policy()
    }

    /// Declared routes, in declaration order.
    pub fn routes(&self) -> &[Arc<Route>] {
        self.shared.dispatcher.routes()
    }

    pub fn route(&self, index: usize) -> Option<&Route> {
        self.routes().get(index).map(|route| route.as_ref())
    }

    /// Failures the server has recorded so far (unmatched requests and the like).
    pub fn failures(&self) -> Vec<Failure> {
        self.shared.failures().clone()
    }

    /// Stops accepting connections, waits for in-flight requests to finish,
    /// then runs every route's final checks.
    ///
    /// An error means the listener could not be shut down cleanly. No checks
    /// run in that case since their results could not be trusted.
    pub async fn close(mut self) -> Result<TeardownReport> {
        info!(addr = %self.addr, "Shutting down mock server");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.serve_task.take() {
            task.await
                .map_err(|err| MockError::Shutdown(err.to_string()))?;
        }

        Ok(self.shared.teardown())
    }

    /// Closes the server and panics unless every expectation was met.
    pub async fn verify(self) {
        match self.close().await {
            Ok(report) => report.assert_passed(),
            Err(err) => panic!("{}", err),
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            warn!(
                addr = %self.addr,
                "Mock server dropped without close(), final checks were not run"
            );
            let _ = tx.send(());
        }
    }
}

/// State shared by the accept loop, every connection task and the handle.
struct Shared {
    dispatcher: Dispatcher,
    debug: DebugFlags,
    failures: Mutex<Vec<Failure>>,
}

impl Shared {
    fn new(dispatcher: Dispatcher, debug: DebugFlags) -> Self {
        Self {
            dispatcher,
            debug,
            failures: Mutex::new(Vec::new()),
        }
    }

    fn failures(&self) -> MutexGuard<'_, Vec<Failure>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, failure: Failure) {
        self.failures().push(failure);
    }

    fn respond(&self, req: &InboundRequest) -> Response<Full<Bytes>> {
        let dispatch = self.dispatcher.dispatch(req.method(), req.path());

        match &dispatch {
            Dispatch::Matched { index, route } => {
                if self.debug.contains(DebugFlags::TRACE) {
                    info!(
                        method = %req.method(),
                        path = %req.path(),
                        route = %route,
                        index = *index,
                        "Endpoint called"
                    );
                }
            }
            Dispatch::Unmatched(reason) => {
                warn!(
                    method = %req.method(),
                    path = %req.path(),
                    reason = %reason,
                    "Unexpected endpoint called"
                );
                self.record(Failure::UnmatchedRequest {
                    method: req.method().clone(),
                    path: req.path().to_string(),
                    reason: reason.clone(),
                });
            }
        }

        self.dump(req);

        if let Err(err) = req.body() {
            warn!(method = %req.method(), path = %req.path(), "Unable to read the request body: {}", err);
            self.record(Failure::BodyRead {
                method: req.method().clone(),
                path: req.path().to_string(),
                error: err.to_string(),
            });
        }

        let Some(route) = dispatch.route() else {
            return plain_response(StatusCode::NOT_FOUND, "No route matched");
        };

        if self.debug.contains(DebugFlags::TRACE) {
            info!(
                route = %route,
                checks = route.runtime_checks().len(),
                "Running request checks"
            );
        }

        let response = route.handle(req);
        into_http(response).unwrap_or_else(|err| {
            error!(route = %route, "Invalid mock response: {}", err);
            self.record(Failure::InvalidResponse {
                route: route.to_string(),
                error: err.to_string(),
            });
            plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Invalid mock response")
        })
    }

    fn dump(&self, req: &InboundRequest) {
        if self.debug.contains(DebugFlags::HEADERS) {
            for (name, value) in req.headers() {
                info!(header = %name, value = ?value, "Request header");
            }
        }

        if self.debug.contains(DebugFlags::BODY) {
            if let Ok(body) = req.body() {
                info!(body = %String::from_utf8_lossy(body), "Request body");
            }
        }
    }

    /// Runs final checks on every route. Never stops at the first failure.
    fn teardown(&self) -> TeardownReport {
        let routes: Vec<RouteSummary> = self
            .dispatcher
            .routes()
            .iter()
            .map(|route| {
                if self.debug.contains(DebugFlags::TRACE) {
                    info!(
                        route = %route,
                        checks = route.final_checks().len(),
                        "Running final checks"
                    );
                }
                let failed = route.run_final_checks();
                RouteSummary::of(route, failed)
            })
            .collect();

        let report = TeardownReport {
            routes,
            failures: self.failures().clone(),
        };

        if !report.passed() {
            warn!("Mock server expectations not met\n{}", report);
        }

        report
    }
}

async fn serve(listener: TcpListener, shared: Arc<Shared>, mut shutdown_rx: oneshot::Receiver<()>) {
    let graceful = GracefulShutdown::new();

    loop {
        tokio::select! {
            res = listener.accept() => {
                match res {
                    Ok((stream, _)) => {
                        let io = TokioIo::new(stream);
                        let shared = shared.clone();
                        let service = service_fn(move |req| handle_request(req, shared.clone()));
                        let conn = graceful.watch(http1::Builder::new().serve_connection(io, service));

                        tokio::spawn(async move {
                            if let Err(err) = conn.await {
                                error!("Error serving connection: {}", err);
                            }
                        });
                    }
                    Err(err) => accept_backoff(&err).await,
                }
            }
            _ = &mut shutdown_rx => break,
        }
    }

    drop(listener);
    graceful.shutdown().await;
}

/// Pause after a failed `accept` so persistent errors such as running out
/// of file descriptors do not spin the loop.
async fn accept_backoff(err: &std::io::Error) {
    error!("Accept error: {}", err);
    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
}

async fn handle_request(
    req: Request<Incoming>,
    shared: Arc<Shared>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();

    let request = match body.collect().await {
        Ok(collected) => InboundRequest::new(parts.method, path, parts.headers, collected.to_bytes()),
        Err(err) => {
            InboundRequest::with_unreadable_body(parts.method, path, parts.headers, err.to_string())
        }
    };

    Ok(shared.respond(&request))
}

fn into_http(response: MockResponse) -> std::result::Result<Response<Full<Bytes>>, http::Error> {
    Response::builder()
        .status(response.status)
        .header(CONTENT_TYPE, response.content_type.as_str())
        .body(Full::new(response.body))
}

fn plain_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method};

    fn shared(routes: Vec<Route>, policy: DispatchPolicy) -> Shared {
        Shared::new(Dispatcher::new(routes, policy), DebugFlags::ALL)
    }

    fn request(method: Method, path: &str) -> InboundRequest {
        InboundRequest::new(method, path, HeaderMap::new(), Bytes::new())
    }

    #[test]
    fn matched_request_gets_route_response() {
        let shared = shared(
            vec![Route::new()
                .get("/")
                .status(StatusCode::CREATED)
                .content_type("text/plain")
                .body("OK...")],
            DispatchPolicy::AnyOrder,
        );

        let response = shared.respond(&request(Method::GET, "/"));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert!(shared.failures().is_empty());
    }

    #[test]
    fn unmatched_request_is_recorded_and_answered_404() {
        let shared = shared(vec![Route::new().get("/users")], DispatchPolicy::AnyOrder);

        let response = shared.respond(&request(Method::DELETE, "/users/1"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let failures = shared.failures().clone();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            Failure::UnmatchedRequest { method, path, .. } if method == Method::DELETE && path == "/users/1"
        ));
    }

    #[test]
    fn unreadable_body_is_recorded() {
        let shared = shared(vec![Route::new().post("/upload")], DispatchPolicy::AnyOrder);
        let req = InboundRequest::with_unreadable_body(
            Method::POST,
            "/upload",
            HeaderMap::new(),
            "connection reset",
        );

        let response = shared.respond(&req);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(matches!(&shared.failures()[0], Failure::BodyRead { .. }));
    }

    #[test]
    fn invalid_content_type_is_recorded() {
        let shared = shared(
            vec![Route::new().content_type("bad\nvalue")],
            DispatchPolicy::AnyOrder,
        );

        let response = shared.respond(&request(Method::GET, "/"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(&shared.failures()[0], Failure::InvalidResponse { .. }));
    }

    #[test]
    fn teardown_visits_every_route() {
        let shared = shared(
            vec![
                Route::new().get("/a").assert_called_once(),
                Route::new().get("/b").assert_called_once(),
                Route::new().get("/c").assert_never_called(),
            ],
            DispatchPolicy::AnyOrder,
        );

        shared.respond(&request(Method::GET, "/c"));

        let report = shared.teardown();
        assert!(!report.passed());
        assert_eq!(report.failed_routes().count(), 3);
        assert_eq!(report.routes[2].call_count, 1);
    }

    #[test]
    fn ordered_mismatch_cascades() {
        let shared = shared(
            vec![
                Route::new().get("/x").assert_called_once(),
                Route::new().get("/y").assert_called_once(),
            ],
            DispatchPolicy::Ordered,
        );

        shared.respond(&request(Method::GET, "/y"));
        shared.respond(&request(Method::GET, "/x"));

        let report = shared.teardown();
        assert_eq!(report.failures.len(), 2);
        assert!(report.routes.iter().all(|r| r.call_count == 0 && r.failed));
    }

    #[tokio::test(start_paused = true)]
    async fn accept_error_waits_before_retry() {
        let err = std::io::Error::from_raw_os_error(24);
        let started = tokio::time::Instant::now();

        accept_backoff(&err).await;

        assert!(started.elapsed() >= ACCEPT_RETRY_DELAY);
    }
}
