use std::net::SocketAddr;
use thiserror::Error;

/// Errors that stop a mock server from being usable.
///
/// Problems caused by the traffic itself (unexpected requests, failed checks)
/// are never returned as errors. They are collected and reported by
/// [`TeardownReport`](crate::TeardownReport) once the server is closed.
#[derive(Debug, Error)]
pub enum MockError {
    #[error("Failed to bind mock server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read the bound address: {0}")]
    LocalAddr(#[source] std::io::Error),

    #[error("Mock server shutdown failed: {0}")]
    Shutdown(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = MockError> = std::result::Result<T, E>;
