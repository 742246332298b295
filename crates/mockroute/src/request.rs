use bytes::Bytes;
use http::{HeaderMap, Method};

/// A request received by the mock server, with its body fully read.
///
/// This is the evidence handed to runtime checks.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Result<Bytes, String>,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            body: Ok(body),
        }
    }

    /// A request whose body could not be read.
    pub fn with_unreadable_body(
        method: Method,
        path: impl Into<String>,
        headers: HeaderMap,
        error: impl Into<String>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            body: Err(error.into()),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The request body, or the error raised while reading it.
    pub fn body(&self) -> Result<&Bytes, &str> {
        self.body.as_ref().map_err(String::as_str)
    }
}
