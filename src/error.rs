//! The structured HTTP failure type.

use std::fmt;

use crate::status::Status;

/// The single failure kind raised by the framework and by hooks.
///
/// Every failing pipeline stage — missing route, failed auth, exceeded rate
/// limit, malformed body — is expressed as an `HttpError` carrying the status
/// code that selects the response, a user-facing message, and any extra
/// headers the terminal response must include (e.g. `X-RateLimit-*` on a 429,
/// `Allow` on a 405). The dispatcher is the only place that converts one into
/// a response; everything else just propagates with `?`.
#[derive(Debug, Clone)]
pub struct HttpError {
    status: Status,
    message: String,
    headers: Vec<(String, String)>,
}

impl HttpError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), headers: Vec::new() }
    }

    /// A failure whose terminal response must carry extra headers.
    pub fn with_headers(
        status: Status,
        message: impl Into<String>,
        headers: Vec<(String, String)>,
    ) -> Self {
        Self { status, message: message.into(), headers }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}
