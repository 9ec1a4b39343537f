//! Incoming-request view.
//!
//! A [`RequestContext`] is built once per request by the transport layer
//! (or by [`App::context`](crate::App::context) in tests), shared behind an
//! `Arc`, and never mutated afterwards. The request id is generated at
//! construction — before any hook runs — and is stable for the request's
//! lifetime. The JSON body is decoded lazily on first access.

use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde_json::Value;
use uuid::Uuid;

use crate::error::HttpError;
use crate::method::Method;
use crate::status::Status;

/// Trims surrounding slashes from a route or request path.
///
/// The root path normalizes to the empty string.
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

// ── RequestContext ────────────────────────────────────────────────────────────

/// Read-only view of one inbound request.
pub struct RequestContext {
    method: Method,
    uri: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    namespaces: Vec<String>,
    deprecated: Vec<String>,
    remote_addr: Option<String>,
    secure: bool,
    request_id: String,
    received_at: Instant,
    decoded: OnceLock<Result<Option<Value>, HttpError>>,
}

impl RequestContext {
    /// Starts building a context for `method` and a request URI (path plus
    /// optional query string).
    pub fn builder(method: Method, uri: &str) -> RequestBuilder {
        RequestBuilder {
            method,
            uri: if uri.starts_with('/') { uri.to_owned() } else { format!("/{uri}") },
            headers: Vec::new(),
            body: Bytes::new(),
            remote_addr: None,
            secure: false,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// The request URI as received: path plus query string.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The normalized path including any namespace prefix; empty for the
    /// root path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, q)| q)
    }

    /// The absolute request URI, reconstructed from the `Host` header.
    pub fn location(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        let host = self.header("Host").unwrap_or("localhost");
        format!("{scheme}://{host}{}", self.uri)
    }

    /// Opaque id generated once per request, before any hook runs.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Seconds elapsed since the request was received.
    pub fn elapsed_secs(&self) -> f64 {
        self.received_at.elapsed().as_secs_f64()
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Peer address as reported by the transport.
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// Client address, honoring `Client-IP` and `X-Forwarded-For` (first
    /// hop) over the socket peer.
    pub fn real_remote_addr(&self) -> Option<String> {
        if let Some(ip) = self.header("Client-IP") {
            return Some(ip.trim().to_owned());
        }
        if let Some(forwarded) = self.header("X-Forwarded-For") {
            if let Some(first) = forwarded.split(',').next() {
                return Some(first.trim().to_owned());
            }
        }
        self.remote_addr.clone()
    }

    // ── Headers ───────────────────────────────────────────────────────────────

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("User-Agent")
    }

    /// `Accept-Language` values ordered by descending `q` weight.
    pub fn accept_language(&self) -> Vec<(String, f32)> {
        self.header("Accept-Language").map(parse_header_value).unwrap_or_default()
    }

    /// `Accept-Encoding` values ordered by descending `q` weight.
    pub fn accept_encoding(&self) -> Vec<(String, f32)> {
        self.header("Accept-Encoding").map(parse_header_value).unwrap_or_default()
    }

    /// Whether the client accepts a gzip-encoded response body.
    pub fn accepts_gzip(&self) -> bool {
        self.accept_encoding().iter().any(|(enc, _)| enc == "gzip")
    }

    /// Parses the `Authorization` header into its scheme and payload.
    pub fn authorization(&self) -> Option<Authorization> {
        let raw = self.header("Authorization")?;
        let (scheme, data) = raw.split_once(' ')?;
        Some(Authorization { scheme: scheme.to_owned(), data: data.trim().to_owned() })
    }

    // ── Namespaces ────────────────────────────────────────────────────────────

    /// The declared namespace the request addressed, if any.
    pub fn namespace(&self) -> Option<&str> {
        let first = self.path.split('/').next()?;
        self.namespaces.iter().find(|ns| ns.as_str() == first).map(String::as_str)
    }

    /// The path with the namespace prefix stripped.
    pub fn request_path(&self) -> &str {
        match self.namespace() {
            Some(ns) => self.path[ns.len()..].trim_start_matches('/'),
            None => &self.path,
        }
    }

    pub fn valid_namespaces(&self) -> &[String] {
        &self.namespaces
    }

    pub fn deprecated_namespaces(&self) -> &[String] {
        &self.deprecated
    }

    /// The currently active namespace — the most recently declared one.
    pub fn active_namespace(&self) -> Option<&str> {
        self.namespaces.last().map(String::as_str)
    }

    // ── Body ──────────────────────────────────────────────────────────────────

    /// Raw body bytes, untouched.
    pub fn content_raw(&self) -> &Bytes {
        &self.body
    }

    /// The body decoded as JSON; decoded once, on first access.
    ///
    /// `Ok(None)` for an empty body; a 400 for a malformed one.
    pub fn content(&self) -> Result<Option<Value>, HttpError> {
        self.decoded
            .get_or_init(|| {
                if self.body.is_empty() {
                    return Ok(None);
                }
                serde_json::from_slice::<Value>(&self.body).map(Some).map_err(|e| {
                    HttpError::new(Status::BadRequest, format!("malformed JSON body: {e}"))
                })
            })
            .clone()
    }
}

// ── Authorization ─────────────────────────────────────────────────────────────

/// Parsed `Authorization` header: `<scheme> <data>`.
#[derive(Clone, Debug)]
pub struct Authorization {
    scheme: String,
    data: String,
}

impl Authorization {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// Decodes the payload as Basic-auth credentials.
    pub fn basic_credentials(&self) -> Result<BasicCredentials, HttpError> {
        let invalid = || HttpError::new(Status::BadRequest, "malformed Basic credentials");
        let decoded = BASE64.decode(self.data.as_bytes()).map_err(|_| invalid())?;
        let text = String::from_utf8(decoded).map_err(|_| invalid())?;
        let (username, password) = text.split_once(':').ok_or_else(invalid)?;
        Ok(BasicCredentials { username: username.to_owned(), password: password.to_owned() })
    }
}

/// Username and password from a Basic `Authorization` header.
#[derive(Clone, Debug)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Builder used by the transport layer and by tests; finished by
/// [`App::context`](crate::App::context), which supplies the application's
/// namespace declarations.
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    remote_addr: Option<String>,
    secure: bool,
}

impl RequestBuilder {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers(
        mut self,
        headers: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub(crate) fn build(
        self,
        namespaces: Vec<String>,
        deprecated: Vec<String>,
    ) -> RequestContext {
        let path_part = self.uri.split('?').next().unwrap_or_default();
        RequestContext {
            method: self.method,
            path: normalize_path(path_part).to_owned(),
            uri: self.uri,
            headers: self.headers,
            body: self.body,
            namespaces,
            deprecated,
            remote_addr: self.remote_addr,
            secure: self.secure,
            request_id: Uuid::new_v4().to_string(),
            received_at: Instant::now(),
            decoded: OnceLock::new(),
        }
    }
}

/// Splits a preference header (`a, b;q=0.5`) into values ordered by
/// descending `q` weight.
fn parse_header_value(value: &str) -> Vec<(String, f32)> {
    let mut out: Vec<(String, f32)> = value
        .replace(' ', "")
        .split(',')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once(";q=") {
            Some((name, q)) => (name.to_owned(), f32::from_str(q).unwrap_or(1.0)),
            None => (part.to_owned(), 1.0),
        })
        .collect();
    out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    out
}
