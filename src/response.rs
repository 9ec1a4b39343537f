//! Outgoing response assembly and finalization.
//!
//! Handlers receive a [`Response`], write a status and a structured body
//! into it, and hand it back. The dispatcher then merges its own headers
//! (cache, rate-limit, deprecation) and finalizes — finalization consumes
//! the value, so a response can only ever be sent once. The result is a
//! [`Finalized`]: plain status + headers + body bytes for the transport to
//! write.

use serde_json::Value;

use crate::method::Method;
use crate::request::RequestContext;
use crate::status::Status;

const POWERED_BY: &str = concat!("blubber/", env!("CARGO_PKG_VERSION"));
const HSTS: &str = "max-age=15768000; includeSubDomains";

// ── Headers ───────────────────────────────────────────────────────────────────

/// An ordered header map. Setting an existing name replaces its value
/// (case-insensitive), so later writers win on conflict.
#[derive(Clone, Debug, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets every entry of `other`, later entries overriding earlier ones.
    pub fn merge(&mut self, other: impl IntoIterator<Item = (String, String)>) {
        for (name, value) in other {
            self.set(name, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Headers {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        headers.merge(iter);
        headers
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// A response under construction.
///
/// The body is a structured JSON value (conventionally an object) that is
/// serialized at finalization time.
#[derive(Debug)]
pub struct Response {
    status: Status,
    content: Value,
    headers: Headers,
}

impl Response {
    pub fn new() -> Self {
        Self { status: Status::Ok, content: Value::Null, headers: Headers::new() }
    }

    /// Sets the status code and body in one call.
    pub fn write(&mut self, status: Status, content: Value) -> &mut Self {
        self.status = status;
        self.content = content;
        self
    }

    /// Merges headers into the response; later values win per name.
    pub fn headers(
        &mut self,
        headers: impl IntoIterator<Item = (String, String)>,
    ) -> &mut Self {
        self.headers.merge(headers);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Terminal step: applies the framework's header and body rules and
    /// produces the wire form. `extra` headers override the handler's own.
    pub(crate) fn finalize(
        self,
        ctx: &RequestContext,
        extra: Headers,
        settings: &SendSettings<'_>,
    ) -> Finalized {
        let suppressed = matches!(ctx.method(), Method::Head | Method::Options);

        // HEAD and OPTIONS responses collapse to 204 unless revalidation
        // already decided on a 304.
        let status = if suppressed && self.status != Status::NotModified {
            Status::NoContent
        } else {
            self.status
        };

        let mut headers = self.headers;
        headers.merge(extra);

        headers.set("Status", status.to_string());
        headers.set("X-Powered-By", POWERED_BY);

        let mut body = if suppressed || is_empty_content(&self.content) {
            Vec::new()
        } else {
            serde_json::to_vec(&self.content).unwrap_or_default()
        };

        if !body.is_empty() {
            if settings.compress && ctx.accepts_gzip() {
                if let Some(compressed) = gzip(&body) {
                    body = compressed;
                    headers.set("Content-Encoding", "gzip");
                }
            }
            headers.set("Content-Language", settings.lang);
            headers.set("Content-Type", settings.content_type);
            headers.set("Content-Length", body.len().to_string());
        }

        headers.set("X-Request-ID", ctx.request_id());
        headers.set("X-Request-Time", format!("{:.6}", ctx.elapsed_secs()));

        headers.set("X-Frame-Options", "sameorigin");
        headers.set("X-XSS-Protection", "1; mode=block");
        headers.set("X-Content-Type-Options", "nosniff");

        if ctx.is_secure() {
            headers.set("Strict-Transport-Security", HSTS);
        }

        Finalized { status, headers, body }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-send parameters the dispatcher resolves from its options and the
/// negotiated language.
pub(crate) struct SendSettings<'a> {
    pub lang: &'a str,
    pub content_type: &'a str,
    pub compress: bool,
}

fn is_empty_content(content: &Value) -> bool {
    match content {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn gzip(data: &[u8]) -> Option<Vec<u8>> {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len()), Compression::default());
    encoder.write_all(data).ok()?;
    encoder.finish().ok()
}

// ── Finalized ─────────────────────────────────────────────────────────────────

/// A sent response: nothing can be written to it anymore.
#[derive(Debug)]
pub struct Finalized {
    status: Status,
    headers: Headers,
    body: Vec<u8>,
}

impl Finalized {
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}
