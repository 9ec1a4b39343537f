//! Conditional-caching support types.
//!
//! The dispatcher checks the cache hooks between authentication and rate
//! limiting. The outcome is a tagged [`CacheCheck`]: caching disabled, a
//! proceed-and-revalidate with headers to merge, or an immediate 304. The
//! decision logic lives in the dispatcher; this module owns the key/etag
//! derivation, the stored-entry codec, and the header sets.

use std::time::{SystemTime, UNIX_EPOCH};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::request::RequestContext;
use crate::response::{Finalized, Headers};

/// Cache read hook: `Key(cache_key)` → string entry or boolean `false`.
pub const EVENT_GET: &str = "cache.get";
/// Cache write hook: `Entry { key, data }`; expiry is the backend's concern.
pub const EVENT_SET: &str = "cache.set";
/// Cache existence hook; required for caching to be considered enabled.
pub const EVENT_EXISTS: &str = "cache.exists";
/// Option provider: a `{ "ttl": seconds }` reply overrides [`DEFAULT_TTL`].
pub const EVENT_OPTIONS: &str = "cache.options";

/// Revalidation window when no `cache.options` hook answers, in seconds.
pub const DEFAULT_TTL: u64 = 300;

/// Outcome of the conditional-cache check.
pub enum CacheCheck {
    /// Caching is disabled (hooks missing); merge the default non-cached
    /// headers and skip the post-handler store.
    NoCache(Headers),
    /// Proceed to the handler, merge these headers, and store a fresh entry
    /// afterwards.
    Revalidate(Headers),
    /// The client's copy is current; this finalized 304 ends the request.
    NotModified(Finalized),
}

/// What the cache stores per key.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CacheEntry {
    /// Unix seconds at which the entry was stored.
    pub last_modified: u64,
    /// Hex MD5 of the serialized response body.
    pub etag: String,
}

impl CacheEntry {
    /// An entry stamped now for the given response body.
    pub fn fresh(body: &Value) -> Self {
        Self { last_modified: now_secs(), etag: etag_for(body) }
    }

    /// Decodes a stored entry; `None` for anything unparsable, which the
    /// dispatcher treats as a cache miss.
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn encode(&self) -> String {
        json!({ "last_modified": self.last_modified, "etag": self.etag }).to_string()
    }
}

/// Cache key for a request: MD5 of the method plus the absolute URI.
pub fn cache_key(ctx: &RequestContext) -> String {
    md5_hex(format!("{} {}", ctx.method(), ctx.location()).as_bytes())
}

/// Entity tag for a response body: MD5 of its serialized JSON.
pub fn etag_for(body: &Value) -> String {
    md5_hex(body.to_string().as_bytes())
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub(crate) fn to_unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn http_date(unix_secs: u64) -> String {
    httpdate::fmt_http_date(UNIX_EPOCH + std::time::Duration::from_secs(unix_secs))
}

fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Headers attached when no caching is in play: everything expires now.
pub(crate) fn default_headers() -> Headers {
    let now = http_date(now_secs());
    let mut headers = Headers::new();
    headers.set("Expires", now.clone());
    headers.set("Cache-Control", "no-cache");
    headers.set("Etag", "");
    headers.set("Last-Modified", now);
    headers
}

/// Revalidation headers for a stored entry under the given TTL.
pub(crate) fn revalidation_headers(entry: &CacheEntry, ttl: u64) -> Headers {
    let expires = entry.last_modified + ttl;
    let remaining = expires.saturating_sub(now_secs());
    let mut headers = Headers::new();
    headers.set("Expires", http_date(expires));
    headers.set(
        "Cache-Control",
        format!("private; must-revalidate; max-age={remaining}"),
    );
    headers.set("Etag", format!("\"{}\"", entry.etag));
    headers.set("Last-Modified", http_date(entry.last_modified));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    #[test]
    fn entry_codec_round_trips() {
        let entry = CacheEntry { last_modified: 1_700_000_000, etag: "abc".into() };
        let decoded = CacheEntry::decode(&entry.encode()).unwrap();
        assert_eq!(decoded.last_modified, entry.last_modified);
        assert_eq!(decoded.etag, entry.etag);
    }

    #[test]
    fn garbage_entries_decode_to_none() {
        assert!(CacheEntry::decode("not json").is_none());
        assert!(CacheEntry::decode(r#"{"etag": 3}"#).is_none());
    }

    #[test]
    fn key_depends_on_method_and_location() {
        let get = RequestContext::builder(Method::Get, "/v1/thing")
            .header("Host", "api.example.com")
            .build(vec!["v1".into()], Vec::new());
        let post = RequestContext::builder(Method::Post, "/v1/thing")
            .header("Host", "api.example.com")
            .build(vec!["v1".into()], Vec::new());
        assert_ne!(cache_key(&get), cache_key(&post));
        assert_eq!(cache_key(&get).len(), 32);
    }

    #[test]
    fn etag_tracks_the_body() {
        let a = etag_for(&json!({"id": 1}));
        let b = etag_for(&json!({"id": 2}));
        assert_ne!(a, b);
        assert_eq!(a, etag_for(&json!({"id": 1})));
    }

    #[test]
    fn revalidation_headers_quote_the_etag() {
        let entry = CacheEntry { last_modified: now_secs(), etag: "abc".into() };
        let headers = revalidation_headers(&entry, 300);
        assert_eq!(headers.get("Etag"), Some("\"abc\""));
        let cc = headers.get("Cache-Control").unwrap();
        assert!(cc.starts_with("private; must-revalidate; max-age="));
    }

    #[test]
    fn default_headers_expire_immediately() {
        let headers = default_headers();
        assert_eq!(headers.get("Cache-Control"), Some("no-cache"));
        assert_eq!(headers.get("Etag"), Some(""));
        assert!(headers.get("Expires").is_some());
        assert!(headers.get("Last-Modified").is_some());
    }
}
