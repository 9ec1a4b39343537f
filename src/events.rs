//! Named-event hook registry.
//!
//! Every extension point in the framework — authentication schemes, rate
//! limiting, conditional caching, user-agent validation, error observation —
//! is a *hook*: a single async closure registered under a string key and
//! invoked by name. At most one handler exists per name; re-registering
//! replaces the previous handler silently. Registration happens during
//! application bootstrap, before any request is served; afterwards the
//! registry is read-only.
//!
//! [`EventRegistry::dispatch`] propagates a hook's failure to the caller
//! (the mode the auth pipeline needs to try alternatives per hook). The
//! catching mode — where an uncaught failure becomes a terminal error
//! response — lives in the dispatcher, which converts the propagated
//! [`HttpError`](crate::HttpError) into the error flow.
//!
//! # How async hooks are stored
//!
//! Hooks of different concrete types live in one `HashMap`, so each is
//! erased behind `Arc<dyn ErasedHook>`; calling one costs an `Arc` clone and
//! a single virtual dispatch. The [`Hook`] trait is sealed and blanket-
//! implemented for any
//! `Fn(HookInput) -> impl Future<Output = Result<HookReply, HttpError>>`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::HttpError;
use crate::request::RequestContext;
use crate::response::Response;
use crate::status::Status;

// ── Reserved event names ──────────────────────────────────────────────────────

/// Config provider, dispatched once at bootstrap; its JSON-object reply is
/// merged over the default option set.
pub const CONFIG: &str = "__CONFIG__";
/// User-agent validator; a `false` reply rejects the request.
pub const USER_AGENT: &str = "__USER_AGENT__";
/// Best-effort error observer; receives an [`ErrorReport`], reply ignored.
pub const ERROR_OBSERVER: &str = "__ERROR__";
/// Default rate-limit hook name, attached at cost 0 to every bound method
/// that declares no explicit rate limit.
pub const RATE_LIMIT: &str = "__RATE_LIMIT__";

// ── Hook I/O types ────────────────────────────────────────────────────────────

/// The standard error body, forwarded to the [`ERROR_OBSERVER`] hook.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorReport {
    pub request_id: String,
    pub resource: String,
    pub code: u16,
    pub message: String,
}

/// Arguments passed to a hook at dispatch time.
#[derive(Clone, Debug)]
pub enum HookArgs {
    None,
    /// A bare string (e.g. the user-agent line).
    Text(String),
    /// The weight charged by a rate-limit invocation.
    Cost(u32),
    /// A storage key (cache reads).
    Key(String),
    /// A storage key plus serialized payload (cache writes).
    Entry { key: String, data: String },
    /// The error body handed to the error observer.
    Report(ErrorReport),
    /// Free-form JSON for user-defined events.
    Value(Value),
}

impl HookArgs {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn cost(&self) -> Option<u32> {
        match self {
            Self::Cost(c) => Some(*c),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Key(k) => Some(k),
            Self::Entry { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn entry(&self) -> Option<(&str, &str)> {
        match self {
            Self::Entry { key, data } => Some((key, data)),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// What a hook hands back on success.
#[derive(Debug)]
pub enum HookReply {
    /// Nothing of interest; the caller proceeds.
    None,
    /// Boolean verdict (user-agent validation, auth schemes).
    Bool(bool),
    /// Headers to merge into the response (rate limiting).
    Headers(Vec<(String, String)>),
    /// Free-form JSON (cache reads, option providers, user events).
    Value(Value),
    /// A fully built response; the caller should treat it as terminal.
    Response(Response),
}

impl HookReply {
    /// `true` only for an explicit boolean `false` reply.
    pub fn is_false(&self) -> bool {
        matches!(self, Self::Bool(false))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Everything a hook gets to see when invoked.
///
/// `request` is absent only for dispatches that happen outside a request —
/// the bootstrap-time [`CONFIG`] provider.
pub struct HookInput {
    request: Option<Arc<RequestContext>>,
    args: HookArgs,
}

impl HookInput {
    pub(crate) fn new(request: Option<Arc<RequestContext>>, args: HookArgs) -> Self {
        Self { request, args }
    }

    /// The active request, failing with a 500 for hooks dispatched where no
    /// request exists.
    pub fn request(&self) -> Result<&Arc<RequestContext>, HttpError> {
        self.request.as_ref().ok_or_else(|| {
            HttpError::new(Status::InternalServerError, "hook dispatched outside a request")
        })
    }

    pub fn args(&self) -> &HookArgs {
        &self.args
    }
}

// ── Hook storage and type erasure ─────────────────────────────────────────────

pub(crate) type HookFuture =
    Pin<Box<dyn Future<Output = Result<HookReply, HttpError>> + Send + 'static>>;

/// Internal dispatch interface; appears in [`Hook`]'s return type, hence
/// `#[doc(hidden)] pub` rather than `pub(crate)`.
#[doc(hidden)]
pub trait ErasedHook {
    fn call(&self, input: HookInput) -> HookFuture;
}

#[doc(hidden)]
pub type BoxedHook = Arc<dyn ErasedHook + Send + Sync + 'static>;

/// Implemented for every valid hook closure.
///
/// Automatically satisfied — never implement it yourself — for any
///
/// ```text
/// Fn(HookInput) -> impl Future<Output = Result<HookReply, HttpError>>
/// ```
pub trait Hook: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_hook(self) -> BoxedHook;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(HookInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HookReply, HttpError>> + Send + 'static,
{
}

impl<F, Fut> Hook for F
where
    F: Fn(HookInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HookReply, HttpError>> + Send + 'static,
{
    fn into_boxed_hook(self) -> BoxedHook {
        Arc::new(FnHook(self))
    }
}

struct FnHook<F>(F);

impl<F, Fut> ErasedHook for FnHook<F>
where
    F: Fn(HookInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HookReply, HttpError>> + Send + 'static,
{
    fn call(&self, input: HookInput) -> HookFuture {
        Box::pin((self.0)(input))
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// The process-wide event-name → handler map.
#[derive(Default)]
pub struct EventRegistry {
    handlers: HashMap<String, BoxedHook>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` under `event`, replacing any previous handler.
    pub fn on(&mut self, event: impl Into<String>, hook: impl Hook) {
        self.handlers.insert(event.into(), hook.into_boxed_hook());
    }

    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Invokes the handler for `event`, propagating its failure.
    ///
    /// Returns `Ok(None)` when no handler is registered — most hooks are
    /// optional and callers must tolerate their absence.
    pub async fn dispatch(
        &self,
        event: &str,
        input: HookInput,
    ) -> Result<Option<HookReply>, HttpError> {
        match self.handlers.get(event) {
            None => Ok(None),
            Some(hook) => hook.call(input).await.map(Some),
        }
    }
}
