//! The application dispatcher.
//!
//! An [`App`] owns the route table, the event registry, the option set, and
//! the namespace declarations. Bootstrap is mutable: declare namespaces,
//! register hooks, register routes, then call [`App::finish`] once.
//! Afterwards the app is shared immutably (behind an `Arc`) and
//! [`App::handle`] runs the request pipeline:
//!
//! ```text
//! SSL check → required headers → user agent → route match → namespace
//!   → method dispatch → auth → conditional cache → rate limit → handler
//!   → header assembly → send
//! ```
//!
//! Each stage returns `Result`; the first failure wins and is converted —
//! in exactly one place — into a terminal error response with the body
//! `{request_id, resource, code, message}`.

use std::ops::Deref;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::warn;

use crate::cache::{self, CacheCheck, CacheEntry};
use crate::error::HttpError;
use crate::events::{self, ErrorReport, EventRegistry, Hook, HookArgs, HookInput, HookReply};
use crate::handler::Handler;
use crate::i18n::I18n;
use crate::method::Method;
use crate::request::{RequestBuilder, RequestContext};
use crate::response::{Finalized, Headers, Response, SendSettings};
use crate::route::{AuthSpec, BindKey, Route};
use crate::status::Status;

const DEFAULT_CONTENT_TYPE: &str = "application/json";

// ── Options ───────────────────────────────────────────────────────────────────

/// Application options. A [`events::CONFIG`] hook may override any of these
/// at bootstrap; unknown keys in its reply are ignored.
#[derive(Clone, Debug)]
pub struct Options {
    /// Gzip response bodies for clients that accept it.
    pub use_output_compression: bool,
    /// Reject requests without a valid user agent (needs a
    /// [`events::USER_AGENT`] hook to define "valid").
    pub require_user_agent: bool,
    /// Answer deprecated-namespace requests with a 301 to the active
    /// namespace instead of serving them.
    pub redirect_old_namespaces: bool,
    /// Reject plain-HTTP requests.
    pub require_https: bool,
    /// Serve every response in this language instead of negotiating from
    /// `Accept-Language`.
    pub force_user_language: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            use_output_compression: false,
            require_user_agent: false,
            redirect_old_namespaces: true,
            require_https: true,
            force_user_language: None,
        }
    }
}

impl Options {
    fn merge_value(&mut self, value: &Value) {
        let Some(map) = value.as_object() else { return };
        if let Some(v) = map.get("use_output_compression").and_then(Value::as_bool) {
            self.use_output_compression = v;
        }
        if let Some(v) = map.get("require_user_agent").and_then(Value::as_bool) {
            self.require_user_agent = v;
        }
        if let Some(v) = map.get("redirect_old_namespaces").and_then(Value::as_bool) {
            self.redirect_old_namespaces = v;
        }
        if let Some(v) = map.get("require_https").and_then(Value::as_bool) {
            self.require_https = v;
        }
        if let Some(v) = map.get("force_user_language").and_then(Value::as_str) {
            self.force_user_language = Some(v.to_owned());
        }
    }
}

// ── Registration scopes ───────────────────────────────────────────────────────

/// Fluent view of one route during registration.
pub struct RouteScope<'a> {
    route: &'a mut Route,
}

impl RouteScope<'_> {
    /// Names the route. Applies once; later calls are ignored.
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.route.rename(name);
        self
    }

    /// Restricts the route to these namespaces (defaults to the
    /// application's declared set).
    pub fn namespaces(
        &mut self,
        namespaces: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.route
            .set_namespaces(namespaces.into_iter().map(Into::into).collect());
        self
    }

    /// Binds a handler for one method. Rebinding replaces silently.
    pub fn bind(&mut self, method: Method, handler: impl Handler) -> MethodScope<'_> {
        self.route
            .bind(BindKey::Method(method), handler.into_boxed_handler());
        MethodScope { route: &mut *self.route, key: BindKey::Method(method) }
    }

    /// Binds the catch-all handler answering any method without its own
    /// binding.
    pub fn any(&mut self, handler: impl Handler) -> MethodScope<'_> {
        self.route.bind(BindKey::Any, handler.into_boxed_handler());
        MethodScope { route: &mut *self.route, key: BindKey::Any }
    }

    pub fn get(&mut self, handler: impl Handler) -> MethodScope<'_> {
        self.bind(Method::Get, handler)
    }

    pub fn head(&mut self, handler: impl Handler) -> MethodScope<'_> {
        self.bind(Method::Head, handler)
    }

    pub fn options(&mut self, handler: impl Handler) -> MethodScope<'_> {
        self.bind(Method::Options, handler)
    }

    pub fn post(&mut self, handler: impl Handler) -> MethodScope<'_> {
        self.bind(Method::Post, handler)
    }

    pub fn patch(&mut self, handler: impl Handler) -> MethodScope<'_> {
        self.bind(Method::Patch, handler)
    }

    pub fn put(&mut self, handler: impl Handler) -> MethodScope<'_> {
        self.bind(Method::Put, handler)
    }

    pub fn delete(&mut self, handler: impl Handler) -> MethodScope<'_> {
        self.bind(Method::Delete, handler)
    }
}

/// Fluent view of one just-bound method, for attaching auth and rate
/// limiting.
pub struct MethodScope<'a> {
    route: &'a mut Route,
    key: BindKey,
}

impl MethodScope<'_> {
    /// Attaches an auth requirement: a single hook name, or an ordered list
    /// tried first-success-wins.
    pub fn auth(self, spec: impl Into<AuthSpec>) -> Self {
        self.route.set_auth(self.key, spec.into());
        self
    }

    /// Attaches a named rate-limit hook at the given cost.
    pub fn rate_limit(self, hook: &str, cost: u32) -> Self {
        self.route.set_rate_limit(self.key, hook, cost);
        self
    }
}

/// Outcome of a catching-mode dispatch ([`App::dispatch`]).
pub enum Dispatched {
    /// No handler is registered under that event name.
    Missing,
    /// The hook's reply, for the caller to interpret.
    Reply(HookReply),
    /// The request is over: either the hook answered with a full response,
    /// or it failed and the error flow produced one. Callers must send this
    /// and stop.
    Terminal(Finalized),
}

// ── Context ───────────────────────────────────────────────────────────────────

/// The handler-facing view of one request: the immutable request data plus
/// the dispatch-time state (auth outcome) and access back into the app.
///
/// Derefs to [`RequestContext`], so `ctx.header(…)`, `ctx.content()` etc.
/// work directly.
#[derive(Clone)]
pub struct Context {
    app: Arc<App>,
    request: Arc<RequestContext>,
    authenticated: Option<String>,
}

impl Context {
    pub fn request(&self) -> &Arc<RequestContext> {
        &self.request
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.is_some()
    }

    /// The name of the auth hook that admitted this request.
    pub fn authenticated_with(&self) -> Option<&str> {
        self.authenticated.as_deref()
    }

    pub fn options(&self) -> &Options {
        &self.app.options
    }

    pub fn has_event_handler(&self, event: &str) -> bool {
        self.app.events.has_handler(event)
    }

    /// Dispatches a named event with the current request attached,
    /// propagating the hook's failure.
    pub async fn dispatch(
        &self,
        event: &str,
        args: HookArgs,
    ) -> Result<Option<HookReply>, HttpError> {
        self.app
            .events
            .dispatch(event, HookInput::new(Some(Arc::clone(&self.request)), args))
            .await
    }
}

impl Deref for Context {
    type Target = RequestContext;

    fn deref(&self) -> &Self::Target {
        &self.request
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

/// The application: route table, event registry, options, namespaces.
pub struct App {
    routes: Vec<Route>,
    events: EventRegistry,
    options: Options,
    namespaces: Vec<String>,
    deprecated: Vec<String>,
    required_headers: Vec<String>,
    i18n: I18n,
    content_type: String,
    finished: bool,
}

impl App {
    /// Creates an app serving the given namespaces (e.g. `["v1", "v2"]`;
    /// the last one is the *active* namespace).
    pub fn new(
        namespaces: impl IntoIterator<Item = impl Into<String>>,
        options: Options,
    ) -> Self {
        Self {
            routes: Vec::new(),
            events: EventRegistry::new(),
            options,
            namespaces: namespaces.into_iter().map(Into::into).collect(),
            deprecated: Vec::new(),
            required_headers: Vec::new(),
            i18n: I18n::new(),
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            finished: false,
        }
    }

    /// Marks namespaces as deprecated: requests addressing them get warning
    /// headers, or a 301 to the active namespace when
    /// [`Options::redirect_old_namespaces`] is set.
    pub fn deprecate_namespaces(
        &mut self,
        namespaces: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.deprecated = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Headers every request must carry; missing ones are a 400.
    pub fn set_required_headers(
        &mut self,
        headers: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.required_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    pub fn i18n(&self) -> &I18n {
        &self.i18n
    }

    pub fn i18n_mut(&mut self) -> &mut I18n {
        &mut self.i18n
    }

    /// Overrides the response content type. Must name a JSON flavor (end in
    /// `json`, e.g. `application/vnd.blubber+json`); anything else keeps
    /// the current value.
    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        if content_type.to_ascii_lowercase().ends_with("json") {
            self.content_type = content_type.to_owned();
        }
        self
    }

    /// Registers a hook under a named event, replacing any previous one.
    pub fn on(&mut self, event: impl Into<String>, hook: impl Hook) -> &mut Self {
        self.events.on(event, hook);
        self
    }

    pub fn has_event_handler(&self, event: &str) -> bool {
        self.events.has_handler(event)
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// Registers a route under a template and configures it inside the
    /// closure.
    ///
    /// ```no_run
    /// # use blubber::{App, Context, HttpError, Options, Params, Response, Status};
    /// # use serde_json::json;
    /// # async fn show(ctx: Context, mut res: Response, params: Params)
    /// #     -> Result<Response, HttpError> { Ok(res) }
    /// # let mut app = App::new(["v1"], Options::default());
    /// app.route("/users/!user_name/*user_action", |r| {
    ///     r.name("users");
    ///     r.get(show).auth("auth.basic").rate_limit("__RATE_LIMIT__", 1);
    /// });
    /// ```
    pub fn route(&mut self, template: &str, configure: impl FnOnce(&mut RouteScope)) -> &mut Self {
        let mut route = Route::new(template);
        let mut scope = RouteScope { route: &mut route };
        configure(&mut scope);
        self.routes.push(route);
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Finishes bootstrap: merges the [`events::CONFIG`] provider's reply
    /// into the options and finalizes every route. Idempotent; must run
    /// before the first [`App::handle`] call.
    pub async fn finish(&mut self) {
        if self.finished {
            return;
        }
        match self
            .events
            .dispatch(events::CONFIG, HookInput::new(None, HookArgs::None))
            .await
        {
            Ok(Some(HookReply::Value(value))) => self.options.merge_value(&value),
            Ok(_) => {}
            Err(err) => warn!("config provider failed, keeping defaults: {err}"),
        }
        for route in &mut self.routes {
            route.finish(&self.namespaces);
        }
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Builds the per-request context, attaching this app's namespace
    /// declarations.
    pub fn context(&self, builder: RequestBuilder) -> Arc<RequestContext> {
        Arc::new(builder.build(self.namespaces.clone(), self.deprecated.clone()))
    }

    // ── Request pipeline ──────────────────────────────────────────────────────

    /// Processes one request to a finalized response. Never fails: every
    /// error becomes a well-formed error response.
    pub async fn handle(self: Arc<Self>, ctx: Arc<RequestContext>) -> Finalized {
        if !self.finished {
            warn!("handle() called before finish(); route defaults are not applied");
        }
        match Self::run(&self, &ctx).await {
            Ok(finalized) => finalized,
            Err(err) => self.fail(&ctx, err).await,
        }
    }

    async fn run(
        this: &Arc<Self>,
        ctx: &Arc<RequestContext>,
    ) -> Result<Finalized, HttpError> {
        let lang = this.lang_for(ctx);

        // SSL check.
        if this.options.require_https && !ctx.is_secure() {
            return Err(HttpError::new(Status::BadRequest, this.t(&lang, "require.https")));
        }

        // Required headers.
        let missing: Vec<&str> = this
            .required_headers
            .iter()
            .map(String::as_str)
            .filter(|name| ctx.header(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(HttpError::new(
                Status::BadRequest,
                format!("{}: {}", this.t(&lang, "missing.required.headers"), missing.join(", ")),
            ));
        }

        // User agent. Without a validator hook, every agent is allowed
        // regardless of the option.
        if this.options.require_user_agent && this.events.has_handler(events::USER_AGENT) {
            let invalid =
                || HttpError::new(Status::BadRequest, this.t(&lang, "invalid.user.agent"));
            let agent = match ctx.user_agent() {
                Some(agent) => agent.to_owned(),
                None => return Err(invalid()),
            };
            let reply = this
                .dispatch_bypass(ctx, events::USER_AGENT, HookArgs::Text(agent))
                .await?;
            if reply.is_some_and(|r| r.is_false()) {
                return Err(invalid());
            }
        }

        // Route match, in registration order.
        let request_path = ctx.request_path();
        let route = this
            .routes
            .iter()
            .find(|route| route.is_valid_path(request_path))
            .ok_or_else(|| HttpError::new(Status::NotFound, this.t(&lang, "route.not.found")))?;

        // Namespace admission.
        if !route.is_valid_namespace(ctx.namespace(), &this.namespaces) {
            return Err(HttpError::new(Status::Forbidden, this.t(&lang, "invalid.namespace")));
        }

        // Method dispatch.
        let allow = route
            .available_methods()
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let binding = route.binding(ctx.method()).ok_or_else(|| {
            HttpError::with_headers(
                Status::MethodNotAllowed,
                this.t(&lang, "method.not.allowed"),
                vec![("Allow".to_owned(), allow.clone())],
            )
        })?;
        let params = route.params(request_path);

        // Auth.
        let authenticated = this.check_auth(ctx, binding.auth.as_ref()).await?;

        // Conditional cache: a 304 ends the request before the rate-limit
        // charge.
        let settings = SendSettings {
            lang: &lang,
            content_type: &this.content_type,
            compress: this.options.use_output_compression,
        };
        let (cache_headers, store_after) =
            match this.check_conditional_cache(ctx, &settings).await? {
                CacheCheck::NotModified(finalized) => return Ok(finalized),
                CacheCheck::NoCache(headers) => (headers, false),
                CacheCheck::Revalidate(headers) => (headers, true),
            };

        // Rate limit.
        let mut rate_headers = Vec::new();
        if let Some(rate) = &binding.rate_limit {
            if this.events.has_handler(&rate.hook) {
                let reply = this
                    .dispatch_bypass(ctx, &rate.hook, HookArgs::Cost(rate.cost))
                    .await?;
                if let Some(HookReply::Headers(headers)) = reply {
                    rate_headers = headers;
                }
            }
        }

        // Handler.
        let context = Context {
            app: Arc::clone(this),
            request: Arc::clone(ctx),
            authenticated,
        };
        let mut response = binding.handler.call(context, Response::new(), params).await?;

        // Store a fresh cache entry for the body we are about to send.
        if store_after {
            let entry = CacheEntry::fresh(response.content());
            this.dispatch_bypass(
                ctx,
                cache::EVENT_SET,
                HookArgs::Entry { key: cache::cache_key(ctx), data: entry.encode() },
            )
            .await?;
        }

        // Header assembly.
        let mut extra = Headers::new();
        extra.merge(cache_headers);
        extra.merge(rate_headers);
        if ctx.method() == Method::Options && response.header("Allow").is_none() {
            extra.set("Allow", allow);
        }

        if let Some(ns) = ctx.namespace() {
            if ctx.deprecated_namespaces().iter().any(|d| d == ns) {
                extra.set("X-Blubber-Warn", this.t(&lang, "deprecated.namespace"));
                if let Some(active) = ctx.active_namespace() {
                    extra.set("X-Blubber-Upgrade", active);
                    if this.options.redirect_old_namespaces {
                        extra.set("Location", format!("/{active}/{request_path}"));
                        response.write(Status::MovedPermanently, Value::Null);
                        return Ok(response.finalize(ctx, extra, &settings));
                    }
                }
            }
        }

        Ok(response.finalize(ctx, extra, &settings))
    }

    /// The terminal error flow: builds the standard error body, notifies
    /// the observer hook (best-effort), and finalizes a response with the
    /// failure's status and headers.
    async fn fail(&self, ctx: &Arc<RequestContext>, err: HttpError) -> Finalized {
        let report = ErrorReport {
            request_id: ctx.request_id().to_owned(),
            resource: ctx.uri().to_owned(),
            code: err.status().code(),
            message: err.message().to_owned(),
        };
        if self.events.has_handler(events::ERROR_OBSERVER) {
            let observed = self
                .dispatch_bypass(ctx, events::ERROR_OBSERVER, HookArgs::Report(report.clone()))
                .await;
            if let Err(observer_err) = observed {
                warn!("error observer failed: {observer_err}");
            }
        }

        let mut response = Response::new();
        response.write(
            err.status(),
            json!({
                "request_id": report.request_id,
                "resource": report.resource,
                "code": report.code,
                "message": report.message,
            }),
        );

        let lang = self.lang_for(ctx);
        let settings = SendSettings {
            lang: &lang,
            content_type: &self.content_type,
            compress: self.options.use_output_compression,
        };
        let extra: Headers = err.headers().iter().cloned().collect();
        response.finalize(ctx, extra, &settings)
    }

    // ── Pipeline pieces ───────────────────────────────────────────────────────

    /// Runs the auth spec for the active method.
    ///
    /// A raised failure from a `Single` hook is terminal. A `Sequence` is
    /// tried in order (skipping unregistered names): the first hook that
    /// neither fails nor answers `false` wins; when every attempt failed,
    /// the last failure is surfaced. A plain `false` reply leaves the
    /// request unauthenticated without ending it.
    async fn check_auth(
        &self,
        ctx: &Arc<RequestContext>,
        spec: Option<&AuthSpec>,
    ) -> Result<Option<String>, HttpError> {
        let Some(spec) = spec else {
            return Ok(None);
        };
        match spec {
            AuthSpec::Single(name) => {
                if !self.events.has_handler(name) {
                    return Ok(None);
                }
                let reply = self.dispatch_bypass(ctx, name, HookArgs::None).await?;
                Ok(match reply {
                    Some(reply) if reply.is_false() => None,
                    _ => Some(name.clone()),
                })
            }
            AuthSpec::Sequence(names) => {
                let mut last_failure = None;
                for name in names {
                    if !self.events.has_handler(name) {
                        continue;
                    }
                    match self.dispatch_bypass(ctx, name, HookArgs::None).await {
                        Ok(Some(reply)) if reply.is_false() => continue,
                        Ok(_) => return Ok(Some(name.clone())),
                        Err(err) => last_failure = Some(err),
                    }
                }
                match last_failure {
                    Some(err) => Err(err),
                    None => Ok(None),
                }
            }
        }
    }

    /// The conditional-cache check of the pipeline.
    async fn check_conditional_cache(
        &self,
        ctx: &Arc<RequestContext>,
        settings: &SendSettings<'_>,
    ) -> Result<CacheCheck, HttpError> {
        let enabled = self.events.has_handler(cache::EVENT_GET)
            && self.events.has_handler(cache::EVENT_SET)
            && self.events.has_handler(cache::EVENT_EXISTS);
        if !enabled {
            return Ok(CacheCheck::NoCache(cache::default_headers()));
        }

        let ttl = match self
            .dispatch_bypass(ctx, cache::EVENT_OPTIONS, HookArgs::None)
            .await?
        {
            Some(HookReply::Value(options)) => options
                .get("ttl")
                .and_then(Value::as_u64)
                .unwrap_or(cache::DEFAULT_TTL),
            _ => cache::DEFAULT_TTL,
        };

        let key = cache::cache_key(ctx);
        let stored = match self
            .dispatch_bypass(ctx, cache::EVENT_GET, HookArgs::Key(key))
            .await?
        {
            Some(HookReply::Value(Value::String(raw))) => CacheEntry::decode(&raw),
            _ => None,
        };
        let Some(entry) = stored else {
            return Ok(CacheCheck::Revalidate(cache::default_headers()));
        };

        let headers = cache::revalidation_headers(&entry, ttl);

        let modified_since = ctx
            .header("If-Modified-Since")
            .and_then(|raw| httpdate::parse_http_date(raw).ok())
            .map(cache::to_unix_secs);
        if let Some(since) = modified_since {
            if entry.last_modified <= since {
                return Ok(CacheCheck::NotModified(not_modified(ctx, headers, settings)));
            }
        }
        if let Some(candidate) = ctx.header("If-None-Match") {
            if candidate.trim_matches('"') == entry.etag {
                return Ok(CacheCheck::NotModified(not_modified(ctx, headers, settings)));
            }
        }

        Ok(CacheCheck::Revalidate(headers))
    }

    /// Catching-mode dispatch, the counterpart of the propagating
    /// [`EventRegistry::dispatch`]: a raised failure is converted into the
    /// terminal error response, and a [`HookReply::Response`] is finalized
    /// on the spot. The pipeline itself threads `Result`s instead, but
    /// hooks invoked outside it (custom events fired from bootstrap code)
    /// get the same any-failure-becomes-a-response guarantee this way.
    pub async fn dispatch(
        &self,
        ctx: &Arc<RequestContext>,
        event: &str,
        args: HookArgs,
    ) -> Dispatched {
        match self.dispatch_bypass(ctx, event, args).await {
            Ok(None) => Dispatched::Missing,
            Ok(Some(HookReply::Response(response))) => {
                let lang = self.lang_for(ctx);
                let settings = SendSettings {
                    lang: &lang,
                    content_type: &self.content_type,
                    compress: self.options.use_output_compression,
                };
                Dispatched::Terminal(response.finalize(ctx, Headers::new(), &settings))
            }
            Ok(Some(reply)) => Dispatched::Reply(reply),
            Err(err) => Dispatched::Terminal(self.fail(ctx, err).await),
        }
    }

    async fn dispatch_bypass(
        &self,
        ctx: &Arc<RequestContext>,
        event: &str,
        args: HookArgs,
    ) -> Result<Option<HookReply>, HttpError> {
        self.events
            .dispatch(event, HookInput::new(Some(Arc::clone(ctx)), args))
            .await
    }

    fn lang_for(&self, ctx: &RequestContext) -> String {
        if let Some(forced) = &self.options.force_user_language {
            if self.i18n.has_lang(forced) {
                return forced.clone();
            }
        }
        self.i18n.negotiate(&ctx.accept_language()).to_owned()
    }

    fn t(&self, lang: &str, key: &str) -> String {
        self.i18n.message(lang, key)
    }
}

fn not_modified(
    ctx: &RequestContext,
    headers: Headers,
    settings: &SendSettings<'_>,
) -> Finalized {
    let mut response = Response::new();
    response.write(Status::NotModified, Value::Null);
    response.finalize(ctx, headers, settings)
}
