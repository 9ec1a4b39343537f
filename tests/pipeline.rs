//! End-to-end pipeline tests: the app is driven through `App::handle` with
//! hand-built request contexts, exactly as the transport layer would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use blubber::{
    App, AuthSpec, Context, Finalized, HookArgs, HookInput, HookReply, HttpError, KvStore,
    MemoryStore, Method, Options, Params, RateLimiter, RequestBuilder, RequestContext, Response,
    Status, cache, events,
};
use serde_json::{Value, json};

fn insecure() -> Options {
    Options { require_https: false, ..Options::default() }
}

async fn handle(app: &Arc<App>, builder: RequestBuilder) -> Finalized {
    let ctx = app.context(builder);
    Arc::clone(app).handle(ctx).await
}

fn body_json(finalized: &Finalized) -> Value {
    serde_json::from_slice(finalized.body()).expect("JSON body")
}

async fn echo_params(
    ctx: Context,
    mut res: Response,
    params: Params,
) -> Result<Response, HttpError> {
    res.write(
        Status::Ok,
        json!({
            "params": params.to_value(),
            "authenticated_with": ctx.authenticated_with(),
        }),
    );
    Ok(res)
}

async fn ok(_ctx: Context, mut res: Response, _params: Params) -> Result<Response, HttpError> {
    res.write(Status::Ok, json!({ "ok": true }));
    Ok(res)
}

// ── Routing and parameters ────────────────────────────────────────────────────

#[tokio::test]
async fn captures_both_parameters() {
    let mut app = App::new(["v1"], insecure());
    app.route("/users/!user_name/*user_action", |r| {
        r.get(echo_params);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/users/andrew/delete")).await;
    assert_eq!(fin.status(), Status::Ok);
    let body = body_json(&fin);
    assert_eq!(body["params"]["user_name"], "andrew");
    assert_eq!(body["params"]["user_action"], "delete");
}

#[tokio::test]
async fn optional_parameter_is_absent_not_null() {
    let mut app = App::new(["v1"], insecure());
    app.route("/users/!user_name/*user_action", |r| {
        r.get(echo_params);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/users/andrew")).await;
    let body = body_json(&fin);
    assert_eq!(body["params"]["user_name"], "andrew");
    assert!(body["params"].get("user_action").is_none());
}

#[tokio::test]
async fn unmatched_path_is_404_with_error_body() {
    let mut app = App::new(["v1"], insecure());
    app.route("/users/!name", |r| {
        r.get(ok);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/nope/at/all?q=1")).await;
    assert_eq!(fin.status(), Status::NotFound);
    let body = body_json(&fin);
    assert_eq!(body["code"], 404);
    assert_eq!(body["resource"], "/v1/nope/at/all?q=1");
    assert_eq!(body["message"], "Resource not found");
    assert!(!body["request_id"].as_str().unwrap().is_empty());
    assert_eq!(fin.header("X-Request-ID"), body["request_id"].as_str());
}

#[tokio::test]
async fn routes_match_in_registration_order() {
    let mut app = App::new(["v1"], insecure());
    app.route("/users/!name", |r| {
        r.get(echo_params);
    });
    app.route("/users/me", |r| {
        r.get(ok);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/users/me")).await;
    let body = body_json(&fin);
    // The earlier capture route wins.
    assert_eq!(body["params"]["name"], "me");
}

// ── Early pipeline checks ─────────────────────────────────────────────────────

#[tokio::test]
async fn https_is_required_by_default() {
    let mut app = App::new(["v1"], Options::default());
    app.route("/", |r| {
        r.get(ok);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1")).await;
    assert_eq!(fin.status(), Status::BadRequest);
    assert_eq!(body_json(&fin)["message"], "HTTPS is required for all requests");

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1").secure(true)).await;
    assert_eq!(fin.status(), Status::Ok);
    assert!(fin.header("Strict-Transport-Security").is_some());
}

#[tokio::test]
async fn missing_required_headers_are_a_400() {
    let mut app = App::new(["v1"], insecure());
    app.set_required_headers(["X-Api-Key", "X-Client"]);
    app.route("/", |r| {
        r.get(ok);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(
        &app,
        RequestContext::builder(Method::Get, "/v1").header("X-Api-Key", "k"),
    )
    .await;
    assert_eq!(fin.status(), Status::BadRequest);
    let message = body_json(&fin)["message"].as_str().unwrap().to_owned();
    assert!(message.contains("X-Client"));
    assert!(!message.contains("X-Api-Key:"));

    let fin = handle(
        &app,
        RequestContext::builder(Method::Get, "/v1")
            .header("X-Api-Key", "k")
            .header("X-Client", "c"),
    )
    .await;
    assert_eq!(fin.status(), Status::Ok);
}

#[tokio::test]
async fn user_agent_hook_screens_requests() {
    let mut app = App::new(
        ["v1"],
        Options { require_user_agent: true, ..insecure() },
    );
    app.on(events::USER_AGENT, |input: HookInput| async move {
        let agent = input.args().text().unwrap_or_default();
        Ok(HookReply::Bool(!agent.contains("BadBot")))
    });
    app.route("/", |r| {
        r.get(ok);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(
        &app,
        RequestContext::builder(Method::Get, "/v1").header("User-Agent", "BadBot/1.0"),
    )
    .await;
    assert_eq!(fin.status(), Status::BadRequest);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1")).await;
    assert_eq!(fin.status(), Status::BadRequest);

    let fin = handle(
        &app,
        RequestContext::builder(Method::Get, "/v1").header("User-Agent", "curl/8.0"),
    )
    .await;
    assert_eq!(fin.status(), Status::Ok);
}

#[tokio::test]
async fn unprefixed_request_hits_the_namespace_wall() {
    let mut app = App::new(["v1"], insecure());
    app.route("/users/!name", |r| {
        r.get(ok);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/users/andrew")).await;
    assert_eq!(fin.status(), Status::Forbidden);
    assert_eq!(body_json(&fin)["message"], "Invalid namespace for this resource");
}

#[tokio::test]
async fn unbound_method_is_405_with_allow() {
    let mut app = App::new(["v1"], insecure());
    app.route("/users/!name", |r| {
        r.get(ok);
        r.delete(ok);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Post, "/v1/users/andrew")).await;
    assert_eq!(fin.status(), Status::MethodNotAllowed);
    assert_eq!(fin.header("Allow"), Some("GET, DELETE"));
}

#[tokio::test]
async fn any_binding_answers_other_methods() {
    let mut app = App::new(["v1"], insecure());
    app.route("/anything", |r| {
        r.any(ok);
    });
    app.finish().await;
    let app = Arc::new(app);

    for method in [Method::Get, Method::Post, Method::Patch] {
        let fin = handle(&app, RequestContext::builder(method, "/v1/anything")).await;
        assert_eq!(fin.status(), Status::Ok, "{method}");
    }
}

// ── Auth ──────────────────────────────────────────────────────────────────────

fn auth_app(specs: AuthSpec) -> App {
    let mut app = App::new(["v1"], insecure());
    app.on("auth.fail-a", |_input: HookInput| async {
        Err(HttpError::new(Status::Unauthorized, "a denied"))
    });
    app.on("auth.fail-b", |_input: HookInput| async {
        Err(HttpError::new(Status::Forbidden, "b denied"))
    });
    app.on("auth.pass", |_input: HookInput| async { Ok(HookReply::Bool(true)) });
    app.route("/secret", |r| {
        r.get(echo_params).auth(specs);
    });
    app
}

#[tokio::test]
async fn auth_list_first_success_wins() {
    let mut app = auth_app(AuthSpec::any_of(["auth.fail-a", "auth.pass", "auth.fail-b"]));
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/secret")).await;
    assert_eq!(fin.status(), Status::Ok);
    assert_eq!(body_json(&fin)["authenticated_with"], "auth.pass");
}

#[tokio::test]
async fn auth_list_reports_the_last_failure() {
    let mut app = auth_app(AuthSpec::any_of(["auth.fail-a", "auth.fail-b"]));
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/secret")).await;
    assert_eq!(fin.status(), Status::Forbidden);
    assert_eq!(body_json(&fin)["message"], "b denied");
}

#[tokio::test]
async fn single_auth_failure_is_terminal() {
    let mut app = auth_app(AuthSpec::Single("auth.fail-a".to_owned()));
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/secret")).await;
    assert_eq!(fin.status(), Status::Unauthorized);
    assert_eq!(body_json(&fin)["message"], "a denied");
}

#[tokio::test]
async fn no_auth_spec_leaves_request_unauthenticated() {
    let mut app = App::new(["v1"], insecure());
    app.route("/open", |r| {
        r.get(echo_params);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/open")).await;
    assert_eq!(fin.status(), Status::Ok);
    assert!(body_json(&fin)["authenticated_with"].is_null());
}

// ── Rate limiting ─────────────────────────────────────────────────────────────

fn limited_app(limit: u64, cost: u32) -> App {
    let mut app = App::new(["v1"], insecure());
    let limiter = Arc::new(RateLimiter::new(
        Arc::new(MemoryStore::new()),
        limit,
        Duration::from_secs(3600),
    ));
    app.on(events::RATE_LIMIT, move |input: HookInput| {
        let limiter = Arc::clone(&limiter);
        async move {
            let charged = input.args().cost().unwrap_or(1);
            let headers = limiter.check("client", charged).await?;
            Ok(HookReply::Headers(headers))
        }
    });
    app.route("/limited", |r| {
        r.get(ok).rate_limit(events::RATE_LIMIT, cost);
    });
    app.route("/unlimited", |r| {
        r.get(ok);
    });
    app
}

#[tokio::test]
async fn sixty_first_request_in_the_window_is_a_429() {
    let mut app = limited_app(60, 1);
    app.finish().await;
    let app = Arc::new(app);

    for i in 0..60 {
        let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/limited")).await;
        assert_eq!(fin.status(), Status::Ok, "request {i}");
        assert!(fin.header("X-RateLimit-Remaining").is_some());
    }

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/limited")).await;
    assert_eq!(fin.status(), Status::TooManyRequests);
    assert_eq!(fin.header("X-RateLimit-Remaining"), Some("0"));
    assert_eq!(body_json(&fin)["code"], 429);
}

#[tokio::test]
async fn default_cost_zero_never_limits() {
    // The route declares no rate limit, so finalization attaches the
    // default hook at cost zero: invoked, never limiting.
    let mut app = limited_app(2, 1);
    app.finish().await;
    let app = Arc::new(app);

    for _ in 0..20 {
        let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/unlimited")).await;
        assert_eq!(fin.status(), Status::Ok);
        assert_eq!(fin.header("X-RateLimit-Limit"), Some("2"));
    }
}

// ── Conditional caching ───────────────────────────────────────────────────────

fn cached_app() -> App {
    let mut app = App::new(["v1"], insecure());
    let store = Arc::new(MemoryStore::new());

    let get_store = Arc::clone(&store);
    app.on(cache::EVENT_GET, move |input: HookInput| {
        let store = Arc::clone(&get_store);
        async move {
            let key = input.args().key().unwrap_or_default().to_owned();
            match store.get(&key).await? {
                Some(raw) => Ok(HookReply::Value(Value::String(raw))),
                None => Ok(HookReply::Bool(false)),
            }
        }
    });
    let set_store = Arc::clone(&store);
    app.on(cache::EVENT_SET, move |input: HookInput| {
        let store = Arc::clone(&set_store);
        async move {
            if let Some((key, data)) = input.args().entry() {
                store.set(key, data, Some(Duration::from_secs(300))).await?;
            }
            Ok(HookReply::Bool(true))
        }
    });
    let exists_store = Arc::clone(&store);
    app.on(cache::EVENT_EXISTS, move |input: HookInput| {
        let store = Arc::clone(&exists_store);
        async move {
            let key = input.args().key().unwrap_or_default().to_owned();
            Ok(HookReply::Bool(store.exists(&key).await?))
        }
    });
    app.on(cache::EVENT_OPTIONS, |_input: HookInput| async {
        Ok(HookReply::Value(json!({ "ttl": 300 })))
    });

    app.route("/reports", |r| {
        r.get(ok);
    });
    app
}

fn reports_request() -> RequestBuilder {
    RequestContext::builder(Method::Get, "/v1/reports").header("Host", "api.test")
}

#[tokio::test]
async fn cache_miss_then_revalidation_then_304() {
    let mut app = cached_app();
    app.finish().await;
    let app = Arc::new(app);

    // Miss: default headers, entry stored after the handler.
    let first = handle(&app, reports_request()).await;
    assert_eq!(first.status(), Status::Ok);
    assert_eq!(first.header("Etag"), Some(""));
    assert_eq!(first.header("Cache-Control"), Some("no-cache"));

    // Hit without conditionals: revalidation headers, quoted etag.
    let second = handle(&app, reports_request()).await;
    assert_eq!(second.status(), Status::Ok);
    let etag = second.header("Etag").unwrap().trim_matches('"').to_owned();
    assert!(!etag.is_empty());
    assert!(second.header("Cache-Control").unwrap().starts_with("private; must-revalidate"));

    // Conditional: the matching etag short-circuits to a 304.
    let third = handle(&app, reports_request().header("If-None-Match", etag.clone())).await;
    assert_eq!(third.status(), Status::NotModified);
    assert!(third.body().is_empty());
    assert_eq!(third.header("Etag").unwrap().trim_matches('"'), etag);
}

#[tokio::test]
async fn etag_matches_even_with_an_old_if_modified_since() {
    let mut app = cached_app();
    app.finish().await;
    let app = Arc::new(app);

    handle(&app, reports_request()).await;
    let second = handle(&app, reports_request()).await;
    let etag = second.header("Etag").unwrap().trim_matches('"').to_owned();

    // An If-Modified-Since older than the stored entry does not block the
    // etag path.
    let stale = httpdate::fmt_http_date(SystemTime::now() - Duration::from_secs(3600));
    let fin = handle(
        &app,
        reports_request()
            .header("If-Modified-Since", stale)
            .header("If-None-Match", etag),
    )
    .await;
    assert_eq!(fin.status(), Status::NotModified);
}

#[tokio::test]
async fn fresh_if_modified_since_is_a_304() {
    let mut app = cached_app();
    app.finish().await;
    let app = Arc::new(app);

    handle(&app, reports_request()).await;

    let fresh = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(60));
    let fin = handle(&app, reports_request().header("If-Modified-Since", fresh)).await;
    assert_eq!(fin.status(), Status::NotModified);
    assert!(fin.body().is_empty());
}

#[tokio::test]
async fn no_cache_hooks_means_default_headers_everywhere() {
    let mut app = App::new(["v1"], insecure());
    app.route("/reports", |r| {
        r.get(ok);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, reports_request()).await;
    assert_eq!(fin.status(), Status::Ok);
    assert_eq!(fin.header("Cache-Control"), Some("no-cache"));
    assert_eq!(fin.header("Etag"), Some(""));
}

// ── Deprecated namespaces ─────────────────────────────────────────────────────

#[tokio::test]
async fn deprecated_namespace_redirects_to_the_active_one() {
    let mut app = App::new(["v1", "v2"], insecure());
    app.deprecate_namespaces(["v1"]);
    app.route("/users/!name", |r| {
        r.get(ok);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/users/andrew")).await;
    assert_eq!(fin.status(), Status::MovedPermanently);
    assert_eq!(fin.header("Location"), Some("/v2/users/andrew"));
    assert!(fin.body().is_empty());
    assert!(fin.header("X-Blubber-Warn").is_some());
    assert_eq!(fin.header("X-Blubber-Upgrade"), Some("v2"));

    // The active namespace serves normally.
    let fin = handle(&app, RequestContext::builder(Method::Get, "/v2/users/andrew")).await;
    assert_eq!(fin.status(), Status::Ok);
    assert_eq!(fin.header("X-Blubber-Warn"), None);
}

#[tokio::test]
async fn deprecated_namespace_without_redirect_only_warns() {
    let mut app = App::new(
        ["v1", "v2"],
        Options { redirect_old_namespaces: false, ..insecure() },
    );
    app.deprecate_namespaces(["v1"]);
    app.route("/users/!name", |r| {
        r.get(ok);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/users/andrew")).await;
    assert_eq!(fin.status(), Status::Ok);
    assert!(fin.header("X-Blubber-Warn").is_some());
    assert_eq!(fin.header("X-Blubber-Upgrade"), Some("v2"));
    assert_eq!(fin.header("Location"), None);
}

// ── Finalization rules ────────────────────────────────────────────────────────

#[tokio::test]
async fn head_and_options_collapse_to_204_with_no_body() {
    let mut app = App::new(["v1"], insecure());
    app.route("/things", |r| {
        r.head(ok);
        r.options(ok);
        r.get(ok);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Head, "/v1/things")).await;
    assert_eq!(fin.status(), Status::NoContent);
    assert!(fin.body().is_empty());

    let fin = handle(&app, RequestContext::builder(Method::Options, "/v1/things")).await;
    assert_eq!(fin.status(), Status::NoContent);
    assert!(fin.body().is_empty());
    assert_eq!(fin.header("Allow"), Some("GET, HEAD, OPTIONS"));
}

#[tokio::test]
async fn handler_failures_use_the_error_flow() {
    async fn teapot(
        _ctx: Context,
        _res: Response,
        _params: Params,
    ) -> Result<Response, HttpError> {
        Err(HttpError::new(Status::UnprocessableEntity, "bad input"))
    }

    let mut app = App::new(["v1"], insecure());
    app.route("/things", |r| {
        r.post(teapot);
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Post, "/v1/things")).await;
    assert_eq!(fin.status(), Status::UnprocessableEntity);
    let body = body_json(&fin);
    assert_eq!(body["code"], 422);
    assert_eq!(body["message"], "bad input");
}

#[tokio::test]
async fn error_observer_sees_every_failure() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);

    let mut app = App::new(["v1"], insecure());
    app.on(events::ERROR_OBSERVER, move |input: HookInput| {
        let counter = Arc::clone(&counter);
        async move {
            if let HookArgs::Report(report) = input.args() {
                assert_eq!(report.code, 404);
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(HookReply::None)
        }
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/missing")).await;
    assert_eq!(fin.status(), Status::NotFound);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn observer_failure_does_not_change_the_response() {
    let mut app = App::new(["v1"], insecure());
    app.on(events::ERROR_OBSERVER, |_input: HookInput| async {
        Err(HttpError::new(Status::InternalServerError, "observer exploded"))
    });
    app.finish().await;
    let app = Arc::new(app);

    let fin = handle(&app, RequestContext::builder(Method::Get, "/v1/missing")).await;
    assert_eq!(fin.status(), Status::NotFound);
    assert_eq!(body_json(&fin)["message"], "Resource not found");
}
