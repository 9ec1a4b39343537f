//! Users demo API: the full hook surface.
//!
//! Shows Basic and HMAC auth schemes (first-success-wins), a fixed-window
//! rate limiter, conditional caching over an in-memory store, a user-agent
//! screen, a config provider, and an error observer.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example users_api
//!
//! Try:
//!   curl http://localhost:3000/v2/users/andrew -u andrew:foo
//!   curl http://localhost:3000/v2/users/andrew/delete -u andrew:foo
//!   curl http://localhost:3000/v1/users/andrew -u andrew:foo   # deprecated → 301
//!   curl http://localhost:3000/v2/reports                      # cached; repeat with
//!                                                              # If-None-Match for a 304

use std::sync::Arc;
use std::time::Duration;

use blubber::{
    App, AuthSpec, Context, HmacSigner, HookInput, HookReply, HttpError, KvStore, MemoryStore,
    Options, Params, RateLimiter, Response, Server, Status, cache, events,
};
use md5::{Digest, Md5};
use serde_json::{Value, json};
use tracing::info;

/// Demo signing secret; a real deployment looks this up by public key.
const HMAC_SECRET: &str = "ac3a7cfd3b2d73c74e3b7798df03e2b7d829514ea4cf624c08a9b722decbcddd";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut app = App::new(["v1", "v2"], Options::default());
    app.deprecate_namespaces(["v1"]);

    register_system_hooks(&mut app);
    register_auth_hooks(&mut app);
    register_rate_limit(&mut app);
    register_cache(&mut app);

    app.route("/", |r| {
        r.get(usage);
    });

    app.route("/users/!user_name/*user_action", |r| {
        r.name("users");
        r.get(show_user)
            .auth(AuthSpec::any_of(["auth.hmac", "auth.basic"]))
            .rate_limit(events::RATE_LIMIT, 1);
        r.delete(delete_user).auth("auth.basic").rate_limit(events::RATE_LIMIT, 5);
    });

    app.route("/reports", |r| {
        r.name("reports");
        r.get(reports);
    });

    Server::bind("0.0.0.0:3000").serve(app).await.expect("server error");
}

// ── Hooks ─────────────────────────────────────────────────────────────────────

fn register_system_hooks(app: &mut App) {
    // Options merged over the defaults at bootstrap.
    app.on(events::CONFIG, |_input: HookInput| async {
        Ok(HookReply::Value(json!({
            "require_https": false,
            "require_user_agent": true,
            "use_output_compression": true,
        })))
    });

    app.on(events::USER_AGENT, |input: HookInput| async move {
        let agent = input.args().text().unwrap_or_default();
        Ok(HookReply::Bool(!agent.contains("BadBot")))
    });

    app.on(events::ERROR_OBSERVER, |input: HookInput| async move {
        if let blubber::HookArgs::Report(report) = input.args() {
            info!(
                request_id = %report.request_id,
                code = report.code,
                resource = %report.resource,
                "request failed: {}",
                report.message
            );
        }
        Ok(HookReply::None)
    });
}

fn register_auth_hooks(app: &mut App) {
    app.on("auth.basic", |input: HookInput| async move {
        let ctx = input.request()?;
        let denied = || HttpError::new(Status::Unauthorized, "Authentication failed");

        let auth = ctx.authorization().ok_or_else(denied)?;
        if !auth.scheme().eq_ignore_ascii_case("basic") {
            return Err(denied());
        }
        let creds = auth.basic_credentials().map_err(|_| denied())?;
        if creds.username == "andrew" && creds.password == "foo" {
            Ok(HookReply::Bool(true))
        } else {
            Err(denied())
        }
    });

    // The client signs the absolute request URI concatenated with its
    // public key and sends the hex signature in X-Content-Hash.
    app.on("auth.hmac", |input: HookInput| async move {
        let ctx = input.request()?;
        let (Some(hash), Some(public_key)) =
            (ctx.header("X-Content-Hash"), ctx.header("X-Public-Key"))
        else {
            return Err(HttpError::new(
                Status::Unauthorized,
                "X-Content-Hash and X-Public-Key headers must be sent with request",
            ));
        };

        let signer = HmacSigner::new(public_key, HMAC_SECRET);
        let content = format!("{}{public_key}", ctx.location());
        if signer.verify(&content, hash) {
            Ok(HookReply::Bool(true))
        } else {
            // The user resolved, the data did not.
            Err(HttpError::new(Status::Forbidden, "Hash matching failed"))
        }
    });
}

fn register_rate_limit(app: &mut App) {
    let limiter = Arc::new(RateLimiter::new(
        Arc::new(MemoryStore::new()),
        100,
        Duration::from_secs(3600),
    ));

    app.on(events::RATE_LIMIT, move |input: HookInput| {
        let limiter = Arc::clone(&limiter);
        async move {
            let ctx = input.request()?;
            let cost = input.args().cost().unwrap_or(1);
            // Clients are keyed by address; an API-key hash would be the
            // production choice.
            let addr = ctx.real_remote_addr().unwrap_or_else(|| "unknown".to_owned());
            let key = hex::encode(Md5::digest(addr.as_bytes()));
            let headers = limiter.check(&key, cost).await?;
            Ok(HookReply::Headers(headers))
        }
    });
}

fn register_cache(app: &mut App) {
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
                store.set(key, data, Some(Duration::from_secs(cache::DEFAULT_TTL))).await?;
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
        Ok(HookReply::Value(json!({ "ttl": cache::DEFAULT_TTL })))
    });
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn usage(_ctx: Context, mut res: Response, _params: Params) -> Result<Response, HttpError> {
    res.write(
        Status::Ok,
        json!({ "usage": ["/v2/users/{name}", "/v2/users/{name}/{action}", "/v2/reports"] }),
    );
    Ok(res)
}

async fn show_user(ctx: Context, mut res: Response, params: Params) -> Result<Response, HttpError> {
    let name = params.get("user_name").unwrap_or("unknown");
    let mut body = json!({
        "user": name,
        "authenticated_with": ctx.authenticated_with(),
    });
    if let Some(action) = params.get("user_action") {
        body["action"] = Value::String(action.to_owned());
    }
    res.write(Status::Ok, body);
    Ok(res)
}

async fn delete_user(
    ctx: Context,
    mut res: Response,
    params: Params,
) -> Result<Response, HttpError> {
    if !ctx.is_authenticated() {
        return Err(HttpError::new(Status::Unauthorized, "Authentication failed"));
    }
    let name = params.get("user_name").unwrap_or("unknown");
    res.write(Status::Ok, json!({ "deleted": name }));
    Ok(res)
}

async fn reports(_ctx: Context, mut res: Response, _params: Params) -> Result<Response, HttpError> {
    res.write(
        Status::Ok,
        json!({ "reports": [ { "id": 1, "title": "monthly" }, { "id": 2, "title": "weekly" } ] }),
    );
    Ok(res)
}
