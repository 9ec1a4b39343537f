//! # blubber
//!
//! A hook-driven micro-framework for versioned JSON APIs.
//!
//! ## The contract
//!
//! The dispatcher owns the request lifecycle; *hooks* own the policy. Every
//! behavior that differs between deployments — authentication schemes, rate
//! limiting, conditional caching, user-agent screening, error observation —
//! is a named event you register a closure for. Swap the closure, keep the
//! pipeline:
//!
//! ```text
//! SSL check → required headers → user agent → route match → namespace
//!   → method dispatch → auth → conditional cache → rate limit → handler
//!   → header assembly → send
//! ```
//!
//! Routes use `!name` (required) and `*name` (optional) capture segments,
//! and a path-prefix *namespace* (`/v1/…`) versions the whole API: declare
//! namespaces up front, deprecate old ones later, and clients get warning
//! headers or a 301 onto the active version.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use blubber::{App, Context, HttpError, Options, Params, Response, Server, Status};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = App::new(["v1"], Options::default());
//!
//!     app.route("/users/!user_name/*user_action", |r| {
//!         r.name("users");
//!         r.get(show_user);
//!     });
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn show_user(
//!     ctx: Context,
//!     mut res: Response,
//!     params: Params,
//! ) -> Result<Response, HttpError> {
//!     let name = params.get("user_name").unwrap_or("unknown");
//!     res.write(Status::Ok, json!({ "user": name }));
//!     Ok(res)
//! }
//! ```
//!
//! Attach policy per method:
//!
//! ```rust,ignore
//! app.on("auth.basic", |input| async move { /* verify, or Err(401) */ });
//! app.route("/admin/!section", |r| {
//!     r.get(admin).auth("auth.basic").rate_limit("__RATE_LIMIT__", 5);
//! });
//! ```

mod app;
pub mod cache;
mod error;
pub mod events;
mod handler;
mod hmac;
mod i18n;
mod limiter;
mod method;
mod pattern;
mod request;
mod response;
mod route;
mod server;
mod status;
mod store;

pub use app::{App, Context, Dispatched, MethodScope, Options, RouteScope};
pub use cache::{CacheCheck, CacheEntry};
pub use error::HttpError;
pub use events::{ErrorReport, EventRegistry, Hook, HookArgs, HookInput, HookReply};
pub use handler::Handler;
pub use self::hmac::HmacSigner;
pub use i18n::I18n;
pub use limiter::RateLimiter;
pub use method::Method;
pub use pattern::{Params, PathPattern};
pub use request::{
    Authorization, BasicCredentials, RequestBuilder, RequestContext, normalize_path,
};
pub use response::{Finalized, Headers, Response};
pub use route::{AuthSpec, RateLimitSpec, Route};
pub use server::Server;
pub use status::Status;
pub use store::{KvStore, MemoryStore, StoreError};
